//! Shared fixtures for job and supply tests.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quizhive_generator::{
    GeneratedQuestion, GenerationRequest, GeneratorError, QuestionGenerator,
};
use quizhive_push::PushHub;
use quizhive_store::Store;
use quizhive_telemetry::Metrics;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::job::{JobSnapshot, JobStatus};
use crate::manager::{JobManager, JobManagerConfig, StatusOutcome};

/// Manager wired to an in-memory store with default config.
pub async fn manager_with(
    generator: Arc<dyn QuestionGenerator>,
) -> (Arc<JobManager>, Store, Arc<PushHub>, Arc<Metrics>) {
    let store = Store::in_memory().await.expect("in-memory store");
    let push = Arc::new(PushHub::new());
    let metrics = Arc::new(Metrics::new());
    let manager = JobManager::new(
        store.clone(),
        generator,
        Arc::clone(&push),
        Arc::clone(&metrics),
        JobManagerConfig::default(),
    );
    (manager, store, push, metrics)
}

/// Poll until the job reaches `expected`, or panic after five seconds.
pub async fn wait_for_status(
    manager: &JobManager,
    job_id: Uuid,
    requester: &str,
    expected: JobStatus,
) -> JobSnapshot {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let StatusOutcome::Job(snapshot) = manager.status(job_id, requester) {
            if snapshot.status == expected {
                return snapshot;
            }
        }
        if tokio::time::Instant::now() > deadline {
            panic!("job {job_id} did not reach {expected:?} in time");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Blocks each generate call until a permit is released; keeps jobs
/// Running for as long as a test needs.
pub struct GatedGenerator {
    gate: Semaphore,
    counter: AtomicU32,
}

impl GatedGenerator {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            counter: AtomicU32::new(0),
        }
    }

    pub fn release(&self, permits: usize) {
        self.gate.add_permits(permits);
    }
}

#[async_trait]
impl QuestionGenerator for GatedGenerator {
    async fn generate(
        &self,
        _request: &GenerationRequest,
    ) -> Result<GeneratedQuestion, GeneratorError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| GeneratorError::Transport("gate closed".into()))?;
        permit.forget();
        let i = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(GeneratedQuestion {
            prompt: format!("Gated question {i}?"),
            options: vec![
                format!("gated {i}-a"),
                format!("gated {i}-b"),
                format!("gated {i}-c"),
                format!("gated {i}-d"),
            ],
            answer: format!("gated {i}-a"),
        })
    }
}

/// Records every request and tracks call concurrency.
pub struct RecordingGenerator {
    delay: Duration,
    requests: Mutex<Vec<GenerationRequest>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    total: AtomicUsize,
}

impl RecordingGenerator {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            requests: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
        }
    }

    pub fn nonces(&self) -> Vec<u32> {
        self.requests
            .lock()
            .expect("request log lock poisoned")
            .iter()
            .map(|r| r.nonce)
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuestionGenerator for RecordingGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedQuestion, GeneratorError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        {
            let mut requests = self.requests.lock().expect("request log lock poisoned");
            requests.push(request.clone());
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let i = self.total.load(Ordering::SeqCst);
        Ok(GeneratedQuestion {
            prompt: format!("Recorded question {i} nonce {}?", request.nonce),
            options: vec![
                format!("rec {i}-a"),
                format!("rec {i}-b"),
                format!("rec {i}-c"),
                format!("rec {i}-d"),
            ],
            answer: format!("rec {i}-a"),
        })
    }
}
