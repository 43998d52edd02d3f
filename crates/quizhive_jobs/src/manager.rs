//! Job tracking and the bounded worker pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use quizhive_generator::QuestionGenerator;
use quizhive_push::PushHub;
use quizhive_store::Store;
use quizhive_telemetry::Metrics;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::job::{Job, JobSnapshot};
use crate::worker;

/// Built-in topics used when a job has none (or asked for `random`).
pub const DEFAULT_TOPICS: &[&str] = &["Animals", "Space", "History", "Science", "Sports"];

/// Age band applied when a job carries no explicit range.
pub const DEFAULT_AGE_RANGE: (i64, i64) = (8, 15);

/// Worker pool width when unconfigured.
pub const DEFAULT_WORKERS: usize = 3;

#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    /// Number of parallel workers (W).
    pub workers: usize,
    pub default_age_range: (i64, i64),
    pub topics: Vec<String>,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            default_age_range: DEFAULT_AGE_RANGE,
            topics: DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Result of a status lookup. Access is restricted to the owning
/// recipient.
#[derive(Debug, Clone)]
pub enum StatusOutcome {
    Job(JobSnapshot),
    NotFound,
    Forbidden,
}

/// Shared state threaded to every worker task.
pub(crate) struct WorkerContext {
    pub jobs: Mutex<HashMap<Uuid, Job>>,
    pub store: Store,
    pub generator: Arc<dyn QuestionGenerator>,
    pub push: Arc<PushHub>,
    pub metrics: Arc<Metrics>,
    pub config: JobManagerConfig,
}

/// Tracks jobs and feeds the worker pool. Admission is immediate:
/// back-pressure shows up as queue depth, not rejection.
pub struct JobManager {
    ctx: Arc<WorkerContext>,
    queue_tx: mpsc::UnboundedSender<Uuid>,
}

impl JobManager {
    /// Create the manager and spawn its worker pool on the current
    /// runtime.
    pub fn new(
        store: Store,
        generator: Arc<dyn QuestionGenerator>,
        push: Arc<PushHub>,
        metrics: Arc<Metrics>,
        config: JobManagerConfig,
    ) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(WorkerContext {
            jobs: Mutex::new(HashMap::new()),
            store,
            generator,
            push,
            metrics,
            config,
        });

        let queue_rx = Arc::new(AsyncMutex::new(queue_rx));
        for worker_index in 0..ctx.config.workers.max(1) {
            let ctx = Arc::clone(&ctx);
            let queue_rx = Arc::clone(&queue_rx);
            tokio::spawn(async move {
                debug!(worker_index, "generation worker started");
                worker::run(ctx, queue_rx).await;
            });
        }

        Arc::new(Self { ctx, queue_tx })
    }

    /// Create a Pending job and submit it to the pool.
    pub fn enqueue(
        &self,
        owner: &str,
        target_count: u32,
        age_range: Option<(i64, i64)>,
        topic: Option<String>,
        auto_triggered: bool,
    ) -> Uuid {
        let job = Job::new(owner, target_count, age_range, topic, auto_triggered);
        let job_id = job.id;
        {
            let mut jobs = self.ctx.jobs.lock().expect("job map lock poisoned");
            jobs.insert(job_id, job);
        }

        self.ctx.metrics.inc_jobs_enqueued();
        if auto_triggered {
            self.ctx.metrics.inc_auto_triggers();
        } else {
            self.ctx.metrics.inc_manual_triggers();
        }

        // Workers hold the receiver for as long as the manager lives, so
        // this send only fails during teardown.
        let _ = self.queue_tx.send(job_id);
        info!(%job_id, owner, target_count, auto_triggered, "job enqueued");
        job_id
    }

    /// Snapshot a job, enforcing owner access.
    pub fn status(&self, job_id: Uuid, requester: &str) -> StatusOutcome {
        let jobs = self.ctx.jobs.lock().expect("job map lock poisoned");
        match jobs.get(&job_id) {
            None => StatusOutcome::NotFound,
            Some(job) if job.owner != requester => StatusOutcome::Forbidden,
            Some(job) => StatusOutcome::Job(job.snapshot()),
        }
    }

    /// True iff any job owned by `owner` is Pending or Running.
    pub fn has_active_for(&self, owner: &str) -> bool {
        let jobs = self.ctx.jobs.lock().expect("job map lock poisoned");
        jobs.values()
            .any(|job| job.owner == owner && !job.status.is_terminal())
    }

    /// Snapshots of all jobs owned by `owner`, oldest first.
    pub fn jobs_for_owner(&self, owner: &str) -> Vec<JobSnapshot> {
        let jobs = self.ctx.jobs.lock().expect("job map lock poisoned");
        let mut owned: Vec<&Job> = jobs.values().filter(|job| job.owner == owner).collect();
        owned.sort_by_key(|job| job.created_at);
        owned.iter().map(|job| job.snapshot()).collect()
    }

    /// Remove terminal jobs whose completion is older than `max_age`.
    /// Idempotent.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let mut jobs = self.ctx.jobs.lock().expect("job map lock poisoned");
        let before = jobs.len();
        jobs.retain(|_, job| match (job.status.is_terminal(), job.completed_at) {
            (true, Some(completed_at)) => now - completed_at <= max_age,
            _ => true,
        });
        let removed = before - jobs.len();
        if removed > 0 {
            info!(removed, "purged terminal jobs");
        }
        removed
    }

    /// Jobs currently Pending or Running.
    pub fn active_jobs(&self) -> usize {
        let jobs = self.ctx.jobs.lock().expect("job map lock poisoned");
        jobs.values().filter(|job| !job.status.is_terminal()).count()
    }

    /// All tracked jobs, terminal included.
    pub fn total_jobs(&self) -> usize {
        self.ctx.jobs.lock().expect("job map lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{manager_with, wait_for_status, GatedGenerator, RecordingGenerator};
    use crate::JobStatus;
    use quizhive_generator::{GeneratedQuestion, GeneratorError, ScriptedGenerator};
    use quizhive_push::PushEvent;
    use std::time::Duration as StdDuration;

    fn scripted_question(i: usize) -> GeneratedQuestion {
        GeneratedQuestion {
            prompt: format!("Scripted question {i}?"),
            options: vec![
                format!("option {i}-a"),
                format!("option {i}-b"),
                format!("option {i}-c"),
                format!("option {i}-d"),
            ],
            answer: format!("option {i}-a"),
        }
    }

    #[tokio::test]
    async fn test_job_runs_to_completion_with_ordered_events() {
        let generator = Arc::new(ScriptedGenerator::distinct(2));
        let (manager, store, push, metrics) = manager_with(generator).await;

        let mut sub = push.subscribe("a@example.com");
        let job_id = manager.enqueue("a@example.com", 2, None, None, false);

        let mut events = Vec::new();
        for _ in 0..4 {
            let event = tokio::time::timeout(StdDuration::from_secs(5), sub.receiver.recv())
                .await
                .expect("timed out waiting for push event")
                .expect("push stream closed early");
            events.push(event);
        }

        match &events[0] {
            PushEvent::JobUpdate { job_id: id, status, .. } => {
                assert_eq!(*id, job_id);
                assert_eq!(status, "running");
            }
            other => panic!("expected job_update, got {other:?}"),
        }
        match &events[1] {
            PushEvent::JobProgress { generated_count, target_count, progress, .. } => {
                assert_eq!((*generated_count, *target_count), (1, 2));
                assert_eq!(*progress, 50.0);
            }
            other => panic!("expected job_progress, got {other:?}"),
        }
        match &events[2] {
            PushEvent::JobProgress { generated_count, progress, .. } => {
                assert_eq!(*generated_count, 2);
                assert_eq!(*progress, 100.0);
            }
            other => panic!("expected job_progress, got {other:?}"),
        }
        match &events[3] {
            PushEvent::JobCompleted { generated_count, target_count, .. } => {
                assert_eq!((*generated_count, *target_count), (2, 2));
            }
            other => panic!("expected job_completed, got {other:?}"),
        }

        let snapshot = wait_for_status(&manager, job_id, "a@example.com", JobStatus::Completed).await;
        assert_eq!(snapshot.generated_count, 2);
        assert!(snapshot.completed_at.is_some());
        assert_eq!(store.count_questions().await.unwrap(), 2);

        let m = metrics.snapshot();
        assert_eq!(m.jobs_enqueued, 1);
        assert_eq!(m.manual_triggers, 1);
        assert_eq!(m.auto_triggers, 0);
        assert_eq!(m.questions_generated, 2);
        assert_eq!(m.jobs_completed, 1);
        assert_eq!(m.jobs_failed, 0);
    }

    #[tokio::test]
    async fn test_duplicate_generator_output_is_skipped_not_fatal() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok(scripted_question(0)),
            Ok(scripted_question(0)),
            Ok(scripted_question(1)),
        ]));
        let (manager, store, _push, metrics) = manager_with(generator).await;

        let job_id = manager.enqueue("a@example.com", 3, None, None, false);
        let snapshot = wait_for_status(&manager, job_id, "a@example.com", JobStatus::Completed).await;

        assert_eq!(snapshot.generated_count, 2);
        assert_eq!(store.count_questions().await.unwrap(), 2);
        let m = metrics.snapshot();
        assert_eq!(m.questions_generated, 2);
        assert_eq!(m.duplicates_skipped, 1);
    }

    #[tokio::test]
    async fn test_generator_faults_are_skipped_not_fatal() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Err(GeneratorError::Transport("connection refused".into())),
            Ok(scripted_question(0)),
        ]));
        let (manager, store, _push, metrics) = manager_with(generator).await;

        let job_id = manager.enqueue("a@example.com", 2, None, None, false);
        let snapshot = wait_for_status(&manager, job_id, "a@example.com", JobStatus::Completed).await;

        assert_eq!(snapshot.generated_count, 1);
        assert_eq!(store.count_questions().await.unwrap(), 1);
        assert_eq!(metrics.snapshot().jobs_completed, 1);
        assert_eq!(metrics.snapshot().jobs_failed, 0);
    }

    #[tokio::test]
    async fn test_status_is_owner_only() {
        let generator = Arc::new(ScriptedGenerator::distinct(1));
        let (manager, _store, _push, _metrics) = manager_with(generator).await;

        let job_id = manager.enqueue("a@example.com", 1, None, None, false);

        assert!(matches!(
            manager.status(job_id, "a@example.com"),
            StatusOutcome::Job(_)
        ));
        assert!(matches!(
            manager.status(job_id, "b@example.com"),
            StatusOutcome::Forbidden
        ));
        assert!(matches!(
            manager.status(Uuid::new_v4(), "a@example.com"),
            StatusOutcome::NotFound
        ));
    }

    #[tokio::test]
    async fn test_has_active_for_tracks_lifecycle() {
        let generator = Arc::new(GatedGenerator::new());
        let (manager, _store, _push, _metrics) = manager_with(Arc::clone(&generator) as _).await;

        assert!(!manager.has_active_for("a@example.com"));
        let job_id = manager.enqueue("a@example.com", 1, None, None, false);
        assert!(manager.has_active_for("a@example.com"));
        assert!(!manager.has_active_for("b@example.com"));

        generator.release(1);
        wait_for_status(&manager, job_id, "a@example.com", JobStatus::Completed).await;
        assert!(!manager.has_active_for("a@example.com"));
    }

    #[tokio::test]
    async fn test_cleanup_purges_only_old_terminal_jobs() {
        let generator = Arc::new(GatedGenerator::new());
        let (manager, _store, _push, _metrics) = manager_with(Arc::clone(&generator) as _).await;

        let done = manager.enqueue("a@example.com", 1, None, None, false);
        generator.release(1);
        wait_for_status(&manager, done, "a@example.com", JobStatus::Completed).await;

        let running = manager.enqueue("a@example.com", 1, None, None, false);
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        // Generous TTL keeps everything.
        assert_eq!(manager.cleanup(Duration::hours(1)), 0);
        assert_eq!(manager.total_jobs(), 2);

        // Tiny TTL purges the finished job but never the running one.
        assert_eq!(manager.cleanup(Duration::milliseconds(1)), 1);
        assert_eq!(manager.total_jobs(), 1);
        assert!(matches!(
            manager.status(running, "a@example.com"),
            StatusOutcome::Job(_)
        ));
        assert!(matches!(
            manager.status(done, "a@example.com"),
            StatusOutcome::NotFound
        ));

        // Idempotent.
        assert_eq!(manager.cleanup(Duration::milliseconds(1)), 0);

        generator.release(1);
        wait_for_status(&manager, running, "a@example.com", JobStatus::Completed).await;
    }

    #[tokio::test]
    async fn test_pool_width_bounds_concurrent_jobs() {
        let generator = Arc::new(RecordingGenerator::with_delay(StdDuration::from_millis(50)));
        let config = JobManagerConfig {
            workers: 2,
            ..JobManagerConfig::default()
        };
        let store = Store::in_memory().await.unwrap();
        let push = Arc::new(PushHub::new());
        let metrics = Arc::new(Metrics::new());
        let manager = JobManager::new(
            store,
            Arc::clone(&generator) as _,
            push,
            metrics,
            config,
        );

        let ids: Vec<Uuid> = (0..4)
            .map(|_| manager.enqueue("a@example.com", 1, None, None, false))
            .collect();
        for id in ids {
            wait_for_status(&manager, id, "a@example.com", JobStatus::Completed).await;
        }

        assert_eq!(generator.total_calls(), 4);
        assert!(generator.max_concurrent() <= 2);
    }

    #[tokio::test]
    async fn test_nonces_are_unique_within_a_job() {
        let generator = Arc::new(RecordingGenerator::with_delay(StdDuration::ZERO));
        let (manager, _store, _push, _metrics) = manager_with(Arc::clone(&generator) as _).await;

        let job_id = manager.enqueue("a@example.com", 10, None, None, false);
        wait_for_status(&manager, job_id, "a@example.com", JobStatus::Completed).await;

        let nonces = generator.nonces();
        assert_eq!(nonces.len(), 10);
        let unique: std::collections::HashSet<u32> = nonces.iter().copied().collect();
        assert_eq!(unique.len(), 10);
    }

    #[tokio::test]
    async fn test_requested_scope_reaches_generated_questions() {
        let generator = Arc::new(ScriptedGenerator::distinct(3));
        let (manager, store, _push, _metrics) = manager_with(generator).await;

        let job_id = manager.enqueue(
            "a@example.com",
            3,
            Some((9, 9)),
            Some("Dinosaurs".to_string()),
            false,
        );
        wait_for_status(&manager, job_id, "a@example.com", JobStatus::Completed).await;

        let filter = quizhive_store::QuestionFilter {
            age: Some(9),
            topic: Some("dinosaurs".into()),
        };
        assert_eq!(store.count_matching(&filter).await.unwrap(), 3);
    }
}
