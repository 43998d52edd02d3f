//! Worker loop: drain the queue, drive the generator, persist, report.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use quizhive_generator::GenerationRequest;
use quizhive_push::PushEvent;
use quizhive_store::{InsertOutcome, NewQuestion, StoreError};
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::job::JobStatus;
use crate::manager::WorkerContext;

/// Effective parameters of a claimed job, resolved once at pickup.
struct JobScope {
    owner: String,
    target_count: u32,
    topic: String,
    min_age: i64,
    max_age: i64,
}

/// One worker: claim job ids until the queue closes.
///
/// The receiver is shared; the lock is held only while waiting for the
/// next id, so up to pool-width jobs run concurrently.
pub(crate) async fn run(
    ctx: Arc<WorkerContext>,
    queue: Arc<AsyncMutex<mpsc::UnboundedReceiver<Uuid>>>,
) {
    loop {
        let job_id = {
            let mut rx = queue.lock().await;
            match rx.recv().await {
                Some(id) => id,
                None => return,
            }
        };
        run_job(&ctx, job_id).await;
    }
}

async fn run_job(ctx: &WorkerContext, job_id: Uuid) {
    let Some(scope) = begin(ctx, job_id) else {
        warn!(%job_id, "queued job vanished before pickup");
        return;
    };

    info!(
        %job_id,
        owner = %scope.owner,
        target = scope.target_count,
        topic = %scope.topic,
        "starting question generation"
    );
    ctx.push.publish(
        &scope.owner,
        PushEvent::JobUpdate {
            job_id,
            status: JobStatus::Running.as_str().to_string(),
            message: "Starting question generation...".to_string(),
        },
    );

    match generate_all(ctx, job_id, &scope).await {
        Ok(generated) => {
            let message = format!("Successfully generated {generated} questions");
            conclude(ctx, job_id, JobStatus::Completed, message.clone());
            ctx.metrics.inc_jobs_completed();
            ctx.push.publish(
                &scope.owner,
                PushEvent::JobCompleted {
                    job_id,
                    generated_count: generated,
                    target_count: scope.target_count,
                    message,
                },
            );
            info!(%job_id, generated, "job completed");
        }
        Err(e) => {
            let message = format!("Job failed: {e}");
            conclude(ctx, job_id, JobStatus::Failed, message.clone());
            ctx.metrics.inc_jobs_failed();
            ctx.push
                .publish(&scope.owner, PushEvent::JobFailed { job_id, message });
            error!(%job_id, error = %e, "job failed");
        }
    }
}

/// Transition Pending -> Running and resolve the effective scope.
fn begin(ctx: &WorkerContext, job_id: Uuid) -> Option<JobScope> {
    let mut jobs = ctx.jobs.lock().expect("job map lock poisoned");
    let job = jobs.get_mut(&job_id)?;

    job.status = JobStatus::Running;
    job.message = "Generating questions...".to_string();

    let (min_age, max_age) = job.age_range.unwrap_or(ctx.config.default_age_range);
    let topic = match job.topic.as_deref() {
        Some(t) if !t.eq_ignore_ascii_case("random") => t.to_string(),
        _ => ctx
            .config
            .topics
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| "Science".to_string()),
    };

    Some(JobScope {
        owner: job.owner.clone(),
        target_count: job.target_count,
        topic,
        min_age,
        max_age,
    })
}

/// The per-question loop. Generator faults and duplicates are skipped;
/// only a store failure aborts the job.
async fn generate_all(
    ctx: &WorkerContext,
    job_id: Uuid,
    scope: &JobScope,
) -> Result<u32, StoreError> {
    let mut generated: u32 = 0;
    let mut used_nonces: HashSet<u32> = HashSet::new();

    for index in 0..scope.target_count {
        let nonce = fresh_nonce(&mut used_nonces);
        let request = GenerationRequest {
            topic: scope.topic.clone(),
            min_age: scope.min_age,
            max_age: scope.max_age,
            nonce,
            index,
            total: scope.target_count,
        };

        let candidate = match ctx.generator.generate(&request).await {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(%job_id, attempt = index, error = %e, "generation attempt failed");
                continue;
            }
        };

        let question = NewQuestion {
            prompt: candidate.prompt,
            options: candidate.options,
            answer: candidate.answer,
            topic: scope.topic.clone(),
            min_age: scope.min_age,
            max_age: scope.max_age,
        };

        match ctx.store.insert_question(&question).await? {
            InsertOutcome::Inserted(_) => {
                generated += 1;
                ctx.metrics.inc_questions_generated();

                let message = format!(
                    "Generated {generated}/{} questions",
                    scope.target_count
                );
                {
                    let mut jobs = ctx.jobs.lock().expect("job map lock poisoned");
                    if let Some(job) = jobs.get_mut(&job_id) {
                        job.generated_count = generated;
                        job.message = message.clone();
                    }
                }
                ctx.push.publish(
                    &scope.owner,
                    PushEvent::JobProgress {
                        job_id,
                        generated_count: generated,
                        target_count: scope.target_count,
                        progress: generated as f64 / scope.target_count.max(1) as f64 * 100.0,
                        message,
                    },
                );
            }
            InsertOutcome::Duplicate => {
                debug!(%job_id, attempt = index, "duplicate question skipped");
                ctx.metrics.inc_duplicates_skipped();
            }
            InsertOutcome::Invalid(reason) => {
                warn!(%job_id, attempt = index, reason, "generator produced invalid question");
            }
        }
    }

    Ok(generated)
}

/// Draw a nonce not yet used within this job.
fn fresh_nonce(used: &mut HashSet<u32>) -> u32 {
    let mut rng = rand::thread_rng();
    loop {
        let nonce: u32 = rng.gen();
        if used.insert(nonce) {
            return nonce;
        }
    }
}

/// Set a terminal state. Completion timestamps are written exactly once;
/// terminal states are never left.
fn conclude(ctx: &WorkerContext, job_id: Uuid, status: JobStatus, message: String) {
    let mut jobs = ctx.jobs.lock().expect("job map lock poisoned");
    if let Some(job) = jobs.get_mut(&job_id) {
        if job.status.is_terminal() {
            return;
        }
        job.status = status;
        job.message = message;
        job.completed_at = Some(Utc::now());
    }
}
