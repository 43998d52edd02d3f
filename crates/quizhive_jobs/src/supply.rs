//! The read path: claim questions, notice scarcity, schedule supply.

use std::sync::Arc;

use quizhive_store::{Question, QuestionFilter, Store, StoreError};
use tracing::info;

use crate::manager::JobManager;

/// A shortfall always asks for at least this many questions, so a reader
/// one short does not spawn a one-question job.
const MIN_AUTO_TARGET: u32 = 5;

/// Serves reads and applies the auto-trigger policy: when a recipient
/// gets fewer questions than asked for and has no job in flight, exactly
/// one background job is scheduled for them. The current call never waits
/// on it.
pub struct SupplyController {
    store: Store,
    jobs: Arc<JobManager>,
}

impl SupplyController {
    pub fn new(store: Store, jobs: Arc<JobManager>) -> Self {
        Self { store, jobs }
    }

    /// Atomically claim up to `limit` questions for the recipient, then
    /// top up supply in the background if the hand came up short.
    pub async fn fetch_questions(
        &self,
        identifier: &str,
        limit: i64,
        filter: &QuestionFilter,
    ) -> Result<Vec<Question>, StoreError> {
        let recipient = self.store.ensure_recipient(identifier).await?;
        let selected = self
            .store
            .claim_unassigned(recipient.id, filter, limit)
            .await?;

        let shortfall = limit - selected.len() as i64;
        if shortfall > 0 && !self.jobs.has_active_for(identifier) {
            let target_count = (shortfall as u32).max(MIN_AUTO_TARGET);
            let age_range = filter.age.map(|age| (age, age));
            let job_id = self.jobs.enqueue(
                identifier,
                target_count,
                age_range,
                filter.topic.clone(),
                true,
            );
            info!(
                %job_id,
                recipient = identifier,
                target_count,
                "supply shortfall, auto-triggered generation"
            );
        }

        Ok(selected)
    }
}
