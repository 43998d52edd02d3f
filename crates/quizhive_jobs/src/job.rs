//! Job state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Lifecycle: Pending -> Running -> Completed | Failed. No transitions
/// out of terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// One unit of background generation work. Owned by the job manager's
/// map; everything outside sees `JobSnapshot` copies.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub owner: String,
    pub target_count: u32,
    pub generated_count: u32,
    pub status: JobStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub auto_triggered: bool,
    pub age_range: Option<(i64, i64)>,
    pub topic: Option<String>,
}

impl Job {
    pub fn new(
        owner: &str,
        target_count: u32,
        age_range: Option<(i64, i64)>,
        topic: Option<String>,
        auto_triggered: bool,
    ) -> Self {
        let message = if auto_triggered {
            "Auto-triggered job queued for processing"
        } else {
            "Job queued for processing"
        };
        Self {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            target_count,
            generated_count: 0,
            status: JobStatus::Pending,
            message: message.to_string(),
            created_at: Utc::now(),
            completed_at: None,
            auto_triggered,
            age_range,
            topic,
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id,
            status: self.status,
            target_count: self.target_count,
            generated_count: self.generated_count,
            message: self.message.clone(),
            created_at: self.created_at.to_rfc3339(),
            completed_at: self.completed_at.map(|t| t.to_rfc3339()),
            auto_triggered: self.auto_triggered,
        }
    }
}

/// Coherent copy of a job's externally visible fields.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub target_count: u32,
    pub generated_count: u32,
    pub message: String,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub auto_triggered: bool,
}
