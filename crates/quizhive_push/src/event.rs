//! Push event vocabulary.
//!
//! Wire format is JSON with a `type` discriminator. Content is data-only;
//! every variant is self-describing so clients can react without extra
//! round-trips.

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    /// First frame on a new stream.
    ConnectionEstablished { message: String },

    /// A job changed state (Pending -> Running).
    JobUpdate {
        job_id: Uuid,
        status: String,
        message: String,
    },

    /// One more question was persisted for a running job.
    JobProgress {
        job_id: Uuid,
        generated_count: u32,
        target_count: u32,
        /// 0..100.
        progress: f64,
        message: String,
    },

    /// Terminal success.
    JobCompleted {
        job_id: Uuid,
        generated_count: u32,
        target_count: u32,
        message: String,
    },

    /// Terminal failure.
    JobFailed { job_id: Uuid, message: String },

    /// Reply to a client ping.
    Pong { timestamp: String },

    /// Reply to a jobs query: snapshots of the recipient's jobs.
    JobsStatus { jobs: Vec<serde_json::Value> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_with_type_tag() {
        let event = PushEvent::JobProgress {
            job_id: Uuid::nil(),
            generated_count: 1,
            target_count: 2,
            progress: 50.0,
            message: "Generated 1/2 questions".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "job_progress");
        assert_eq!(value["generated_count"], 1);
        assert_eq!(value["target_count"], 2);
        assert_eq!(value["progress"], 50.0);
    }

    #[test]
    fn test_connection_established_tag() {
        let event = PushEvent::ConnectionEstablished {
            message: "Connected".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "connection_established");
    }
}
