//! Store error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored `options_json` column failed to parse back into a list.
    #[error("corrupt question record {id}: {source}")]
    CorruptRecord {
        id: i64,
        #[source]
        source: serde_json::Error,
    },
}
