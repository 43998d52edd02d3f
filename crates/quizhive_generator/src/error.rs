//! Generator failure taxonomy.

use std::time::Duration;

use thiserror::Error;

/// Why a single generation call produced nothing. Workers treat all of
/// these as skip-and-continue.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// Connection, TLS, or non-success HTTP status from the service.
    #[error("generator transport error: {0}")]
    Transport(String),

    /// The service replied, but not with a question we could decode.
    #[error("generator response parse error: {0}")]
    Parse(String),

    /// Decoded fine, but the structural contract does not hold.
    #[error("generated question invalid: {0}")]
    Validation(String),

    /// The per-call deadline elapsed.
    #[error("generation call timed out after {0:?}")]
    Timeout(Duration),
}
