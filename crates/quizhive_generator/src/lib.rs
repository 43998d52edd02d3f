//! Adapter over an external text-generation service.
//!
//! The rest of the system only sees the `QuestionGenerator` trait: one
//! call produces one validated question or a typed failure. No failure
//! here is fatal to the calling job; workers log and move on.

pub mod client;
pub mod error;
pub mod scripted;

pub use client::{ChatCompletionsGenerator, GeneratorConfig};
pub use error::GeneratorError;
pub use scripted::ScriptedGenerator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One generation call. The nonce varies per call and decorrelates
/// otherwise-identical prompts; `index`/`total` situate the call within
/// its job.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub topic: String,
    pub min_age: i64,
    pub max_age: i64,
    pub nonce: u32,
    pub index: u32,
    pub total: u32,
}

/// A structurally valid question as returned by the service. Topic and
/// age metadata are attached by the caller, which knows the job scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    #[serde(rename = "question")]
    pub prompt: String,
    pub options: Vec<String>,
    pub answer: String,
}

impl GeneratedQuestion {
    /// The structural contract: exactly four options, answer among them.
    pub fn validate(&self) -> Result<(), GeneratorError> {
        if self.options.len() != 4 {
            return Err(GeneratorError::Validation(format!(
                "expected 4 options, got {}",
                self.options.len()
            )));
        }
        if !self.options.contains(&self.answer) {
            return Err(GeneratorError::Validation(
                "answer is not one of the options".to_string(),
            ));
        }
        Ok(())
    }
}

/// Stateless question source. Implemented by the live HTTP adapter and by
/// scripted stand-ins for tests and offline development.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedQuestion, GeneratorError>;
}
