//! Scripted generator for tests and offline development.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::GeneratorError;
use crate::{GeneratedQuestion, GenerationRequest, QuestionGenerator};

/// Replays a fixed sequence of outcomes, cycling when exhausted. Lets job
/// and end-to-end tests drive the worker loop without a network.
pub struct ScriptedGenerator {
    script: Mutex<Vec<Result<GeneratedQuestion, GeneratorError>>>,
    cursor: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<GeneratedQuestion, GeneratorError>>) -> Self {
        Self {
            script: Mutex::new(script),
            cursor: AtomicUsize::new(0),
        }
    }

    /// A generator that always succeeds with distinct questions.
    pub fn distinct(count: usize) -> Self {
        let script = (0..count)
            .map(|i| {
                Ok(GeneratedQuestion {
                    prompt: format!("Scripted question {i}?"),
                    options: vec![
                        format!("option {i}-a"),
                        format!("option {i}-b"),
                        format!("option {i}-c"),
                        format!("option {i}-d"),
                    ],
                    answer: format!("option {i}-a"),
                })
            })
            .collect();
        Self::new(script)
    }

    /// How many calls have been made so far.
    pub fn calls(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuestionGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        _request: &GenerationRequest,
    ) -> Result<GeneratedQuestion, GeneratorError> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().expect("script lock poisoned");
        if script.is_empty() {
            return Err(GeneratorError::Transport("empty script".to_string()));
        }
        match &script[index % script.len()] {
            Ok(q) => Ok(q.clone()),
            Err(e) => Err(clone_error(e)),
        }
    }
}

fn clone_error(e: &GeneratorError) -> GeneratorError {
    match e {
        GeneratorError::Transport(s) => GeneratorError::Transport(s.clone()),
        GeneratorError::Parse(s) => GeneratorError::Parse(s.clone()),
        GeneratorError::Validation(s) => GeneratorError::Validation(s.clone()),
        GeneratorError::Timeout(d) => GeneratorError::Timeout(*d),
    }
}
