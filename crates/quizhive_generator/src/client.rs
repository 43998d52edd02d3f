//! Live adapter: OpenAI-compatible chat completions.

use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GeneratorError;
use crate::{GeneratedQuestion, GenerationRequest, QuestionGenerator};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Stylistic variety mixed into prompts so back-to-back calls for the
/// same topic do not collapse onto one phrasing.
const PROMPT_STYLES: &[&str] = &[
    "fun and engaging",
    "educational and interesting",
    "challenging but fair",
    "creative and thought-provoking",
];

const QUESTION_TYPES: &[&str] = &[
    "multiple-choice question",
    "trivia question with interesting facts",
    "knowledge-based question",
    "quiz question with educational value",
];

/// Connection settings for the generation service.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Chat completions endpoint, e.g. `https://api.openai.com/v1/chat/completions`.
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Per-call deadline.
    pub timeout: Duration,
}

impl GeneratorConfig {
    pub fn new(url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            model: model.into(),
            api_key,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Request body (OpenAI chat format).
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// Response: choices[0].message.content carries the question JSON.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP generator backed by a chat-completions endpoint.
pub struct ChatCompletionsGenerator {
    client: reqwest::Client,
    config: GeneratorConfig,
}

impl ChatCompletionsGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

/// Build the user prompt. Names the topic, the age band, and the nonce,
/// as the variability contract requires.
pub fn build_prompt(request: &GenerationRequest, style: &str, question_type: &str) -> String {
    format!(
        "You are an expert trivia question generator. \
         Create a {style} {question_type} appropriate for ages {min_age} to {max_age}. \
         Topic: {topic}. \
         Requirements: \
         - Make it age-appropriate and engaging \
         - Include interesting facts or context when possible \
         - Ensure one clearly correct answer and three plausible distractors \
         - Use clear, simple language suitable for the age group \
         Format your output as a JSON object with these exact keys: \
         'question' (string), 'options' (list of exactly 4 strings), and \
         'answer' (string that exactly matches one of the options). \
         Random seed for uniqueness: {nonce}. \
         Generate question #{index} of {total}.",
        style = style,
        question_type = question_type,
        min_age = request.min_age,
        max_age = request.max_age,
        topic = request.topic,
        nonce = request.nonce,
        index = request.index + 1,
        total = request.total,
    )
}

#[async_trait]
impl QuestionGenerator for ChatCompletionsGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedQuestion, GeneratorError> {
        let (style, question_type) = {
            let mut rng = rand::thread_rng();
            (
                *PROMPT_STYLES.choose(&mut rng).unwrap_or(&PROMPT_STYLES[0]),
                *QUESTION_TYPES.choose(&mut rng).unwrap_or(&QUESTION_TYPES[0]),
            )
        };

        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You generate trivia questions in valid JSON format.".to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(request, style, question_type),
                },
            ],
            temperature: 0.8,
        };

        let mut http = self
            .client
            .post(&self.config.url)
            .timeout(self.config.timeout)
            .json(&body);
        if let Some(ref key) = self.config.api_key {
            http = http.header("Authorization", format!("Bearer {key}"));
        }

        let response = http.send().await.map_err(|e| {
            if e.is_timeout() {
                GeneratorError::Timeout(self.config.timeout)
            } else {
                GeneratorError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                GeneratorError::Timeout(self.config.timeout)
            } else {
                GeneratorError::Transport(e.to_string())
            }
        })?;

        if !status.is_success() {
            return Err(GeneratorError::Transport(format!(
                "generation service returned {status}: {text}"
            )));
        }

        let content = extract_content(&text)?;
        debug!(nonce = request.nonce, "generator returned candidate question");
        parse_question(&content)
    }
}

/// Pull choices[0].message.content out of a chat-completions response.
fn extract_content(body: &str) -> Result<String, GeneratorError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| GeneratorError::Parse(format!("malformed completion envelope: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .ok_or_else(|| GeneratorError::Parse("completion has no content".to_string()))
}

/// Decode and validate the question payload the model produced.
fn parse_question(content: &str) -> Result<GeneratedQuestion, GeneratorError> {
    let question: GeneratedQuestion = serde_json::from_str(content)
        .map_err(|e| GeneratorError::Parse(format!("not a question object: {e}")))?;
    question.validate()?;
    Ok(question)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest {
            topic: "Space".into(),
            min_age: 8,
            max_age: 12,
            nonce: 123456,
            index: 0,
            total: 5,
        }
    }

    #[test]
    fn test_prompt_names_topic_age_band_and_nonce() {
        let prompt = build_prompt(&request(), "fun and engaging", "multiple-choice question");
        assert!(prompt.contains("Topic: Space"));
        assert!(prompt.contains("ages 8 to 12"));
        assert!(prompt.contains("123456"));
        assert!(prompt.contains("question #1 of 5"));
    }

    #[test]
    fn test_extract_content_happy_path() {
        let body = r#"{"choices":[{"message":{"content":"  {\"question\":\"q\"} "}}]}"#;
        assert_eq!(extract_content(body).unwrap(), r#"{"question":"q"}"#);
    }

    #[test]
    fn test_extract_content_empty_choices() {
        let err = extract_content(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, GeneratorError::Parse(_)));
    }

    #[test]
    fn test_parse_question_valid() {
        let content = r#"{"question":"What is 2+2?","options":["3","4","5","6"],"answer":"4"}"#;
        let q = parse_question(content).unwrap();
        assert_eq!(q.prompt, "What is 2+2?");
        assert_eq!(q.answer, "4");
    }

    #[test]
    fn test_parse_question_missing_key() {
        let content = r#"{"question":"What is 2+2?","options":["3","4","5","6"]}"#;
        assert!(matches!(
            parse_question(content).unwrap_err(),
            GeneratorError::Parse(_)
        ));
    }

    #[test]
    fn test_parse_question_wrong_option_count() {
        let content = r#"{"question":"q","options":["3","4"],"answer":"4"}"#;
        assert!(matches!(
            parse_question(content).unwrap_err(),
            GeneratorError::Validation(_)
        ));
    }

    #[test]
    fn test_parse_question_answer_not_in_options() {
        let content = r#"{"question":"q","options":["3","4","5","6"],"answer":"7"}"#;
        assert!(matches!(
            parse_question(content).unwrap_err(),
            GeneratorError::Validation(_)
        ));
    }
}
