//! Store data model.

use serde::{Deserialize, Serialize};

/// A question as stored, with options decoded from their JSON column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Question {
    pub id: i64,
    pub prompt: String,
    pub options: Vec<String>,
    pub answer: String,
    pub topic: String,
    pub min_age: i64,
    pub max_age: i64,
    pub content_hash: String,
    pub created_at: String,
}

/// Input for insertion; the store assigns id, hash, and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQuestion {
    pub prompt: String,
    pub options: Vec<String>,
    pub answer: String,
    pub topic: String,
    pub min_age: i64,
    pub max_age: i64,
}

impl NewQuestion {
    /// Structural validation: exactly four distinct options, the answer is
    /// one of them, and the age band is ordered.
    pub fn validate(&self) -> Result<(), String> {
        if self.options.len() != 4 {
            return Err(format!("expected 4 options, got {}", self.options.len()));
        }
        for (i, a) in self.options.iter().enumerate() {
            if self.options[i + 1..].contains(a) {
                return Err(format!("duplicate option: {a:?}"));
            }
        }
        if !self.options.contains(&self.answer) {
            return Err("answer is not one of the options".to_string());
        }
        if self.min_age > self.max_age {
            return Err(format!(
                "min_age {} exceeds max_age {}",
                self.min_age, self.max_age
            ));
        }
        Ok(())
    }
}

/// Outcome of a single insert attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(i64),
    Duplicate,
    Invalid(String),
}

/// Outcome of a bulk import. Duplicates and invalid entries are counted,
/// never fatal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    pub imported: u64,
    pub skipped: u64,
}

/// Outcome of an atomic multi-row assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Ok,
    /// At least one row violated `(recipient, question)` uniqueness; the
    /// whole unit was rolled back.
    Conflict,
}

/// An identified consumer of questions.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Recipient {
    pub id: i64,
    pub identifier: String,
    pub created_at: String,
}

/// Read-path filters. `topic` is a case-insensitive substring match; the
/// reserved token `random` (any casing) disables it.
#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    pub age: Option<i64>,
    pub topic: Option<String>,
}

impl QuestionFilter {
    /// The topic filter actually in effect, if any.
    pub fn effective_topic(&self) -> Option<&str> {
        self.topic
            .as_deref()
            .filter(|t| !t.eq_ignore_ascii_case("random"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question() -> NewQuestion {
        NewQuestion {
            prompt: "What is 2+2?".into(),
            options: vec!["3".into(), "4".into(), "5".into(), "6".into()],
            answer: "4".into(),
            topic: "Science".into(),
            min_age: 8,
            max_age: 12,
        }
    }

    #[test]
    fn test_valid_question_passes() {
        assert!(question().validate().is_ok());
    }

    #[test]
    fn test_wrong_option_count_rejected() {
        let mut q = question();
        q.options.pop();
        assert!(q.validate().is_err());
    }

    #[test]
    fn test_duplicate_options_rejected() {
        let mut q = question();
        q.options[2] = "4".into();
        assert!(q.validate().is_err());
    }

    #[test]
    fn test_answer_must_be_an_option() {
        let mut q = question();
        q.answer = "7".into();
        assert!(q.validate().is_err());
    }

    #[test]
    fn test_inverted_age_band_rejected() {
        let mut q = question();
        q.min_age = 20;
        assert!(q.validate().is_err());
    }

    #[test]
    fn test_random_topic_disables_filter() {
        let filter = QuestionFilter {
            age: None,
            topic: Some("Random".into()),
        };
        assert_eq!(filter.effective_topic(), None);

        let filter = QuestionFilter {
            age: None,
            topic: Some("rAnDoM".into()),
        };
        assert_eq!(filter.effective_topic(), None);

        let filter = QuestionFilter {
            age: None,
            topic: Some("Space".into()),
        };
        assert_eq!(filter.effective_topic(), Some("Space"));
    }
}
