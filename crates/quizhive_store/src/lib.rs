//! Question repository for the supply engine.
//!
//! SQLite via sqlx. Two invariants live here and are backed by unique
//! indexes: a question's content hash is globally unique, and a
//! `(recipient, question)` pair is assigned at most once.

pub mod error;
pub mod hash;
pub mod models;
mod store;

pub use error::StoreError;
pub use hash::{content_hash, normalize_text};
pub use models::{
    AssignOutcome, ImportOutcome, InsertOutcome, NewQuestion, Question, QuestionFilter, Recipient,
};
pub use store::Store;
