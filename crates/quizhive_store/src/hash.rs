//! Canonical content hashing for deduplication.
//!
//! Two questions that differ only in casing, whitespace, punctuation
//! spacing, or option order must hash identically. The canonical form is
//! `prompt | answer | sorted options` after normalization, and the hash is
//! the first 16 hex characters of its SHA-256.

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the full digest.
const HASH_LEN: usize = 16;

/// Punctuation whose surrounding spacing is standardized.
fn is_adjusted_punct(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | ',' | ':' | ';')
}

/// Normalize text for hashing: lowercase, collapse whitespace runs to a
/// single space, strip the space before each punctuation mark and emit a
/// single space after it, and trim.
///
/// Each mark is handled independently, so consecutive marks end up
/// separated by the spaces they emit (`"end.."` becomes `"end. ."`).
pub fn normalize_text(text: &str) -> String {
    let lowered = text.to_lowercase();

    // Collapse all whitespace runs first so the punctuation pass only ever
    // sees single spaces.
    let mut collapsed = String::with_capacity(lowered.len());
    for word in lowered.split_whitespace() {
        if !collapsed.is_empty() {
            collapsed.push(' ');
        }
        collapsed.push_str(word);
    }

    let mut out = String::with_capacity(collapsed.len());
    let mut chars = collapsed.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ' ' {
            // A space directly before a mark belongs to that mark's
            // leading run; the mark re-emits its own trailing space.
            if chars.peek().copied().is_some_and(is_adjusted_punct) {
                continue;
            }
            out.push(' ');
        } else if is_adjusted_punct(c) {
            out.push(c);
            out.push(' ');
            if chars.peek() == Some(&' ') {
                chars.next();
            }
        } else {
            out.push(c);
        }
    }

    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Deterministic fingerprint of a question's content.
///
/// Options are normalized individually and sorted so ordering does not
/// affect the result.
pub fn content_hash(prompt: &str, answer: &str, options: &[String]) -> String {
    let mut parts = vec![normalize_text(prompt), normalize_text(answer)];

    let mut norm_options: Vec<String> = options.iter().map(|o| normalize_text(o)).collect();
    norm_options.sort();
    parts.extend(norm_options);

    let canonical = parts.join("|");
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)[..HASH_LEN].to_string()
}
