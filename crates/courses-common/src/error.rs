//! Error types for the shared course types

use thiserror::Error;

/// A compound course code did not have the `DEPT NUMBER SYMBOL SECTION` shape
/// (4 + 4 + 1 + 3 word characters).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed course code {code:?}: expected 4-char department, 4-char number, 1-char symbol and 3-char section")]
pub struct MalformedKeyError {
    /// The code as it appeared in the record, before space normalization
    pub code: String,
}

impl MalformedKeyError {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}
