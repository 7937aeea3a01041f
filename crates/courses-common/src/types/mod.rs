//! Common types used across the course catalog workspace

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::MalformedKeyError;

const DEPARTMENT_LEN: usize = 4;
const NUMBER_LEN: usize = 4;
const SYMBOL_LEN: usize = 1;
const SECTION_LEN: usize = 3;
const CODE_LEN: usize = DEPARTMENT_LEN + NUMBER_LEN + SYMBOL_LEN + SECTION_LEN;

// ============================================================================
// Keys
// ============================================================================

/// Identifies a logical course family shared by every section of one offering,
/// e.g. `COMS4995`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one section of a course, e.g. `COMS4995W001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceKey(String);

impl InstanceKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A compound course code split into its fixed-width components.
///
/// `COMS4995W001` decomposes into department `COMS`, number `4995`,
/// symbol `W` and section `001`. Spaces inside the code are normalized to `_`
/// before matching, so `EE  4830E001` parses with department `EE__`.
///
/// # Examples
///
/// ```
/// use courses_common::types::CourseKey;
///
/// let key = CourseKey::parse("COMS4995W001").unwrap();
/// assert_eq!(key.department(), "COMS");
/// assert_eq!(key.number(), "4995");
/// assert_eq!(key.symbol(), "W");
/// assert_eq!(key.section(), "001");
///
/// assert!(CourseKey::parse("COMS4995W").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CourseKey {
    department: String,
    number: String,
    symbol: String,
    section: String,
}

impl CourseKey {
    /// Parse a compound course code. The normalized code must be exactly
    /// twelve word characters (ASCII letters, digits or `_`).
    pub fn parse(code: &str) -> Result<Self, MalformedKeyError> {
        let normalized: Vec<char> = code.chars().map(|c| if c == ' ' { '_' } else { c }).collect();

        if normalized.len() != CODE_LEN || !normalized.iter().all(|c| is_word_char(*c)) {
            return Err(MalformedKeyError::new(code));
        }

        let (department, rest) = normalized.split_at(DEPARTMENT_LEN);
        let (number, rest) = rest.split_at(NUMBER_LEN);
        let (symbol, section) = rest.split_at(SYMBOL_LEN);

        Ok(Self {
            department: department.iter().collect(),
            number: number.iter().collect(),
            symbol: symbol.iter().collect(),
            section: section.iter().collect(),
        })
    }

    pub fn department(&self) -> &str {
        &self.department
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    /// Department plus number: the first eight characters of the instance key.
    pub fn group_key(&self) -> GroupKey {
        GroupKey(format!("{}{}", self.department, self.number))
    }

    /// The full normalized twelve-character code.
    pub fn instance_key(&self) -> InstanceKey {
        InstanceKey(format!(
            "{}{}{}{}",
            self.department, self.number, self.symbol, self.section
        ))
    }

    /// Department, symbol and number as printed in the bulletin, e.g. `COMSW4995`.
    pub fn full_code(&self) -> String {
        format!("{}{}{}", self.department, self.symbol, self.number)
    }
}

impl fmt::Display for CourseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}",
            self.department, self.number, self.symbol, self.section
        )
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// ============================================================================
// Enrichment
// ============================================================================

/// Supplementary content attached to every section of a course family.
///
/// `NoDescription` means the provider answered with nothing; `Unavailable`
/// means the provider could not be asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enrichment {
    /// Description text found for the course family
    Description(Arc<str>),
    /// The provider answered but had no description
    NoDescription,
    /// The provider call failed
    Unavailable,
}

impl Enrichment {
    pub fn description(text: impl Into<Arc<str>>) -> Self {
        Enrichment::Description(text.into())
    }

    /// Description text, if any was found.
    pub fn text(&self) -> Option<&str> {
        match self {
            Enrichment::Description(text) => Some(&**text),
            Enrichment::NoDescription | Enrichment::Unavailable => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Enrichment::Unavailable)
    }

    /// Text stored in sinks that only carry a single description column.
    pub fn as_stored_text(&self) -> &str {
        match self {
            Enrichment::Description(text) => &**text,
            Enrichment::NoDescription => "no description",
            Enrichment::Unavailable => "",
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Enrichment::Description(_) => "found",
            Enrichment::NoDescription => "no_description",
            Enrichment::Unavailable => "unavailable",
        }
    }
}
