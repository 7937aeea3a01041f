//! Courses Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging setup and error handling for the course catalog workspace.
//!
//! # Overview
//!
//! - **Types**: course codes and the keys derived from them, enrichment results
//! - **Logging**: one place to initialise `tracing` for every binary
//! - **Errors**: errors that belong to the shared types
//!
//! # Example
//!
//! ```
//! use courses_common::types::CourseKey;
//!
//! let key = CourseKey::parse("COMS4995W001").unwrap();
//! assert_eq!(key.group_key().as_str(), "COMS4995");
//! assert_eq!(key.instance_key().as_str(), "COMS4995W001");
//! assert_eq!(key.full_code(), "COMSW4995");
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::MalformedKeyError;
pub use types::{CourseKey, Enrichment, GroupKey, InstanceKey};
