//! Enrichment stage: per-group description lookup shared by every section
//!
//! Providers implement [`EnrichmentProvider`]. The [`Dispatcher`] runs a
//! fixed pool of workers, consults the [`DedupCache`] so each course family
//! is looked up once per run, and caps in-flight provider calls with
//! [`AdmissionControl`].

pub mod admission;
pub mod bulletin;
pub mod cache;
pub mod dispatcher;

use async_trait::async_trait;
use courses_common::CourseKey;

use crate::error::ProviderError;

pub use admission::AdmissionControl;
pub use bulletin::BulletinProvider;
pub use cache::DedupCache;
pub use dispatcher::{DispatchStats, Dispatcher};

/// Source of supplementary course text
#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    /// Look up the description for a course section.
    ///
    /// `Ok(None)` means the provider answered but had nothing for this course.
    async fn lookup(&self, course: &CourseKey, term: &str) -> Result<Option<String>, ProviderError>;
}

/// Provider that never finds anything. Used when enrichment is turned off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProvider;

#[async_trait]
impl EnrichmentProvider for NoopProvider {
    async fn lookup(&self, _course: &CourseKey, _term: &str) -> Result<Option<String>, ProviderError> {
        Ok(None)
    }
}
