//! Ceiling on concurrent outbound provider calls

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::ProviderError;

/// Counting semaphore shared by all enrichment workers.
///
/// Cloning shares the same ceiling.
#[derive(Debug, Clone)]
pub struct AdmissionControl {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

/// Held for the duration of one provider call
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionControl {
    /// A ceiling of `limit` concurrent calls. Zero is raised to one.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Calls currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.limit - self.semaphore.available_permits()
    }

    /// Wait for a free slot.
    pub async fn admit(&self) -> Result<AdmissionPermit, ProviderError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| ProviderError::AdmissionClosed)?;
        Ok(AdmissionPermit { _permit: permit })
    }

    /// Run `call` while holding a permit.
    pub async fn run<F, T>(&self, call: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        let _permit = self.admit().await?;
        call.await
    }

    /// Refuse all further admissions. Waiting callers get
    /// [`ProviderError::AdmissionClosed`].
    pub fn close(&self) {
        self.semaphore.close();
    }
}
