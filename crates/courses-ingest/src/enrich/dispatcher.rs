//! Worker pool attaching enrichment to each entity

use std::ops::AddAssign;
use std::sync::Arc;

use courses_common::Enrichment;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::admission::AdmissionControl;
use super::cache::DedupCache;
use super::EnrichmentProvider;
use crate::models::{CanonicalEntity, EnrichedEntity};

/// Per-worker counters, summed when the pool finishes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub enriched: u64,
    pub unavailable: u64,
}

impl AddAssign for DispatchStats {
    fn add_assign(&mut self, other: Self) {
        self.enriched += other.enriched;
        self.unavailable += other.unavailable;
    }
}

pub struct Dispatcher {
    provider: Arc<dyn EnrichmentProvider>,
    admission: AdmissionControl,
    cache: Arc<DedupCache>,
    workers: usize,
}

impl Dispatcher {
    pub fn new(
        provider: Arc<dyn EnrichmentProvider>,
        admission: AdmissionControl,
        workers: usize,
    ) -> Self {
        Self {
            provider,
            admission,
            cache: Arc::new(DedupCache::new()),
            workers: workers.max(1),
        }
    }

    /// Use an existing cache instead of a fresh one.
    pub fn with_cache(mut self, cache: Arc<DedupCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<DedupCache> {
        &self.cache
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Attach the course family's enrichment, looking it up on first sight.
    pub async fn enrich(&self, entity: CanonicalEntity) -> EnrichedEntity {
        let group = entity.group_key.clone();
        let enrichment = self
            .cache
            .get_or_compute(&group, || self.fetch(&entity))
            .await;
        EnrichedEntity { entity, enrichment }
    }

    async fn fetch(&self, entity: &CanonicalEntity) -> Enrichment {
        let lookup = self
            .admission
            .run(self.provider.lookup(&entity.key, &entity.term))
            .await;

        match lookup {
            Ok(Some(text)) => {
                debug!(group = %entity.group_key, "Found description");
                Enrichment::description(text)
            },
            Ok(None) => {
                debug!(group = %entity.group_key, course = %entity.course_code, "No description found");
                Enrichment::NoDescription
            },
            Err(err) => {
                warn!(
                    group = %entity.group_key,
                    course = %entity.course_code,
                    error = %err,
                    "Enrichment unavailable"
                );
                Enrichment::Unavailable
            },
        }
    }

    /// Start the worker pool.
    ///
    /// Workers pull from `input` until it closes and push to `output`. The
    /// pool holds the only senders on `output`, so the receiver sees the
    /// channel close once every worker has finished.
    pub fn spawn(
        self: Arc<Self>,
        input: mpsc::Receiver<CanonicalEntity>,
        output: mpsc::Sender<EnrichedEntity>,
    ) -> JoinSet<DispatchStats> {
        let input = Arc::new(Mutex::new(input));
        let mut pool = JoinSet::new();

        for worker in 0..self.workers {
            let dispatcher = Arc::clone(&self);
            let input = Arc::clone(&input);
            let output = output.clone();
            pool.spawn(async move { dispatcher.work(worker, input, output).await });
        }

        debug!(workers = self.workers, limit = self.admission.limit(), "Enrichment workers started");
        pool
    }

    async fn work(
        &self,
        worker: usize,
        input: Arc<Mutex<mpsc::Receiver<CanonicalEntity>>>,
        output: mpsc::Sender<EnrichedEntity>,
    ) -> DispatchStats {
        let mut stats = DispatchStats::default();

        loop {
            let next = input.lock().await.recv().await;
            let Some(entity) = next else { break };

            let enriched = self.enrich(entity).await;
            stats.enriched += 1;
            if enriched.enrichment.is_unavailable() {
                stats.unavailable += 1;
            }

            if output.send(enriched).await.is_err() {
                warn!(worker, "Sink stage closed, worker stopping");
                break;
            }
        }

        debug!(worker, enriched = stats.enriched, "Worker finished");
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use async_trait::async_trait;
    use courses_common::CourseKey;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EnrichmentProvider for ScriptedProvider {
        async fn lookup(&self, course: &CourseKey, _term: &str) -> Result<Option<String>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match course.department() {
                "COMS" => Ok(Some(format!("About {}", course.full_code()))),
                "ACTU" => Ok(None),
                _ => Err(ProviderError::Other("bulletin offline".into())),
            }
        }
    }

    fn dispatcher() -> (Arc<ScriptedProvider>, Dispatcher) {
        let provider = Arc::new(ScriptedProvider {
            calls: AtomicUsize::new(0),
        });
        let dispatcher = Dispatcher::new(provider.clone(), AdmissionControl::new(2), 4);
        (provider, dispatcher)
    }

    fn entity(code: &str) -> CanonicalEntity {
        CanonicalEntity::from_key(CourseKey::parse(code).unwrap(), "20143")
    }

    #[tokio::test]
    async fn test_enrich_outcomes() {
        let (provider, dispatcher) = dispatcher();

        let found = dispatcher.enrich(entity("COMS4995W001")).await;
        assert_eq!(found.enrichment.text(), Some("About COMSW4995"));

        let empty = dispatcher.enrich(entity("ACTU4850K001")).await;
        assert_eq!(empty.enrichment, Enrichment::NoDescription);

        let failed = dispatcher.enrich(entity("MATH1101V001")).await;
        assert_eq!(failed.enrichment, Enrichment::Unavailable);

        let cached = dispatcher.enrich(entity("MATH1101V002")).await;
        assert_eq!(cached.enrichment, Enrichment::Unavailable);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_pool_drains_and_closes_output() {
        let (provider, dispatcher) = dispatcher();
        let (entity_tx, entity_rx) = mpsc::channel(4);
        let (enriched_tx, mut enriched_rx) = mpsc::channel(4);

        let mut pool = Arc::new(dispatcher).spawn(entity_rx, enriched_tx);

        let producer = tokio::spawn(async move {
            for section in ["001", "002", "003", "004", "005", "006"] {
                entity_tx
                    .send(entity(&format!("COMS4995W{section}")))
                    .await
                    .unwrap();
            }
            entity_tx.send(entity("MATH1101V001")).await.unwrap();
        });

        let mut received = Vec::new();
        while let Some(enriched) = enriched_rx.recv().await {
            received.push(enriched);
        }
        producer.await.unwrap();

        let mut stats = DispatchStats::default();
        while let Some(worker) = pool.join_next().await {
            stats += worker.unwrap();
        }

        assert_eq!(received.len(), 7);
        assert_eq!(stats.enriched, 7);
        assert_eq!(stats.unavailable, 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
