//! Pipeline coordinator
//!
//! One run wires four stages together with bounded channels:
//!
//! ```text
//! decoder + normalizer ──▶ enrichment workers (N) ──▶ sinks
//!       (1 task)                 (JoinSet)            (1 task)
//! ```
//!
//! Completion cascades through channel closure. The producer drops its sender
//! at end of input, the workers exit once the entity channel is drained and
//! drop theirs, and the sink task finishes (flushing the bulk remainder) once
//! the enriched channel is closed.

use std::sync::Arc;

use serde::Serialize;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::decoder::RecordStream;
use crate::enrich::{AdmissionControl, DispatchStats, Dispatcher, EnrichmentProvider};
use crate::error::{IngestError, ParseError};
use crate::models::CanonicalEntity;
use crate::normalize::normalize;
use crate::sink::Sinks;

pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Counters for one completed run
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Records decoded from the input
    pub decoded: u64,
    /// Entities that reached the sink stage
    pub processed: u64,
    pub skipped_malformed_key: u64,
    pub enrichment_unavailable: u64,
    /// Course families resolved through the dedup cache, one provider
    /// lookup each
    pub groups_computed: u64,
    pub rows_written: u64,
    pub row_failures: u64,
    pub bulk_flushes: u64,
    pub bulk_failures: u64,
    pub bulk_documents: u64,
}

impl RunSummary {
    pub fn sink_failures(&self) -> u64 {
        self.row_failures + self.bulk_failures
    }
}

#[derive(Debug, Default)]
struct ProduceStats {
    decoded: u64,
    skipped: u64,
}

pub struct Pipeline {
    provider: Arc<dyn EnrichmentProvider>,
    admission: AdmissionControl,
    workers: usize,
    queue_capacity: usize,
}

impl Pipeline {
    pub fn new(provider: Arc<dyn EnrichmentProvider>, admission: AdmissionControl) -> Self {
        Self {
            provider,
            admission,
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Requests that can be in flight at once. Each worker holds at most one
    /// permit, so a ceiling above the pool size is never reached.
    pub fn request_ceiling(&self) -> usize {
        self.admission.limit().min(self.workers)
    }

    /// Ingest one JSON array from `input` into `sinks`.
    ///
    /// Per-record problems are counted in the summary. A framing error in the
    /// input stops decoding; entities already dispatched still reach the
    /// sinks before the error is returned.
    pub async fn run<R>(&self, input: R, sinks: Sinks) -> Result<RunSummary, IngestError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (entity_tx, entity_rx) = mpsc::channel(self.queue_capacity);
        let (enriched_tx, enriched_rx) = mpsc::channel(self.queue_capacity);

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&self.provider),
            self.admission.clone(),
            self.workers,
        ));
        let cache = Arc::clone(dispatcher.cache());

        if self.admission.limit() > self.workers {
            warn!(
                max_requests = self.admission.limit(),
                workers = self.workers,
                "Request ceiling exceeds the worker pool; capping at the worker count"
            );
        }

        info!(
            workers = self.workers,
            max_requests = self.request_ceiling(),
            queue_capacity = self.queue_capacity,
            "Starting ingestion run"
        );

        let producer = tokio::spawn(produce(RecordStream::new(input), entity_tx));
        let mut workers = dispatcher.spawn(entity_rx, enriched_tx);
        let consumer = tokio::spawn(sinks.drain(enriched_rx));

        let (produced, parse_error) = producer.await?;

        let mut dispatched = DispatchStats::default();
        while let Some(worker) = workers.join_next().await {
            dispatched += worker?;
        }

        let sunk = consumer.await?;

        let summary = RunSummary {
            decoded: produced.decoded,
            processed: sunk.delivered,
            skipped_malformed_key: produced.skipped,
            enrichment_unavailable: dispatched.unavailable,
            groups_computed: cache.computations() as u64,
            rows_written: sunk.rows_written,
            row_failures: sunk.row_failures,
            bulk_flushes: sunk.bulk.flushes,
            bulk_failures: sunk.bulk.failed_flushes,
            bulk_documents: sunk.bulk.documents,
        };

        match parse_error {
            Some(err) => {
                error!(
                    decoded = summary.decoded,
                    processed = summary.processed,
                    error = %err,
                    "Run stopped by malformed input"
                );
                Err(IngestError::Parse(err))
            },
            None => {
                info!(
                    decoded = summary.decoded,
                    processed = summary.processed,
                    skipped = summary.skipped_malformed_key,
                    unavailable = summary.enrichment_unavailable,
                    groups_computed = summary.groups_computed,
                    sink_failures = summary.sink_failures(),
                    bulk_flushes = summary.bulk_flushes,
                    "Ingestion run complete"
                );
                Ok(summary)
            },
        }
    }
}

/// Decode and normalize records, forwarding entities until the input ends.
async fn produce<R>(
    mut records: RecordStream<R>,
    output: mpsc::Sender<CanonicalEntity>,
) -> (ProduceStats, Option<ParseError>)
where
    R: AsyncRead + Unpin,
{
    let mut stats = ProduceStats::default();

    loop {
        let raw = match records.next().await {
            Ok(Some(raw)) => raw,
            Ok(None) => break,
            Err(err) => return (stats, Some(err)),
        };
        stats.decoded += 1;

        match normalize(raw) {
            Ok(entity) => {
                if output.send(entity).await.is_err() {
                    warn!("Enrichment stage closed, producer stopping");
                    break;
                }
            },
            Err(err) => {
                stats.skipped += 1;
                warn!(course = %err.code, "Skipping record with malformed course code");
            },
        }
    }

    info!(decoded = stats.decoded, skipped = stats.skipped, "Input exhausted");
    (stats, None)
}
