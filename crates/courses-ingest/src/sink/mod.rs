//! Output stage: per-record row sink and batched bulk-index sink
//!
//! [`Sinks`] is owned by the single consumer task of a run. Every enriched
//! entity goes to the row sink (if any) and then to the bulk indexer (if any).
//! Failures are logged and counted; none of them stop the run.

pub mod bulk;
pub mod catalog;
pub mod jsonl;
#[cfg(feature = "database")]
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::SinkError;
use crate::models::EnrichedEntity;

pub use bulk::{BulkIndexer, BulkStats, BulkTransport, HttpBulkTransport, IndexTarget};
pub use catalog::{CatalogSink, CatalogStore, CatalogTables};
pub use jsonl::JsonLinesSink;
#[cfg(feature = "database")]
pub use postgres::{PgCatalog, PgRowSink};

/// Destination receiving one write per enriched entity
#[async_trait]
pub trait RowSink: Send + Sync {
    async fn write(&self, row: &EnrichedEntity) -> Result<(), SinkError>;

    /// Flush buffered output at the end of a run.
    async fn finish(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Counters reported by the sink stage
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SinkStats {
    /// Entities that reached the sink stage
    pub delivered: u64,
    pub rows_written: u64,
    pub row_failures: u64,
    pub bulk: BulkStats,
}

/// The configured sinks of one run
#[derive(Default)]
pub struct Sinks {
    rows: Option<Arc<dyn RowSink>>,
    bulk: Option<BulkIndexer>,
    stats: SinkStats,
}

impl Sinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, sink: Arc<dyn RowSink>) -> Self {
        self.rows = Some(sink);
        self
    }

    pub fn with_bulk(mut self, indexer: BulkIndexer) -> Self {
        self.bulk = Some(indexer);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_none() && self.bulk.is_none()
    }

    /// Hand one entity to every configured sink.
    pub async fn deliver(&mut self, row: EnrichedEntity) {
        self.stats.delivered += 1;

        if let Some(sink) = &self.rows {
            match sink.write(&row).await {
                Ok(()) => self.stats.rows_written += 1,
                Err(err) => {
                    self.stats.row_failures += 1;
                    warn!(course = %row.entity.instance_key, error = %err, "Row write failed");
                },
            }
        }

        if let Some(indexer) = &mut self.bulk {
            indexer.push(&row).await;
        }
    }

    /// Flush the bulk remainder and any buffered row output.
    pub async fn finish(mut self) -> SinkStats {
        if let Some(indexer) = &mut self.bulk {
            self.stats.bulk = indexer.finish().await;
        }

        if let Some(sink) = &self.rows {
            if let Err(err) = sink.finish().await {
                self.stats.row_failures += 1;
                warn!(error = %err, "Failed to flush row sink");
            }
        }

        debug!(delivered = self.stats.delivered, "Sink stage finished");
        self.stats
    }

    /// Consume `input` until every sender is gone, then finish.
    pub async fn drain(mut self, mut input: mpsc::Receiver<EnrichedEntity>) -> SinkStats {
        while let Some(row) = input.recv().await {
            self.deliver(row).await;
        }
        self.finish().await
    }
}
