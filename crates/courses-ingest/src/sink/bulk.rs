//! Batched bulk-index sink
//!
//! Entities are buffered into fixed-size batches. Each full batch, and the
//! final partial one, is encoded as newline-delimited action/document pairs
//! and sent as one request. A failed batch is logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::SinkError;
use crate::models::EnrichedEntity;

/// Carries one encoded batch to the index
#[async_trait]
pub trait BulkTransport: Send + Sync {
    /// Send a request body holding `documents` action/document pairs.
    async fn send(&self, body: String, documents: usize) -> Result<(), SinkError>;
}

/// Index name and optional mapping type stamped on every action line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTarget {
    pub index: String,
    pub doc_type: Option<String>,
}

impl IndexTarget {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: None,
        }
    }

    pub fn with_doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct BulkAction {
    index: ActionMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct ActionMeta {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_type", skip_serializing_if = "Option::is_none")]
    doc_type: Option<String>,
    #[serde(rename = "_id")]
    id: String,
}

/// Searchable fields of one section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BulkDocument {
    pub course: String,
    pub course_full: String,
    pub course_title: String,
    pub course_subtitle: String,
    pub department_code: String,
    pub department_name: String,
    /// Empty unless a description was found
    pub description: String,
    pub term: String,
    pub call_number: String,
    pub instructors: Vec<String>,
}

impl From<&EnrichedEntity> for BulkDocument {
    fn from(row: &EnrichedEntity) -> Self {
        let entity = &row.entity;
        Self {
            course: entity.instance_key.to_string(),
            course_full: entity.course.full_code.clone(),
            course_title: entity.course.title.clone(),
            course_subtitle: entity.course.subtitle.clone(),
            department_code: entity.course.department_code.clone(),
            department_name: entity.course.department_name.clone(),
            description: row.enrichment.text().unwrap_or_default().to_string(),
            term: entity.term.clone(),
            call_number: entity.section.call_number.clone(),
            instructors: entity
                .section
                .named_instructors()
                .map(str::to_string)
                .collect(),
        }
    }
}

/// One action line and its document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItem {
    action: BulkAction,
    document: BulkDocument,
}

impl BulkItem {
    pub fn new(target: &IndexTarget, row: &EnrichedEntity) -> Self {
        Self {
            action: BulkAction {
                index: ActionMeta {
                    index: target.index.clone(),
                    doc_type: target.doc_type.clone(),
                    id: row.entity.instance_key.to_string(),
                },
            },
            document: BulkDocument::from(row),
        }
    }

    pub fn id(&self) -> &str {
        &self.action.index.id
    }
}

/// Encode a batch as a bulk request body.
pub fn encode(items: &[BulkItem]) -> Result<String, serde_json::Error> {
    let mut body = String::new();
    for item in items {
        body.push_str(&serde_json::to_string(&item.action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&item.document)?);
        body.push('\n');
    }
    Ok(body)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BulkStats {
    /// Requests issued, successful or not
    pub flushes: u64,
    pub failed_flushes: u64,
    /// Documents in successful requests
    pub documents: u64,
}

/// Owns the pending batch and flushes it through a [`BulkTransport`].
pub struct BulkIndexer {
    transport: Arc<dyn BulkTransport>,
    target: IndexTarget,
    batch_size: usize,
    batch: Vec<BulkItem>,
    stats: BulkStats,
}

impl BulkIndexer {
    pub fn new(transport: Arc<dyn BulkTransport>, target: IndexTarget, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            transport,
            target,
            batch_size,
            batch: Vec::with_capacity(batch_size),
            stats: BulkStats::default(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Items waiting for the next flush
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    /// Append an entity, flushing if the batch is full.
    pub async fn push(&mut self, row: &EnrichedEntity) {
        self.batch.push(BulkItem::new(&self.target, row));
        if self.batch.len() >= self.batch_size {
            self.flush().await;
        }
    }

    /// Flush the remainder and return the counters.
    pub async fn finish(&mut self) -> BulkStats {
        self.flush().await;
        info!(
            flushes = self.stats.flushes,
            failed = self.stats.failed_flushes,
            documents = self.stats.documents,
            "Bulk indexing finished"
        );
        self.stats
    }

    async fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }

        let items = std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size));
        self.stats.flushes += 1;

        let body = match encode(&items) {
            Ok(body) => body,
            Err(err) => {
                self.stats.failed_flushes += 1;
                warn!(documents = items.len(), error = %err, "Failed to encode bulk batch");
                return;
            },
        };

        match self.transport.send(body, items.len()).await {
            Ok(()) => {
                self.stats.documents += items.len() as u64;
                debug!(documents = items.len(), "Bulk batch indexed");
            },
            Err(err) => {
                self.stats.failed_flushes += 1;
                warn!(
                    documents = items.len(),
                    first = items.first().map(BulkItem::id).unwrap_or_default(),
                    error = %err,
                    "Bulk batch failed"
                );
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

impl BulkResponse {
    fn failed_items(&self) -> usize {
        self.items
            .iter()
            .filter_map(|item| item.as_object().and_then(|actions| actions.values().next()))
            .filter(|result| result.get("error").is_some())
            .count()
    }
}

/// Elasticsearch bulk API over HTTP
#[derive(Debug, Clone)]
pub struct HttpBulkTransport {
    client: Client,
    base_url: String,
    index: String,
}

impl HttpBulkTransport {
    /// Build a transport whose requests give up after `timeout`.
    pub fn new(
        base_url: &str,
        index: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("courses-ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_client(client, base_url, index))
    }

    pub fn with_client(client: Client, base_url: &str, index: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.into(),
        }
    }

    fn index_url(&self) -> String {
        format!("{}/{}", self.base_url, self.index)
    }

    /// Delete and recreate the index. A failed delete is only logged.
    pub async fn reset_index(&self) -> Result<(), SinkError> {
        let url = self.index_url();

        match self.client.delete(&url).send().await {
            Ok(response) if response.status().is_success() => {
                info!(index = %self.index, "Deleted index");
            },
            Ok(response) => {
                warn!(index = %self.index, status = %response.status(), "Could not delete index");
            },
            Err(err) => {
                warn!(index = %self.index, error = %err, "Could not delete index");
            },
        }

        let response = self.client.put(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Status { status, body });
        }

        info!(index = %self.index, "Created index");
        Ok(())
    }
}

#[async_trait]
impl BulkTransport for HttpBulkTransport {
    async fn send(&self, body: String, documents: usize) -> Result<(), SinkError> {
        let response = self
            .client
            .post(format!("{}/_bulk", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Status { status, body });
        }

        let result: BulkResponse = response.json().await?;
        if result.errors {
            return Err(SinkError::Rejected {
                failed: result.failed_items(),
                documents,
            });
        }
        Ok(())
    }
}
