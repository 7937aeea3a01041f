//! Error types for the ingestion pipeline
//!
//! Only [`ParseError`] ends a run. Every other error is scoped to one record,
//! one enrichment lookup or one sink write, and is logged and counted.

use thiserror::Error;

pub use courses_common::MalformedKeyError;

/// The input is not a well-formed JSON array of records. Fatal for the run.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("input is not a JSON array: expected '[' but found {found:?}")]
    NotAnArray { found: char },

    #[error("unexpected {found:?} between records at byte {offset}: expected ',' or ']'")]
    UnexpectedSeparator { found: char, offset: u64 },

    #[error("malformed record at byte {offset}: {source}")]
    MalformedRecord {
        offset: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("input ended before the closing ']' after {records} records")]
    UnexpectedEof { records: u64 },

    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

/// An enrichment lookup failed. The record continues as `Unavailable`.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("admission control has been closed")]
    AdmissionClosed,

    #[error("{0}")]
    Other(String),
}

/// A sink could not persist a record or batch.
#[derive(Error, Debug)]
pub enum SinkError {
    #[cfg(feature = "database")]
    #[error("database write failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("bulk request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bulk endpoint answered with status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("bulk endpoint rejected {failed} of {documents} documents")]
    Rejected { failed: usize, documents: usize },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors that end a pipeline run
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("input framing error: {0}")]
    Parse(#[from] ParseError),

    #[error("pipeline task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
