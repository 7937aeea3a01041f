//! Courses Ingest Library
//!
//! Streaming ingestion of course-section records: a JSON array is decoded
//! incrementally, each record is normalized, every course family is enriched
//! once with its bulletin description, and the results are written to a row
//! sink and a batched bulk-index sink.
//!
//! # Stages
//!
//! - **decoder**: pull-based parser over any `AsyncRead`
//! - **normalize**: pure record to entity transform
//! - **enrich**: worker pool, dedup cache and admission control
//! - **sink**: row sinks (JSON lines, Postgres) and the bulk indexer
//! - **pipeline**: wires the stages together and reports a [`RunSummary`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use courses_ingest::enrich::{AdmissionControl, NoopProvider};
//! use courses_ingest::pipeline::Pipeline;
//! use courses_ingest::sink::{JsonLinesSink, Sinks};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let input = tokio::fs::File::open("./data/courses.json").await?;
//!     let rows = JsonLinesSink::create("./data/rows.jsonl").await?;
//!
//!     let summary = Pipeline::new(Arc::new(NoopProvider), AdmissionControl::new(10))
//!         .run(input, Sinks::new().with_rows(Arc::new(rows)))
//!         .await?;
//!     println!("{} sections written", summary.rows_written);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod decoder;
pub mod enrich;
pub mod error;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod sink;

pub use error::{IngestError, ParseError, ProviderError, SinkError};
pub use pipeline::{Pipeline, RunSummary};
