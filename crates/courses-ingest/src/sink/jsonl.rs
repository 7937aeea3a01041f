//! JSON-lines row sink

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use super::RowSink;
use crate::error::SinkError;
use crate::models::{EnrichedEntity, EnrichedRow};

/// Writes each enriched entity as one JSON object per line.
pub struct JsonLinesSink<W> {
    writer: Mutex<BufWriter<W>>,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().into_inner()
    }
}

impl JsonLinesSink<tokio::fs::File> {
    /// Create or truncate `path`.
    pub async fn create(path: impl AsRef<std::path::Path>) -> Result<Self, SinkError> {
        let file = tokio::fs::File::create(path).await?;
        Ok(Self::new(file))
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> RowSink for JsonLinesSink<W> {
    async fn write(&self, row: &EnrichedEntity) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(&EnrichedRow::from(row))?;
        line.push(b'\n');
        self.writer.lock().await.write_all(&line).await?;
        Ok(())
    }

    async fn finish(&self) -> Result<(), SinkError> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }
}
