//! Output sinks for formatted records.

use std::path::Path;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};

use crate::error::{HarvestError, Result};
use crate::models::{BatchMeta, FormattedRecord};

/// Receives deduplicated, positioned records.
///
/// Records within one call are in position order. Calls for the same
/// listing arrive in emission order.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn emit(&self, records: Vec<FormattedRecord>, meta: BatchMeta) -> Result<()>;
}

/// One sink call, as delivered by [`ChannelSink`].
#[derive(Debug, Clone)]
pub struct EmittedBatch {
    pub records: Vec<FormattedRecord>,
    pub meta: BatchMeta,
}

/// Forwards every batch over an mpsc channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EmittedBatch>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EmittedBatch>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl OutputSink for ChannelSink {
    async fn emit(&self, records: Vec<FormattedRecord>, meta: BatchMeta) -> Result<()> {
        self.tx
            .send(EmittedBatch { records, meta })
            .map_err(|_| HarvestError::Sink("receiver dropped".to_string()))
    }
}

/// Writes one JSON object per record per line.
pub struct JsonLinesSink {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl JsonLinesSink {
    pub fn new(writer: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(tokio::io::stdout()))
    }

    /// Create (or truncate) a file and write records to it.
    pub async fn create(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::create(path)
            .await
            .map_err(|e| HarvestError::Sink(format!("{}: {}", path.display(), e)))?;
        Ok(Self::new(Box::new(file)))
    }
}

#[async_trait]
impl OutputSink for JsonLinesSink {
    async fn emit(&self, records: Vec<FormattedRecord>, _meta: BatchMeta) -> Result<()> {
        let mut buf = Vec::new();
        for record in &records {
            serde_json::to_writer(&mut buf, record).map_err(|e| HarvestError::Sink(e.to_string()))?;
            buf.push(b'\n');
        }

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&buf)
            .await
            .map_err(|e| HarvestError::Sink(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| HarvestError::Sink(e.to_string()))
    }
}
