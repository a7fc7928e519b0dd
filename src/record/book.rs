//! In-memory record buffer with on-demand persistence.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;

use super::format::{self, OutputFormat};
use super::{ExchangeRecord, RequestRecorder};
use crate::error::RecorderError;

/// Buffers completed exchange records until they are flushed to disk.
///
/// Appends are serialized by the internal mutex; concurrent exchange tasks
/// may record at any time and records land in completion order. With echo
/// enabled, every record also prints a one-line notice as a side channel
/// (it is not the persisted record).
pub struct LogBook {
    records: Mutex<Vec<ExchangeRecord>>,
    echo: bool,
}

impl LogBook {
    pub fn new(echo: bool) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            echo,
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("record buffer poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current buffer, in arrival order.
    pub fn snapshot(&self) -> Vec<ExchangeRecord> {
        self.records.lock().expect("record buffer poisoned").clone()
    }
}

#[async_trait]
impl RequestRecorder for LogBook {
    fn record(&self, record: ExchangeRecord) {
        if self.echo {
            println!("Logged request: {} | {}", record.method, record.target);
        }
        tracing::debug!(
            method = %record.method,
            target = %record.target,
            outcome = record.outcome.as_str(),
            "Buffered exchange record"
        );
        self.records
            .lock()
            .expect("record buffer poisoned")
            .push(record);
    }

    async fn flush(&self, path: &Path) -> Result<(), RecorderError> {
        let records = self.snapshot();
        if records.is_empty() {
            tracing::info!("No records buffered, nothing to flush");
            return Ok(());
        }

        let rendered = format::render(&records, OutputFormat::from_path(path))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, rendered).await?;

        tracing::info!(
            count = records.len(),
            path = %path.display(),
            "Flushed exchange records"
        );
        Ok(())
    }
}
