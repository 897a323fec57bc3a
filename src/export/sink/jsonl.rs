//! JSON Lines writer for chunk artifacts
//!
//! Each record becomes one JSON object per line, keys in column order.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::SinkError;
use crate::export::record::ExportedRecord;

use super::{FormatWriter, create_writer, file_size_of, write_failed};

/// Writer for JSON Lines format
pub struct JsonLWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    written: usize,
}

impl JsonLWriter {
    /// Create a new JSON Lines writer
    ///
    /// # Arguments
    /// * `path` - Output file path
    ///
    /// # Returns
    /// * `Result<Self, SinkError>` - New writer instance or error
    pub async fn new(path: &Path) -> Result<Self, SinkError> {
        let writer = create_writer(path).await?;

        debug!("Created JSON Lines writer for: {}", path.display());

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            written: 0,
        })
    }
}

#[async_trait]
impl FormatWriter for JsonLWriter {
    async fn write_batch(&mut self, records: &[ExportedRecord]) -> Result<usize, SinkError> {
        for record in records {
            let mut line = serde_json::to_vec(record)
                .map_err(|e| SinkError::WriteFailed(format!("Failed to encode record: {e}")))?;
            line.push(b'\n');

            self.writer
                .write_all(&line)
                .await
                .map_err(|e| write_failed("record", e))?;
        }

        self.written += records.len();
        debug!(
            "Wrote {} records to JSON Lines (total: {})",
            records.len(),
            self.written
        );

        Ok(records.len())
    }

    async fn finalize(&mut self) -> Result<(), SinkError> {
        self.writer
            .flush()
            .await
            .map_err(|e| write_failed("file", e))?;

        debug!(
            "Finalized JSON Lines file: {} ({} records)",
            self.path.display(),
            self.written
        );
        Ok(())
    }

    async fn file_size(&self) -> Result<u64, SinkError> {
        file_size_of(&self.path).await
    }
}
