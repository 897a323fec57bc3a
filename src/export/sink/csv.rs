//! CSV writer for chunk artifacts
//!
//! Files start with a UTF-8 byte order mark so spreadsheet applications
//! detect the encoding, followed by a header row taken from the first record.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::SinkError;
use crate::export::record::ExportedRecord;

use super::{FormatWriter, create_writer, file_size_of, write_failed};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Writer for CSV format
pub struct CsvWriter {
    /// Buffered file writer
    writer: BufWriter<File>,
    /// Path to the output file
    path: PathBuf,
    /// Column headers, fixed by the first record
    headers: Vec<&'static str>,
    /// Number of records written
    written: usize,
}

impl CsvWriter {
    /// Create a new CSV writer
    ///
    /// # Arguments
    /// * `path` - Output file path
    ///
    /// # Returns
    /// * `Result<Self, SinkError>` - New writer instance or error
    pub async fn new(path: &Path) -> Result<Self, SinkError> {
        let mut writer = create_writer(path).await?;
        writer
            .write_all(UTF8_BOM)
            .await
            .map_err(|e| write_failed("byte order mark", e))?;

        debug!("Created CSV writer for: {}", path.display());

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            headers: Vec::new(),
            written: 0,
        })
    }

    /// Write CSV header row
    async fn write_headers(&mut self) -> Result<(), SinkError> {
        let header_line = self
            .headers
            .iter()
            .map(|h| Self::escape_csv_value(h))
            .collect::<Vec<_>>()
            .join(",");
        self.write_line(&header_line).await?;
        debug!("Wrote CSV headers: {} fields", self.headers.len());
        Ok(())
    }

    /// Write a single record as a CSV row
    async fn write_row(&mut self, record: &ExportedRecord) -> Result<(), SinkError> {
        let values: Vec<String> = self
            .headers
            .iter()
            .map(|column| {
                let value = record.get(column).map(|v| v.as_text()).unwrap_or_default();
                Self::escape_csv_value(&value)
            })
            .collect();

        self.write_line(&values.join(",")).await
    }

    async fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| write_failed("row", e))?;
        self.writer
            .write_all(b"\n")
            .await
            .map_err(|e| write_failed("newline", e))
    }

    /// Escape a CSV value if necessary
    ///
    /// # Arguments
    /// * `value` - Value to escape
    ///
    /// # Returns
    /// * `String` - Escaped value
    fn escape_csv_value(value: &str) -> String {
        if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
            // Wrap in quotes and escape internal quotes by doubling them
            format!("\"{}\"", value.replace('"', "\"\""))
        } else {
            value.to_string()
        }
    }
}

#[async_trait]
impl FormatWriter for CsvWriter {
    async fn write_batch(&mut self, records: &[ExportedRecord]) -> Result<usize, SinkError> {
        let Some(first) = records.first() else {
            return Ok(0);
        };

        if self.headers.is_empty() {
            self.headers = first.columns().collect();
            self.write_headers().await?;
        }

        for record in records {
            self.write_row(record).await?;
        }

        self.written += records.len();
        debug!("Wrote {} records to CSV (total: {})", records.len(), self.written);

        Ok(records.len())
    }

    async fn finalize(&mut self) -> Result<(), SinkError> {
        self.writer
            .flush()
            .await
            .map_err(|e| write_failed("file", e))?;

        debug!(
            "Finalized CSV file: {} ({} records)",
            self.path.display(),
            self.written
        );
        Ok(())
    }

    async fn file_size(&self) -> Result<u64, SinkError> {
        file_size_of(&self.path).await
    }
}
