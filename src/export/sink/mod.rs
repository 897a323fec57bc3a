//! Chunk sinks and format writers
//!
//! A [`ChunkSink`] receives each full chunk in two steps: `write_chunk`
//! produces an artifact and `deliver` hands it downstream. Format writers
//! turn [`ExportedRecord`]s into bytes (CSV, JSON Lines) and are used by the
//! [`DirectorySink`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::BufWriter;
use uuid::Uuid;

use crate::error::SinkError;

use super::record::ExportedRecord;

pub mod csv;
pub mod directory;
pub mod jsonl;

pub use csv::CsvWriter;
pub use directory::DirectorySink;
pub use jsonl::JsonLWriter;

/// Handle to a written chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHandle {
    pub run_id: Uuid,
    pub part: u32,
    pub records: usize,
    pub bytes: u64,
    /// Where the artifact currently lives
    pub path: PathBuf,
    /// File name the artifact is delivered under
    pub file_name: String,
}

/// Destination for flushed chunks
#[async_trait]
pub trait ChunkSink: Send + Sync {
    /// Write one chunk to an artifact
    ///
    /// # Arguments
    /// * `records` - Records of the chunk, in order
    /// * `run_id` - Run the chunk belongs to
    /// * `part` - 1-based part number
    ///
    /// # Returns
    /// * `Result<ArtifactHandle, SinkError>` - Handle to the written artifact
    async fn write_chunk(
        &self,
        records: &[ExportedRecord],
        run_id: Uuid,
        part: u32,
    ) -> Result<ArtifactHandle, SinkError>;

    /// Hand a written artifact downstream
    ///
    /// # Returns
    /// * `Result<ArtifactHandle, SinkError>` - Handle pointing at the delivered artifact
    async fn deliver(&self, artifact: ArtifactHandle) -> Result<ArtifactHandle, SinkError>;
}

/// Trait for writing records to different file formats
#[async_trait]
pub trait FormatWriter: Send {
    /// Write a batch of records
    ///
    /// # Arguments
    /// * `records` - Slice of records to write
    ///
    /// # Returns
    /// * `Result<usize, SinkError>` - Number of records written
    async fn write_batch(&mut self, records: &[ExportedRecord]) -> Result<usize, SinkError>;

    /// Finalize the output (flush buffers, write footers, etc.)
    async fn finalize(&mut self) -> Result<(), SinkError>;

    /// Get the current file size in bytes
    async fn file_size(&self) -> Result<u64, SinkError>;
}

/// Helper function to create a buffered file writer
///
/// # Arguments
/// * `path` - File path to create
///
/// # Returns
/// * `Result<BufWriter<File>, SinkError>` - Buffered writer or error
pub(crate) async fn create_writer(path: &Path) -> Result<BufWriter<File>, SinkError> {
    let file = File::create(path).await.map_err(|e| {
        SinkError::WriteFailed(format!("Failed to create {}: {}", path.display(), e))
    })?;
    Ok(BufWriter::with_capacity(1024 * 1024, file))
}

pub(crate) fn write_failed(what: &str, e: std::io::Error) -> SinkError {
    SinkError::WriteFailed(format!("Failed to write {what}: {e}"))
}

pub(crate) async fn file_size_of(path: &Path) -> Result<u64, SinkError> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| {
        SinkError::WriteFailed(format!("Failed to read metadata of {}: {}", path.display(), e))
    })?;
    Ok(metadata.len())
}
