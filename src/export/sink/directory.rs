//! Directory sink
//!
//! Chunks are written to a staging directory and delivered by renaming them
//! into the output directory, so a half-written file never shows up there.
//! Delivered files are named `{label}_{YYYYMMDD_HHMMSS}_part{n}.{ext}`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Local;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ExportFormat;
use crate::error::SinkError;
use crate::export::record::ExportedRecord;
use crate::utils::fs::sanitize_filename;

use super::{ArtifactHandle, ChunkSink, CsvWriter, FormatWriter, JsonLWriter};

const STAGING_DIR: &str = ".staging";

/// Sink writing one file per chunk into a directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    output_dir: PathBuf,
    staging_dir: PathBuf,
    label: String,
    format: ExportFormat,
}

impl DirectorySink {
    /// Create a new directory sink
    ///
    /// # Arguments
    /// * `output_dir` - Directory receiving delivered files
    /// * `label` - File name prefix, usually the channel name
    /// * `format` - Output file format
    pub fn new(output_dir: impl Into<PathBuf>, label: &str, format: ExportFormat) -> Self {
        let output_dir = output_dir.into();
        Self {
            staging_dir: output_dir.join(STAGING_DIR),
            output_dir,
            label: sanitize_filename(label),
            format,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn file_name(&self, part: u32) -> String {
        format!(
            "{}_{}_part{}.{}",
            self.label,
            Local::now().format("%Y%m%d_%H%M%S"),
            part,
            self.format.extension()
        )
    }

    async fn write_file(&self, path: &Path, records: &[ExportedRecord]) -> Result<u64, SinkError> {
        let mut writer: Box<dyn FormatWriter> = match self.format {
            ExportFormat::Csv => Box::new(CsvWriter::new(path).await?),
            ExportFormat::JsonL => Box::new(JsonLWriter::new(path).await?),
        };

        writer.write_batch(records).await?;
        writer.finalize().await?;
        writer.file_size().await
    }
}

#[async_trait]
impl ChunkSink for DirectorySink {
    async fn write_chunk(
        &self,
        records: &[ExportedRecord],
        run_id: Uuid,
        part: u32,
    ) -> Result<ArtifactHandle, SinkError> {
        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|e| {
                SinkError::WriteFailed(format!(
                    "Failed to create {}: {}",
                    self.staging_dir.display(),
                    e
                ))
            })?;

        let file_name = self.file_name(part);
        let staging_path = self
            .staging_dir
            .join(format!("{}_{}.partial", run_id.simple(), file_name));

        let bytes = match self.write_file(&staging_path, records).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tokio::fs::remove_file(&staging_path).await.ok();
                return Err(e);
            }
        };

        debug!(
            "Staged part {} of run {} ({} records, {} bytes)",
            part,
            run_id,
            records.len(),
            bytes
        );

        Ok(ArtifactHandle {
            run_id,
            part,
            records: records.len(),
            bytes,
            path: staging_path,
            file_name,
        })
    }

    async fn deliver(&self, artifact: ArtifactHandle) -> Result<ArtifactHandle, SinkError> {
        let mut file_name = artifact.file_name.clone();
        let mut target = self.output_dir.join(&file_name);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            file_name = format!("{}_{}", artifact.run_id.simple(), artifact.file_name);
            warn!(
                "{} already exists, delivering as {}",
                target.display(),
                file_name
            );
            target = self.output_dir.join(&file_name);
        }

        if let Err(e) = tokio::fs::rename(&artifact.path, &target).await {
            tokio::fs::remove_file(&artifact.path).await.ok();
            return Err(SinkError::DeliveryFailed(format!(
                "{} -> {}: {}",
                artifact.path.display(),
                target.display(),
                e
            )));
        }

        info!(
            "Export part {} delivered ({} records): {}",
            artifact.part,
            artifact.records,
            target.display()
        );

        Ok(ArtifactHandle {
            path: target,
            file_name,
            ..artifact
        })
    }
}
