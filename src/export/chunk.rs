//! Bounded chunk accumulation
//!
//! [`ChunkWriter`] buffers exported records and flushes them to a
//! [`ChunkSink`] whenever `chunk_size` records have accumulated. Each flush
//! attempt consumes one part number and clears the buffer, whether or not
//! the sink succeeded. Failed chunks are reported, never retried.

use std::sync::Arc;

use tracing::{debug, error};
use uuid::Uuid;

use crate::error::SinkError;

use super::record::ExportedRecord;
use super::sink::{ArtifactHandle, ChunkSink};

/// Result of a single flush attempt
#[derive(Debug)]
pub enum ChunkOutcome {
    Delivered(ArtifactHandle),
    Failed {
        part: u32,
        records: usize,
        error: SinkError,
    },
}

impl ChunkOutcome {
    pub fn part(&self) -> u32 {
        match self {
            ChunkOutcome::Delivered(artifact) => artifact.part,
            ChunkOutcome::Failed { part, .. } => *part,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, ChunkOutcome::Delivered(_))
    }
}

/// Flush statistics of one writer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkStats {
    pub chunks_flushed: u32,
    pub chunks_failed: u32,
    pub records_flushed: u64,
    pub records_dropped: u64,
}

pub struct ChunkWriter {
    chunk_size: usize,
    run_id: Uuid,
    sink: Arc<dyn ChunkSink>,
    current: Vec<ExportedRecord>,
    part_number: u32,
    stats: ChunkStats,
}

impl ChunkWriter {
    /// Create a new chunk writer
    ///
    /// # Arguments
    /// * `chunk_size` - Maximum records per chunk (at least 1)
    /// * `run_id` - Run the chunks belong to
    /// * `sink` - Destination of flushed chunks
    pub fn new(chunk_size: usize, run_id: Uuid, sink: Arc<dyn ChunkSink>) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            run_id,
            sink,
            current: Vec::with_capacity(chunk_size.min(10_000)),
            part_number: 0,
            stats: ChunkStats::default(),
        }
    }

    /// Append a record, flushing if the chunk is full
    ///
    /// # Returns
    /// * `Option<ChunkOutcome>` - Outcome of the flush this record triggered
    pub async fn add(&mut self, record: ExportedRecord) -> Option<ChunkOutcome> {
        self.current.push(record);
        if self.current.len() >= self.chunk_size {
            Some(self.flush().await)
        } else {
            None
        }
    }

    /// Flush the remaining partial chunk, if any
    pub async fn finish(&mut self) -> Option<ChunkOutcome> {
        if self.current.is_empty() {
            None
        } else {
            Some(self.flush().await)
        }
    }

    /// Drop the pending partial chunk without writing it
    ///
    /// # Returns
    /// * `usize` - Number of records discarded
    pub fn discard(&mut self) -> usize {
        let dropped = self.current.len();
        self.current.clear();
        if dropped > 0 {
            debug!("Discarded {} pending records of run {}", dropped, self.run_id);
        }
        dropped
    }

    pub fn pending(&self) -> usize {
        self.current.len()
    }

    pub fn stats(&self) -> ChunkStats {
        self.stats
    }

    async fn flush(&mut self) -> ChunkOutcome {
        self.part_number += 1;
        let part = self.part_number;
        let records = std::mem::take(&mut self.current);
        let count = records.len();

        debug!("Flushing part {} with {} records", part, count);

        let result = match self.sink.write_chunk(&records, self.run_id, part).await {
            Ok(artifact) => self.sink.deliver(artifact).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(artifact) => {
                self.stats.chunks_flushed += 1;
                self.stats.records_flushed += count as u64;
                ChunkOutcome::Delivered(artifact)
            }
            Err(error) => {
                error!("Part {} of run {} failed: {}", part, self.run_id, error);
                self.stats.chunks_failed += 1;
                self.stats.records_dropped += count as u64;
                ChunkOutcome::Failed {
                    part,
                    records: count,
                    error,
                }
            }
        }
    }
}
