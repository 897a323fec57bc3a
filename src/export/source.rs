//! Record source abstractions for export operations
//!
//! This module provides a unified interface for requesting pages of records
//! from a paginated, rate-limited source, plus two local implementations:
//! - [`MemorySource`] serves records held in memory
//! - [`JsonLinesSource`] loads records from a JSON Lines file

use std::path::Path;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::error::{ConfigError, Result};

use super::record::{RawRecord, RecordId};
use super::retry::{Classify, FailureKind};

/// One page of records, newest first
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<RawRecord>,
    /// Cursor for the following page, `None` at the end of the stream
    pub next_cursor: Option<RecordId>,
}

/// Failure reported by a source for a single request
#[derive(Debug, Clone)]
pub struct SourceError {
    pub kind: FailureKind,
    pub message: String,
}

impl SourceError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl Classify for SourceError {
    fn failure_kind(&self) -> FailureKind {
        self.kind.clone()
    }

    fn message(&self) -> String {
        self.message.clone()
    }
}

/// Trait for paginated record sources
///
/// Implementations return at most `limit` records older than `before`,
/// newest first. An empty page marks the end of the stream.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Request one page
    ///
    /// # Arguments
    /// * `before` - Only return records older than this id (`None` for the newest)
    /// * `limit` - Maximum number of records to return
    ///
    /// # Returns
    /// * `Result<Page, SourceError>` - Page of records or classified failure
    async fn list_page(
        &self,
        before: Option<RecordId>,
        limit: usize,
    ) -> std::result::Result<Page, SourceError>;
}

/// Source serving records held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    /// Sorted newest first
    records: Vec<RawRecord>,
}

impl MemorySource {
    /// Create a source from records in any order
    pub fn new(mut records: Vec<RawRecord>) -> Self {
        records.sort_by(|a, b| b.id.cmp(&a.id));
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn list_page(
        &self,
        before: Option<RecordId>,
        limit: usize,
    ) -> std::result::Result<Page, SourceError> {
        let start = match before {
            Some(cursor) => self.records.partition_point(|r| r.id >= cursor),
            None => 0,
        };
        let end = (start + limit).min(self.records.len());
        let records = self.records[start..end].to_vec();

        let next_cursor = if end < self.records.len() {
            records.last().map(|r| r.id)
        } else {
            None
        };

        debug!(
            "Serving {} records before {:?} (limit {})",
            records.len(),
            before,
            limit
        );

        Ok(Page {
            records,
            next_cursor,
        })
    }
}

/// Source backed by a JSON Lines file of [`RawRecord`]s
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    inner: MemorySource,
}

impl JsonLinesSource {
    /// Load every record from a JSON Lines file
    ///
    /// Blank lines are skipped. A malformed line fails the whole load with
    /// its line number.
    ///
    /// # Arguments
    /// * `path` - File to read
    ///
    /// # Returns
    /// * `Result<Self>` - Loaded source or error
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            ConfigError::InvalidValue {
                field: "input".to_string(),
                value: format!("{}: {}", path.display(), e),
            }
        })?;

        let mut lines = BufReader::new(file).lines();
        let mut records = Vec::new();
        let mut line_number = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            let record: RawRecord = serde_json::from_str(&line).map_err(|e| {
                ConfigError::InvalidFormat(format!(
                    "{} line {}: {}",
                    path.display(),
                    line_number,
                    e
                ))
            })?;
            records.push(record);
        }

        info!("Loaded {} records from {}", records.len(), path.display());

        Ok(Self {
            inner: MemorySource::new(records),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl RecordSource for JsonLinesSource {
    async fn list_page(
        &self,
        before: Option<RecordId>,
        limit: usize,
    ) -> std::result::Result<Page, SourceError> {
        self.inner.list_page(before, limit).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::export::record::{Author, ChannelRef};
    use chrono::{TimeZone, Utc};
    use tokio::io::AsyncWriteExt;

    pub(crate) fn record(id: u64, content: &str) -> RawRecord {
        RawRecord {
            id: RecordId(id),
            author: Author {
                id: 1,
                name: "ana".to_string(),
                is_member: true,
                roles: vec!["Member".to_string()],
            },
            channel: ChannelRef {
                id: 10,
                name: "general".to_string(),
                category: Some("Community".to_string()),
            },
            content: content.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
                + chrono::Duration::minutes(id as i64),
            edited_at: None,
            attachments: Vec::new(),
            reactions: Vec::new(),
            reply_to: None,
            embeds: 0,
            pinned: false,
        }
    }

    #[tokio::test]
    async fn test_memory_source_pages_newest_first() {
        let source = MemorySource::new((1..=5).map(|i| record(i, "x")).collect());

        let first = source.list_page(None, 2).await.unwrap();
        let ids: Vec<u64> = first.records.iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![5, 4]);
        assert_eq!(first.next_cursor, Some(RecordId(4)));

        let second = source.list_page(first.next_cursor, 2).await.unwrap();
        let ids: Vec<u64> = second.records.iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![3, 2]);

        let last = source.list_page(Some(RecordId(2)), 2).await.unwrap();
        assert_eq!(last.records.len(), 1);
        assert_eq!(last.next_cursor, None);

        let past_end = source.list_page(Some(RecordId(1)), 2).await.unwrap();
        assert!(past_end.records.is_empty());
    }

    #[tokio::test]
    async fn test_jsonl_source_loads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");

        let mut file = tokio::fs::File::create(&path).await.unwrap();
        for i in 1..=3 {
            let line = serde_json::to_string(&record(i, "hello")).unwrap();
            file.write_all(line.as_bytes()).await.unwrap();
            file.write_all(b"\n\n").await.unwrap();
        }
        file.flush().await.unwrap();

        let source = JsonLinesSource::open(&path).await.unwrap();
        assert_eq!(source.len(), 3);

        let page = source.list_page(None, 10).await.unwrap();
        assert_eq!(page.records[0].id, RecordId(3));
    }

    #[tokio::test]
    async fn test_jsonl_source_reports_bad_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jsonl");
        tokio::fs::write(&path, "{not json}\n").await.unwrap();

        let err = JsonLinesSource::open(&path).await.unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
