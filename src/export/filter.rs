//! Record filtering and projection
//!
//! Filters are evaluated in a fixed order and short-circuit:
//! 1. Membership and role
//! 2. Channel category
//! 3. Case-insensitive content search
//! 4. Inclusive date range
//!
//! Matching records are projected into [`ExportedRecord`]s whose columns are
//! fixed for the whole run by [`DataOptions`].

use chrono::NaiveDate;
use tracing::debug;

use crate::error::{ConfigError, Result};

use super::record::{ExportedRecord, FieldValue, RawRecord};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

const BASE_COLUMNS: [&str; 5] = ["Message ID", "Author", "Content", "Channel", "Timestamp"];

/// Optional columns, in output order, keyed by their option number
const OPTIONAL_COLUMNS: [(u8, &str); 6] = [
    (1, "Attachments"),
    (2, "Reactions"),
    (3, "Reply To"),
    (4, "Edited"),
    (5, "Embeds"),
    (6, "Pinned"),
];

/// Set of optional columns to include
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataOptions(u8);

impl DataOptions {
    /// Parse a comma-separated list such as `"1,2,4"`
    ///
    /// Unknown or non-numeric flags are ignored.
    pub fn parse(spec: &str) -> Self {
        let mut options = Self::default();
        for token in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.parse::<u8>() {
                Ok(flag @ 1..=6) => options = options.with(flag),
                _ => debug!("Ignoring unknown data option '{}'", token),
            }
        }
        options
    }

    pub fn with(self, flag: u8) -> Self {
        if (1..=6).contains(&flag) {
            Self(self.0 | (1 << flag))
        } else {
            self
        }
    }

    pub fn contains(&self, flag: u8) -> bool {
        (1..=6).contains(&flag) && self.0 & (1 << flag) != 0
    }
}

/// Inclusive range of calendar dates, either end optional
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    /// Parse optional `YYYY-MM-DD` bounds
    ///
    /// # Returns
    /// * `Result<DateRange>` - Range, or `ConfigError` for malformed dates or `from > to`
    pub fn parse(from: Option<&str>, to: Option<&str>) -> Result<Self> {
        let from = from.map(parse_date).transpose()?;
        let to = to.map(parse_date).transpose()?;

        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(ConfigError::InvalidDateRange {
                    from: f.to_string(),
                    to: t.to_string(),
                }
                .into());
            }
        }

        Ok(Self { from, to })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|f| date >= f) && self.to.is_none_or(|t| date <= t)
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| ConfigError::InvalidDate(value.to_string()).into())
}

/// Filter criteria of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    /// Role the author must hold (case-sensitive)
    pub role: Option<String>,
    /// Channel category the record must belong to
    pub category: Option<String>,
    /// Substring the content must contain, any case
    pub search: Option<String>,
    pub date_range: DateRange,
    pub data_options: DataOptions,
}

/// Stateless filter and projection for one run
#[derive(Debug, Clone)]
pub struct FilterPipeline {
    spec: FilterSpec,
    search_lower: Option<String>,
}

impl FilterPipeline {
    pub fn new(spec: FilterSpec) -> Self {
        let search_lower = spec
            .search
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);
        Self { spec, search_lower }
    }

    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    /// Column names every projected record of this run carries
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = BASE_COLUMNS.to_vec();
        columns.extend(
            OPTIONAL_COLUMNS
                .iter()
                .filter(|(flag, _)| self.spec.data_options.contains(*flag))
                .map(|(_, name)| *name),
        );
        columns
    }

    /// Filter and project a record
    ///
    /// # Returns
    /// * `Option<ExportedRecord>` - Projection if every filter passed
    pub fn apply(&self, record: &RawRecord) -> Option<ExportedRecord> {
        if self.matches(record) {
            Some(self.project(record))
        } else {
            None
        }
    }

    /// Evaluate the filters without projecting
    pub fn matches(&self, record: &RawRecord) -> bool {
        self.matches_author(record)
            && self.matches_category(record)
            && self.matches_search(record)
            && self.spec.date_range.contains(record.created_at.date_naive())
    }

    /// Membership and role check, also used by the total estimate
    pub fn matches_author(&self, record: &RawRecord) -> bool {
        if !record.author.is_member {
            return false;
        }
        match self.spec.role.as_deref() {
            Some(role) => record.author.roles.iter().any(|r| r == role),
            None => true,
        }
    }

    fn matches_category(&self, record: &RawRecord) -> bool {
        match self.spec.category.as_deref() {
            Some(category) => record.channel.category.as_deref() == Some(category),
            None => true,
        }
    }

    fn matches_search(&self, record: &RawRecord) -> bool {
        match self.search_lower.as_deref() {
            Some(needle) => record.content.to_lowercase().contains(needle),
            None => true,
        }
    }

    fn project(&self, record: &RawRecord) -> ExportedRecord {
        let options = self.spec.data_options;
        let mut out = ExportedRecord::new();

        out.push("Message ID", FieldValue::Text(record.id.to_string()));
        out.push("Author", FieldValue::Text(record.author.name.clone()));
        out.push("Content", FieldValue::Text(record.content.clone()));
        out.push("Channel", FieldValue::Text(record.channel.name.clone()));
        out.push(
            "Timestamp",
            FieldValue::Text(record.created_at.format(TIMESTAMP_FORMAT).to_string()),
        );

        if options.contains(1) {
            let urls: Vec<&str> = record.attachments.iter().map(|a| a.url.as_str()).collect();
            out.push("Attachments", FieldValue::Text(urls.join(", ")));
        }
        if options.contains(2) {
            let reactions: Vec<String> = record
                .reactions
                .iter()
                .map(|r| format!("{}:{}", r.emoji, r.count))
                .collect();
            out.push("Reactions", FieldValue::Text(reactions.join(", ")));
        }
        if options.contains(3) {
            let reply = record.reply_to.map(|id| id.to_string()).unwrap_or_default();
            out.push("Reply To", FieldValue::Text(reply));
        }
        if options.contains(4) {
            let edited = record
                .edited_at
                .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
                .unwrap_or_default();
            out.push("Edited", FieldValue::Text(edited));
        }
        if options.contains(5) {
            out.push("Embeds", FieldValue::Integer(u64::from(record.embeds)));
        }
        if options.contains(6) {
            out.push("Pinned", FieldValue::Bool(record.pinned));
        }

        out
    }
}
