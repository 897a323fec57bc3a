//! Error handling for export operations.
//!
//! Errors are grouped by the stage that raises them:
//! - `ConfigError`: invalid settings, filters or date ranges, rejected before any fetch
//! - `AdmissionError`: maintenance, cooldown, memory or concurrency rejections
//! - `FetchError`: terminal source failures after the retry policy gave up
//! - `SinkError`: per-chunk write or delivery failures, logged and skipped
//!
//! Every variant renders a single human-readable message through `Display`,
//! and [`ExporterError::kind`] exposes a structured [`ErrorKind`].
//!
//! # Example
//!
//! ```rust
//! use message_export::error::{ErrorKind, ExporterError, FetchError};
//!
//! let err: ExporterError = FetchError::Timeout { attempts: 5 }.into();
//! assert_eq!(err.kind(), ErrorKind::Timeout);
//! assert_eq!(err.to_string(), "Operation timed out after 5 retries");
//! ```

pub mod kinds;

// Re-export commonly used types
pub use kinds::{
    AdmissionError, ConfigError, ErrorKind, ExporterError, FetchError, Result, SinkError,
};
