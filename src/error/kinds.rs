use std::{fmt, io, time::Duration};

/// Crate-wide `Result` type using [`ExporterError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Top-level error type for export operations.
///
/// This type wraps more specific error kinds and provides a single
/// error type that can be used throughout the crate.
#[derive(Debug)]
pub enum ExporterError {
    /// Bad configuration, filter or date range. Raised before any fetch.
    Config(ConfigError),

    /// Request rejected before a run was created.
    Admission(AdmissionError),

    /// Terminal fetch failure after retries were exhausted or refused.
    Fetch(FetchError),

    /// Memory reached the critical threshold while a run was processing.
    ResourceExhausted(String),

    /// Sink failure for a single chunk.
    Sink(SinkError),

    /// I/O errors.
    Io(io::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Structured error kind for programmatic handling by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Admission,
    Timeout,
    Permission,
    RateLimitExhausted,
    UnknownFetch,
    ResourceExhausted,
    SinkWrite,
    Io,
    Other,
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },

    /// A date could not be parsed as `YYYY-MM-DD`.
    InvalidDate(String),

    /// Start date is after the end date.
    InvalidDateRange { from: String, to: String },
}

/// Admission-stage rejections.
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionError {
    /// Exports are disabled for maintenance.
    Maintenance,

    /// The actor requested an export too recently.
    Cooldown { remaining: Duration },

    /// Memory usage is at or above the critical threshold.
    MemoryCritical(String),

    /// The process already runs the maximum number of exports.
    TooManyActive { limit: usize },
}

/// Terminal fetch errors produced by the retry policy.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Requests kept timing out.
    Timeout { attempts: u32 },

    /// The source refused access. Never retried.
    Permission(String),

    /// Rate limits kept being hit.
    RateLimitExhausted { attempts: u32 },

    /// Any other failure after retries.
    Unknown { attempts: u32, message: String },
}

/// Sink-specific errors.
#[derive(Debug)]
pub enum SinkError {
    /// Writing the chunk artifact failed.
    WriteFailed(String),

    /// Handing the artifact downstream failed.
    DeliveryFailed(String),
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for ExporterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExporterError::Config(e) => write!(f, "Configuration error: {e}"),
            ExporterError::Admission(e) => write!(f, "{e}"),
            ExporterError::Fetch(e) => write!(f, "{e}"),
            ExporterError::ResourceExhausted(msg) => {
                write!(f, "Export stopped due to memory pressure: {msg}")
            }
            ExporterError::Sink(e) => write!(f, "Sink error: {e}"),
            ExporterError::Io(e) => write!(f, "I/O error: {e}"),
            ExporterError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
            ConfigError::InvalidDate(value) => {
                write!(f, "Invalid date '{value}', expected YYYY-MM-DD")
            }
            ConfigError::InvalidDateRange { from, to } => {
                write!(f, "Start date {from} is after end date {to}")
            }
        }
    }
}

impl fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionError::Maintenance => {
                write!(f, "Exports are temporarily disabled for maintenance")
            }
            AdmissionError::Cooldown { remaining } => write!(
                f,
                "Please wait {} seconds before starting another export",
                remaining.as_secs_f64().ceil() as u64
            ),
            AdmissionError::MemoryCritical(msg) => {
                write!(f, "Export rejected due to memory pressure: {msg}")
            }
            AdmissionError::TooManyActive { limit } => {
                write!(f, "Too many exports in progress (limit {limit})")
            }
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Timeout { attempts } => {
                write!(f, "Operation timed out after {attempts} retries")
            }
            FetchError::Permission(msg) => write!(f, "Permission error: {msg}"),
            FetchError::RateLimitExhausted { attempts } => {
                write!(f, "Too many rate limits hit after {attempts} retries")
            }
            FetchError::Unknown { attempts, message } => {
                write!(f, "Error after {attempts} retries: {message}")
            }
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::WriteFailed(msg) => write!(f, "Failed to write chunk: {msg}"),
            SinkError::DeliveryFailed(msg) => write!(f, "Failed to deliver chunk: {msg}"),
        }
    }
}

impl std::error::Error for ExporterError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for AdmissionError {}
impl std::error::Error for FetchError {}
impl std::error::Error for SinkError {}

impl ExporterError {
    /// Structured kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExporterError::Config(_) => ErrorKind::Configuration,
            ExporterError::Admission(_) => ErrorKind::Admission,
            ExporterError::Fetch(FetchError::Timeout { .. }) => ErrorKind::Timeout,
            ExporterError::Fetch(FetchError::Permission(_)) => ErrorKind::Permission,
            ExporterError::Fetch(FetchError::RateLimitExhausted { .. }) => {
                ErrorKind::RateLimitExhausted
            }
            ExporterError::Fetch(FetchError::Unknown { .. }) => ErrorKind::UnknownFetch,
            ExporterError::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            ExporterError::Sink(_) => ErrorKind::SinkWrite,
            ExporterError::Io(_) => ErrorKind::Io,
            ExporterError::Generic(_) => ErrorKind::Other,
        }
    }
}

/* ========================= Conversions to ExporterError ========================= */

impl From<io::Error> for ExporterError {
    fn from(err: io::Error) -> Self {
        ExporterError::Io(err)
    }
}

impl From<ConfigError> for ExporterError {
    fn from(err: ConfigError) -> Self {
        ExporterError::Config(err)
    }
}

impl From<AdmissionError> for ExporterError {
    fn from(err: AdmissionError) -> Self {
        ExporterError::Admission(err)
    }
}

impl From<FetchError> for ExporterError {
    fn from(err: FetchError) -> Self {
        ExporterError::Fetch(err)
    }
}

impl From<SinkError> for ExporterError {
    fn from(err: SinkError) -> Self {
        ExporterError::Sink(err)
    }
}

impl From<String> for ExporterError {
    fn from(msg: String) -> Self {
        ExporterError::Generic(msg)
    }
}

impl From<&str> for ExporterError {
    fn from(msg: &str) -> Self {
        ExporterError::Generic(msg.to_owned())
    }
}
