use core::fmt;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors that abort a job invocation (or a single day of one).
///
/// Conditions that are expected during normal operation are not represented here: an empty
/// source range degrades to an empty report, and malformed alarm payloads are skipped where
/// they are decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum EtlError {
    /// Invalid or missing runtime configuration
    Config(String),
    /// The production store could not be reached or queried
    SourceUnavailable(String),
    /// A write to the aggregation store failed and was rolled back
    Load(String),
    /// Bad CLI input (dates, job names)
    InvalidArgument(String),
}

impl Display for EtlError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            EtlError::Config(s) => write!(f, "config error: {}", s),
            EtlError::SourceUnavailable(s) => write!(f, "source unavailable: {}", s),
            EtlError::Load(s) => write!(f, "load failed: {}", s),
            EtlError::InvalidArgument(s) => write!(f, "invalid argument: {}", s),
        }
    }
}

impl Error for EtlError {}

impl From<EtlError> for String {
    fn from(value: EtlError) -> Self {
        value.to_string()
    }
}
