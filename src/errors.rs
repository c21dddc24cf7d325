//! Error types for the tracker
//!
//! Configuration and I/O failures are surfaced as values; gating rejections
//! and empty-queue scans are ordinary return values, not errors.

use std::fmt;
use std::io;

/// Errors that can occur while configuring or driving the tracker
#[derive(Debug)]
pub enum TrackerError {
    /// A required parameter is missing or malformed
    Config {
        /// Description of the configuration issue
        description: String,
    },

    /// An input or output file could not be used
    Io {
        /// Path of the offending file
        path: String,
        /// Underlying I/O error
        source: io::Error,
    },

    /// A data file line did not match the expected format
    Parse {
        /// Path of the offending file
        path: String,
        /// 1-based line number
        line: usize,
        /// What was expected
        expected: &'static str,
    },
}

impl TrackerError {
    pub(crate) fn config(description: impl Into<String>) -> Self {
        TrackerError::Config {
            description: description.into(),
        }
    }

    pub(crate) fn io(path: impl Into<String>, source: io::Error) -> Self {
        TrackerError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<String>, line: usize, expected: &'static str) -> Self {
        TrackerError::Parse {
            path: path.into(),
            line,
            expected,
        }
    }
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::Config { description } => {
                write!(f, "Configuration error: {}", description)
            }
            TrackerError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path, source)
            }
            TrackerError::Parse {
                path,
                line,
                expected,
            } => {
                write!(f, "Parse error in {} at line {}: expected {}", path, line, expected)
            }
        }
    }
}

impl std::error::Error for TrackerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TrackerError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
