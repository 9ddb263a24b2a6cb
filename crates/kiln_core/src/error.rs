//! # Core Error Types
//!
//! Recoverable errors of the command core. Contract violations (overrunning
//! the shadow copy, reusing a populated job slot) are panics, not errors.

use thiserror::Error;

/// Errors that can occur in the command core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Memory for a circular buffer could not be reserved or mapped.
    #[error("failed to allocate {size} bytes of command buffer memory: {reason}")]
    Allocation {
        /// Requested logical size in bytes.
        size: usize,
        /// What the OS reported.
        reason: String,
    },

    /// Configuration values are inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration text could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration file could not be read.
    #[error("io error: {0}")]
    Io(String),

    /// A worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(String),
}

/// Result type for command core operations.
pub type CoreResult<T> = Result<T, CoreError>;

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}
