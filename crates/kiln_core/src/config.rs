//! # Core Configuration
//!
//! Loaded once at startup, usually from a TOML file:
//!
//! ```toml
//! command_buffer_size = 3145728
//! min_command_buffer_size = 1048576
//! jobs_per_frame = 2
//! worker_thread_name = "kiln::compiler"
//! ```
//!
//! Missing keys fall back to [`CoreConfig::default`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use kiln_shared::{
    DEFAULT_COMMAND_BUFFER_SIZE, DEFAULT_JOBS_PER_FRAME, DEFAULT_MIN_COMMAND_BUFFER_SIZE,
    DEFAULT_WORKER_THREAD_NAME,
};

use crate::error::{CoreError, CoreResult};
use crate::jobs::ThreadWorkerConfig;
use crate::memory::PageSize;
use crate::sync::{CommandBufferQueue, CommandConsumer, CommandProducer};

/// Startup configuration of the command core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Capacity of the circular command buffer in bytes.
    pub command_buffer_size: usize,
    /// Free space the producer waits for after each flush, in bytes.
    pub min_command_buffer_size: usize,
    /// Page size override. Queried from the OS when `None`.
    pub page_size: Option<usize>,
    /// Jobs an amortization worker runs per frame.
    pub jobs_per_frame: usize,
    /// Name of the background worker thread.
    pub worker_thread_name: String,
    /// Stack size of the background worker thread.
    pub worker_stack_size: Option<usize>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: DEFAULT_COMMAND_BUFFER_SIZE,
            min_command_buffer_size: DEFAULT_MIN_COMMAND_BUFFER_SIZE,
            page_size: None,
            jobs_per_frame: DEFAULT_JOBS_PER_FRAME,
            worker_thread_name: DEFAULT_WORKER_THREAD_NAME.to_string(),
            worker_stack_size: None,
        }
    }
}

impl CoreConfig {
    /// Small footprint for tools and tests: 256 KiB ring, 64 KiB per frame.
    #[must_use]
    pub fn low_memory() -> Self {
        Self {
            command_buffer_size: 256 * 1024,
            min_command_buffer_size: 64 * 1024,
            ..Self::default()
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// [`CoreError::ConfigParse`] for malformed TOML, [`CoreError::InvalidConfig`]
    /// for inconsistent values.
    pub fn from_toml_str(text: &str) -> CoreResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// [`CoreError::Io`] if the file cannot be read, otherwise as
    /// [`CoreConfig::from_toml_str`].
    pub fn from_toml_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.as_ref().display(), "core configuration loaded");
        Ok(config)
    }

    /// Checks that the values can be used together.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> CoreResult<()> {
        if self.min_command_buffer_size == 0 {
            return Err(CoreError::InvalidConfig("min_command_buffer_size must be non-zero".to_string()));
        }
        if self.command_buffer_size < self.min_command_buffer_size {
            return Err(CoreError::InvalidConfig(format!(
                "command_buffer_size ({}) smaller than min_command_buffer_size ({})",
                self.command_buffer_size, self.min_command_buffer_size
            )));
        }
        if let Some(page_size) = self.page_size {
            if PageSize::new(page_size).is_none() {
                return Err(CoreError::InvalidConfig(format!(
                    "page_size ({page_size}) must be a power of two"
                )));
            }
        }
        if self.worker_thread_name.is_empty() {
            return Err(CoreError::InvalidConfig("worker_thread_name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Resolves the page size: the override if valid, the OS value otherwise.
    #[must_use]
    pub fn page_size(&self) -> PageSize {
        self.page_size
            .and_then(PageSize::new)
            .unwrap_or_else(PageSize::query)
    }

    /// Builds the command buffer queue described by this configuration.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidConfig`] if validation fails.
    ///
    /// # Panics
    ///
    /// Panics if no memory can be obtained for the ring.
    pub fn command_buffer_queue(&self) -> CoreResult<(CommandProducer, CommandConsumer)> {
        self.validate()?;
        Ok(CommandBufferQueue::create(
            self.min_command_buffer_size,
            self.command_buffer_size,
            self.page_size(),
        ))
    }

    /// Thread settings for a background worker.
    #[must_use]
    pub fn thread_worker_config(&self) -> ThreadWorkerConfig {
        ThreadWorkerConfig {
            name: self.worker_thread_name.clone(),
            stack_size: self.worker_stack_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(CoreConfig::default().validate().is_ok());
        assert!(CoreConfig::low_memory().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = CoreConfig::from_toml_str("jobs_per_frame = 4\n").unwrap();
        assert_eq!(config.jobs_per_frame, 4);
        assert_eq!(config.command_buffer_size, DEFAULT_COMMAND_BUFFER_SIZE);
    }

    #[test]
    fn test_buffer_smaller_than_minimum_rejected() {
        let text = "command_buffer_size = 1024\nmin_command_buffer_size = 4096\n";
        let err = CoreConfig::from_toml_str(text).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }

    #[test]
    fn test_bad_page_size_rejected() {
        let err = CoreConfig::from_toml_str("page_size = 1000\n").unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let err = CoreConfig::from_toml_str("jobs_per_frame = [").unwrap_err();
        assert!(matches!(err, CoreError::ConfigParse(_)));
    }

    #[test]
    fn test_page_size_override() {
        let config = CoreConfig { page_size: Some(16384), ..CoreConfig::default() };
        assert_eq!(config.page_size().get(), 16384);
    }
}
