//! Engine configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use snapsync_checksum::DiffBudget;
use std::path::Path;
use std::time::Duration;

/// Debounce intervals of the three synchronization queues, plus the limits
/// on diffing one document
///
/// Loaded from TOML; every field is optional.
///
/// ```toml
/// text_delta_delay_ms = 50
/// snapshot_delay_ms = 50
/// active_document_delay_ms = 250
/// max_diff_len = 262144
/// diff_timeout_ms = 50
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Delay before a batch of text edits is diffed and sent
    pub text_delta_delay_ms: u64,
    /// Delay before the current snapshot is advertised
    pub snapshot_delay_ms: u64,
    /// Delay before a focus change is reported
    pub active_document_delay_ms: u64,
    /// Documents longer than this many bytes never produce a text delta
    pub max_diff_len: usize,
    /// Time one document diff may take before the edit counts as a rewrite
    pub diff_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            text_delta_delay_ms: 50,
            snapshot_delay_ms: 50,
            active_document_delay_ms: 250,
            max_diff_len: DiffBudget::default().max_len,
            diff_timeout_ms: millis(DiffBudget::default().timeout),
        }
    }
}

impl SyncConfig {
    /// Default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the text-delta debounce
    #[must_use]
    pub fn with_text_delta_delay(mut self, delay: Duration) -> Self {
        self.text_delta_delay_ms = millis(delay);
        self
    }

    /// Set the snapshot debounce
    #[must_use]
    pub fn with_snapshot_delay(mut self, delay: Duration) -> Self {
        self.snapshot_delay_ms = millis(delay);
        self
    }

    /// Set the active-document debounce
    #[must_use]
    pub fn with_active_document_delay(mut self, delay: Duration) -> Self {
        self.active_document_delay_ms = millis(delay);
        self
    }

    /// Set the diff limits
    #[must_use]
    pub fn with_diff_budget(mut self, budget: DiffBudget) -> Self {
        self.max_diff_len = budget.max_len;
        self.diff_timeout_ms = millis(budget.timeout);
        self
    }

    /// Limits on diffing one document
    #[must_use]
    pub fn diff_budget(&self) -> DiffBudget {
        DiffBudget {
            max_len: self.max_diff_len,
            timeout: Duration::from_millis(self.diff_timeout_ms),
        }
    }

    /// Text-delta debounce
    #[must_use]
    pub fn text_delta_delay(&self) -> Duration {
        Duration::from_millis(self.text_delta_delay_ms)
    }

    /// Snapshot debounce
    #[must_use]
    pub fn snapshot_delay(&self) -> Duration {
        Duration::from_millis(self.snapshot_delay_ms)
    }

    /// Active-document debounce
    #[must_use]
    pub fn active_document_delay(&self) -> Duration {
        Duration::from_millis(self.active_document_delay_ms)
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// [`ConfigError::Parse`] on malformed TOML or wrong field types
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`] otherwise
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SyncConfig::from_toml_str("snapshot_delay_ms = 10").unwrap();
        assert_eq!(config.snapshot_delay(), Duration::from_millis(10));
        assert_eq!(config.active_document_delay_ms, SyncConfig::default().active_document_delay_ms);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let result = SyncConfig::from_toml_str("snapshot_delay_ms = \"soon\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "text_delta_delay_ms = 0").unwrap();
        let config = SyncConfig::load(file.path()).unwrap();
        assert_eq!(config.text_delta_delay(), Duration::ZERO);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = SyncConfig::load(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn diff_budget_round_trips_through_toml() {
        let config = SyncConfig::from_toml_str("max_diff_len = 1024\ndiff_timeout_ms = 5").unwrap();
        assert_eq!(
            config.diff_budget(),
            DiffBudget {
                max_len: 1024,
                timeout: Duration::from_millis(5),
            }
        );
        assert_eq!(SyncConfig::new().with_diff_budget(config.diff_budget()), config);
    }

    #[test]
    fn builders_round_to_millis() {
        let config = SyncConfig::new().with_snapshot_delay(Duration::from_micros(2_500));
        assert_eq!(config.snapshot_delay_ms, 2);
    }
}
