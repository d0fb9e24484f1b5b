//! Engine configuration model.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ModgraphError, Result};

/// Tunables for the evaluation phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of instances evaluated at the same time.
    pub parallelism: usize,
    /// Per-instance evaluation deadline in seconds. `None` disables it.
    pub instance_timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallelism: crate::constants::DEFAULT_PARALLELISM,
            instance_timeout_secs: None,
        }
    }
}

impl EngineConfig {
    /// Returns the per-instance deadline, if any.
    #[must_use]
    pub fn instance_timeout(&self) -> Option<Duration> {
        self.instance_timeout_secs.map(Duration::from_secs)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if `parallelism` or the timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(ModgraphError::Config {
                message: "parallelism must be at least 1".into(),
            });
        }
        if self.instance_timeout_secs == Some(0) {
            return Err(ModgraphError::Config {
                message: "instance timeout must be at least 1 second".into(),
            });
        }
        Ok(())
    }

    /// Loads and validates a configuration from a JSON file.
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ModgraphError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.parallelism, 10);
        assert!(config.instance_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_parallelism_is_rejected() {
        let config = EngineConfig {
            parallelism: 0,
            ..EngineConfig::default()
        };
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("parallelism"), "got: {msg}");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = EngineConfig {
            instance_timeout_secs: Some(0),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_partial_json_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(br#"{"instance_timeout_secs": 30}"#)
            .expect("write");
        let config = EngineConfig::from_json_file(file.path()).expect("load");
        assert_eq!(config.parallelism, 10);
        assert_eq!(config.instance_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = EngineConfig::from_json_file(Path::new("/nonexistent/modgraph.json"))
            .unwrap_err();
        assert!(matches!(err, ModgraphError::Io { .. }));
    }
}
