//! Chain state configuration

use chainstate_core::{ChainStateError, Namespace, StartOverride};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "CHAINSTATE_";

/// Longest commit window accepted by `validate`.
pub const MAX_COMMIT_INTERVAL_MS: u64 = 60 * 60 * 1000;

/// What the pipeline does after an operation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Any operation error stops the pipeline; later submissions fail
    #[default]
    Halt,
    /// Report the error and keep accepting operations
    Continue,
}

/// Configuration for a chain state instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainStateConfig {
    /// Commit window length in milliseconds; `0` commits every operation
    pub commit_interval_ms: u64,

    /// Partial start point written on first initialization
    pub start: Option<StartOverride>,

    /// Namespace holding `start`, `height` and `hash`
    pub state_namespace: String,

    /// Namespace handed to handlers for derived data
    pub data_namespace: String,

    /// Operations that may queue ahead of the pipeline
    pub queue_capacity: usize,

    /// Events buffered per subscriber before it lags
    pub event_capacity: usize,

    /// Behaviour after an operation error
    pub error_policy: ErrorPolicy,
}

impl Default for ChainStateConfig {
    fn default() -> Self {
        Self {
            commit_interval_ms: 1000,
            start: None,
            state_namespace: "chainstate".to_string(),
            data_namespace: "data".to_string(),
            queue_capacity: 64,
            event_capacity: 256,
            error_policy: ErrorPolicy::Halt,
        }
    }
}

impl ChainStateConfig {
    /// Create config for testing (short window)
    pub fn for_testing() -> Self {
        Self {
            commit_interval_ms: 50,
            queue_capacity: 16,
            ..Self::default()
        }
    }

    /// Create config that commits every operation immediately
    pub fn unbatched() -> Self {
        Self {
            commit_interval_ms: 0,
            ..Self::default()
        }
    }

    /// Namespace layout derived from this configuration.
    pub fn layout(&self) -> StorageLayout {
        StorageLayout {
            state: Namespace::new(self.state_namespace.clone()),
            data: Namespace::new(self.data_namespace.clone()),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ChainStateError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ChainStateError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ChainStateError> {
        toml::from_str(content).map_err(|e| ChainStateError::config(format!("Invalid TOML: {e}")))
    }

    /// Merge `CHAINSTATE_*` environment variables
    pub fn merge_with_env(&mut self) -> Result<(), ChainStateError> {
        self.merge_with_vars(std::env::vars())
    }

    /// Merge `CHAINSTATE_*` overrides from an explicit variable list
    pub fn merge_with_vars<I>(&mut self, vars: I) -> Result<(), ChainStateError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "COMMIT_INTERVAL_MS" => {
                    self.commit_interval_ms = value.parse().map_err(|e| {
                        ChainStateError::config(format!("{key}: expected milliseconds: {e}"))
                    })?;
                }
                "ERROR_POLICY" => {
                    self.error_policy = match value.to_ascii_lowercase().as_str() {
                        "halt" => ErrorPolicy::Halt,
                        "continue" => ErrorPolicy::Continue,
                        other => {
                            return Err(ChainStateError::config(format!(
                                "{key}: unknown policy '{other}'"
                            )))
                        }
                    };
                }
                "STATE_NAMESPACE" => self.state_namespace = value,
                "DATA_NAMESPACE" => self.data_namespace = value,
                _ => tracing::debug!(variable = %key, "Ignoring unknown chain state variable"),
            }
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ChainStateError> {
        if self.commit_interval_ms > MAX_COMMIT_INTERVAL_MS {
            return Err(ChainStateError::config(format!(
                "commit_interval_ms must be at most {MAX_COMMIT_INTERVAL_MS} (got {})",
                self.commit_interval_ms
            )));
        }
        if self.state_namespace.is_empty() || self.data_namespace.is_empty() {
            return Err(ChainStateError::config("namespaces must not be empty"));
        }
        if self.state_namespace == self.data_namespace {
            return Err(ChainStateError::config(format!(
                "state and data namespaces must differ (both '{}')",
                self.state_namespace
            )));
        }
        if self.queue_capacity == 0 {
            return Err(ChainStateError::config("queue_capacity must be non-zero"));
        }
        if self.event_capacity == 0 {
            return Err(ChainStateError::config("event_capacity must be non-zero"));
        }
        Ok(())
    }
}

/// Namespaces used by one chain state instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    /// Tip metadata: `start`, `height`, `hash`
    pub state: Namespace,
    /// Derived data written by handlers
    pub data: Namespace,
}

impl Default for StorageLayout {
    fn default() -> Self {
        ChainStateConfig::default().layout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainstate_core::BlockHash;

    #[test]
    fn test_defaults_are_valid() {
        let config = ChainStateConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.commit_interval_ms > 0);
        assert!(ChainStateConfig::for_testing().validate().is_ok());
        assert_eq!(ChainStateConfig::unbatched().commit_interval_ms, 0);
    }

    #[test]
    fn test_toml_with_start_override() {
        let toml = format!(
            r#"
            commit_interval_ms = 250
            error_policy = "continue"

            [start]
            height = 630000
            hash = "{}"
            "#,
            BlockHash::repeat(0xaa)
        );
        let config = ChainStateConfig::from_toml(&toml).unwrap();
        assert_eq!(config.commit_interval_ms, 250);
        assert_eq!(config.error_policy, ErrorPolicy::Continue);
        let start = config.start.unwrap();
        assert_eq!(start.height, Some(630000));
        assert_eq!(start.time, None);
        assert_eq!(start.hash, Some(BlockHash::repeat(0xaa)));
        assert_eq!(config.state_namespace, "chainstate");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ChainStateConfig::default();
        config
            .merge_with_vars(vec![
                ("CHAINSTATE_COMMIT_INTERVAL_MS".to_string(), "0".to_string()),
                ("CHAINSTATE_ERROR_POLICY".to_string(), "Continue".to_string()),
                ("CHAINSTATE_DATA_NAMESPACE".to_string(), "utxo".to_string()),
                ("UNRELATED".to_string(), "x".to_string()),
            ])
            .unwrap();
        assert_eq!(config.commit_interval_ms, 0);
        assert_eq!(config.error_policy, ErrorPolicy::Continue);
        assert_eq!(config.layout().data, Namespace::new("utxo"));

        let err = config
            .merge_with_vars(vec![(
                "CHAINSTATE_COMMIT_INTERVAL_MS".to_string(),
                "soon".to_string(),
            )])
            .unwrap_err();
        assert!(matches!(err, ChainStateError::Config { .. }));
    }

    #[test]
    fn test_validation_rejects_bad_layouts() {
        let config = ChainStateConfig {
            data_namespace: "chainstate".to_string(),
            ..ChainStateConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ChainStateConfig {
            queue_capacity: 0,
            ..ChainStateConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ChainStateConfig {
            commit_interval_ms: MAX_COMMIT_INTERVAL_MS + 1,
            ..ChainStateConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
