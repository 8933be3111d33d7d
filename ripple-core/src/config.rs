//! Engine Configuration
//!
//! Tunables for a [`Runtime`](crate::reactive::Runtime). Every field has a
//! default, so a partial JSON document (or none at all) is a valid config.

use serde::{Deserialize, Serialize};

use crate::error::{ReactiveError, Result};

/// Default upper bound on jobs executed by a single `drain()`.
pub const DEFAULT_MAX_DRAIN_JOBS: usize = 10_000;

/// Default number of tracked objects before dead entries are pruned.
pub const DEFAULT_PRUNE_THRESHOLD: usize = 64;

/// Configuration for a reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of queued jobs and deferred tasks one `drain()` may run
    /// before it gives up and clears the queue.
    pub max_drain_jobs: usize,

    /// Number of tracked objects in the dependency store at which entries of
    /// dropped objects are swept. The threshold doubles with the live set.
    pub prune_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_drain_jobs: DEFAULT_MAX_DRAIN_JOBS,
            prune_threshold: DEFAULT_PRUNE_THRESHOLD,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_drain_jobs == 0 {
            return Err(ReactiveError::InvalidConfig(
                "max_drain_jobs must be at least 1".into(),
            ));
        }
        if self.prune_threshold == 0 {
            return Err(ReactiveError::InvalidConfig(
                "prune_threshold must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_document_overrides_one_field() {
        let config = EngineConfig::from_json(r#"{ "max_drain_jobs": 5 }"#).unwrap();
        assert_eq!(config.max_drain_jobs, 5);
        assert_eq!(config.prune_threshold, DEFAULT_PRUNE_THRESHOLD);
    }

    #[test]
    fn zero_limits_are_rejected() {
        let err = EngineConfig::from_json(r#"{ "max_drain_jobs": 0 }"#).unwrap_err();
        assert!(matches!(err, ReactiveError::InvalidConfig(_)));

        let err = EngineConfig::from_json(r#"{ "prune_threshold": 0 }"#).unwrap_err();
        assert!(matches!(err, ReactiveError::InvalidConfig(_)));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = EngineConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, ReactiveError::Config(_)));
    }
}
