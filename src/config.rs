//! Configuration for the policy decision point.
//!
//! Follows the nested, `#[serde(default)]`-per-struct convention used
//! throughout the host application's configuration layer: a root struct
//! composed of independently-defaulted sub-configs, so a deployment can
//! override just the fields it cares about in a partial TOML/JSON/env blob.

use std::time::Duration;
use thiserror::Error;

/// Root configuration for a [`crate::pdp::PolicyDecisionPoint`].
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct PdpConfig {
    pub evaluation: EvaluationConfig,
    pub condition_limits: ConditionLimitsConfig,
    pub cache: CacheConfig,
    pub audit: AuditConfig,
}

impl Default for PdpConfig {
    fn default() -> Self {
        PdpConfig {
            evaluation: EvaluationConfig::default(),
            condition_limits: ConditionLimitsConfig::default(),
            cache: CacheConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl PdpConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.condition_limits.max_depth == 0 {
            return Err(ConfigError::InvalidValue(
                "condition_limits.max_depth must be greater than zero".to_string(),
            ));
        }
        if self.condition_limits.max_keys == 0 {
            return Err(ConfigError::InvalidValue(
                "condition_limits.max_keys must be greater than zero".to_string(),
            ));
        }
        if self.evaluation.deadline.is_zero() {
            return Err(ConfigError::InvalidValue(
                "evaluation.deadline must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Controls the per-call evaluation deadline and the optional pre-filter pass.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct EvaluationConfig {
    #[serde(with = "humantime_serde")]
    pub deadline: Duration,
    pub prefilter_enabled: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        EvaluationConfig {
            deadline: Duration::from_secs(5),
            prefilter_enabled: true,
        }
    }
}

/// Bounds on condition-tree complexity (§4.5/§9: depth and key-count limits).
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ConditionLimitsConfig {
    pub max_depth: usize,
    pub max_keys: usize,
}

impl Default for ConditionLimitsConfig {
    fn default() -> Self {
        ConditionLimitsConfig {
            max_depth: 10,
            max_keys: 100,
        }
    }
}

/// Controls the compiled-pattern cache. `None` means unbounded, matching the
/// specification's "no eviction required for correctness" guidance.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub regex_cache_limit: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            regex_cache_limit: None,
        }
    }
}

/// Controls the best-effort audit sink queue.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub queue_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        AuditConfig {
            enabled: true,
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PdpConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.evaluation.deadline, Duration::from_secs(5));
        assert_eq!(config.condition_limits.max_depth, 10);
        assert_eq!(config.condition_limits.max_keys, 100);
        assert!(config.cache.regex_cache_limit.is_none());
        assert!(config.audit.enabled);
    }

    #[test]
    fn test_rejects_zero_depth() {
        let mut config = PdpConfig::default();
        config.condition_limits.max_depth = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_rejects_zero_keys() {
        let mut config = PdpConfig::default();
        config.condition_limits.max_keys = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_deadline() {
        let mut config = PdpConfig::default();
        config.evaluation.deadline = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_json() {
        let json = r#"{ "evaluation": { "deadline": "10s" } }"#;
        let config: PdpConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.evaluation.deadline, Duration::from_secs(10));
        // untouched fields keep their defaults
        assert_eq!(config.condition_limits.max_depth, 10);
    }
}
