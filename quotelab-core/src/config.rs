//! Pipeline configuration, loaded from TOML.
//!
//! Every section and field is defaulted, so an empty file is a valid config.

use crate::data::FallbackConfig;
use crate::trend::TrendOptions;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// IANA zone used for bucket boundaries.
    pub timezone: String,
    /// Lock shards for the concurrent trade aggregator.
    pub shards: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".to_string(),
            shards: 16,
        }
    }
}

impl AggregationConfig {
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Invalid(format!("unknown time zone {:?}", self.timezone)))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub trend: TrendOptions,
    pub fallback: FallbackConfig,
    pub aggregation: AggregationConfig,
}

impl PipelineConfig {
    /// Parse and validate.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.trend;
        if t.atr_length == 0 {
            return Err(invalid("trend.atr_length must be at least 1"));
        }
        if !t.min_multiplier.is_finite() || !t.max_multiplier.is_finite() {
            return Err(invalid("trend multipliers must be finite"));
        }
        if t.min_multiplier > t.max_multiplier {
            return Err(invalid("trend.min_multiplier exceeds trend.max_multiplier"));
        }
        if !(t.step.is_finite() && t.step > 0.0) {
            return Err(invalid("trend.step must be positive"));
        }
        if !(t.perf_alpha.is_finite() && t.perf_alpha > 0.0) {
            return Err(invalid("trend.perf_alpha must be positive"));
        }
        if t.max_iter == 0 {
            return Err(invalid("trend.max_iter must be at least 1"));
        }
        if !(t.target_multiplier.is_finite() && t.target_multiplier >= 0.0) {
            return Err(invalid("trend.target_multiplier must be non-negative"));
        }
        if self.fallback.call_timeout_ms == 0 {
            return Err(invalid("fallback.call_timeout_ms must be positive"));
        }
        if self.aggregation.shards == 0 {
            return Err(invalid("aggregation.shards must be at least 1"));
        }
        self.aggregation.tz()?;
        Ok(())
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}
