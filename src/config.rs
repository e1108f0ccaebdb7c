use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Widest padded rank key; `u64::MAX` has 20 decimal digits
pub const MAX_KEY_WIDTH: usize = 20;

/// Key width of the classic padded encoding (counts up to 99,999)
pub const DEFAULT_KEY_WIDTH: usize = 5;

/// What the record parser does with a line it cannot parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Log the line, count it in the parse metrics and keep going
    #[default]
    Skip,
    /// Fail the whole run
    Abort,
}

/// How counts are turned into stage-two sort keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RankKeyMode {
    /// Sort on the count itself
    #[default]
    Numeric,
    /// Sort on a zero-padded decimal string of fixed width
    Padded { width: usize },
}

/// Tunables for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Parser workers in stage one
    pub map_partitions: usize,
    /// Aggregator partitions in stage one
    pub reduce_partitions: usize,
    /// Lines buffered between the reader and the parser workers
    pub channel_capacity: usize,
    pub malformed_policy: MalformedPolicy,
    /// Pre-sum unit counts inside each map partition before the shuffle
    pub combiner: bool,
    pub rank_key: RankKeyMode,
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            map_partitions: default_parallelism(),
            reduce_partitions: default_parallelism(),
            channel_capacity: 1024,
            malformed_policy: MalformedPolicy::Skip,
            combiner: true,
            rank_key: RankKeyMode::Numeric,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            PipelineError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: PipelineConfig = serde_json::from_str(&contents).map_err(|e| {
            PipelineError::ConfigError(format!("cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.map_partitions == 0 {
            return Err(PipelineError::ConfigError(
                "map_partitions must be at least 1".into(),
            ));
        }
        if self.reduce_partitions == 0 {
            return Err(PipelineError::ConfigError(
                "reduce_partitions must be at least 1".into(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(PipelineError::ConfigError(
                "channel_capacity must be at least 1".into(),
            ));
        }
        if let RankKeyMode::Padded { width } = self.rank_key {
            if width == 0 || width > MAX_KEY_WIDTH {
                return Err(PipelineError::ConfigError(format!(
                    "rank key width must be between 1 and {}, got {}",
                    MAX_KEY_WIDTH, width
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.malformed_policy, MalformedPolicy::Skip);
        assert_eq!(config.rank_key, RankKeyMode::Numeric);
        assert!(config.combiner);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "map_partitions": 2,
            "malformed_policy": "abort",
            "rank_key": { "mode": "padded", "width": 7 }
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.map_partitions, 2);
        assert_eq!(config.malformed_policy, MalformedPolicy::Abort);
        assert_eq!(config.rank_key, RankKeyMode::Padded { width: 7 });
        assert_eq!(config.channel_capacity, 1024);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.reduce_partitions = 0;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::ConfigError(_))
        ));

        let mut config = PipelineConfig::default();
        config.rank_key = RankKeyMode::Padded { width: 21 };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::ConfigError(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let result = PipelineConfig::load("/nonexistent/ratings-config.json");
        assert!(matches!(result, Err(PipelineError::ConfigError(_))));
    }
}
