//! Pipeline configuration
//!
//! One JSON object, every field optional. Timings are stored in milliseconds
//! so the file stays readable; accessors hand out `Duration`s.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classifier::{ClassifierSettings, LocalClassifier, RuleCategory, RuleSet, RuleSetBuilder, SamplingPolicy};
use crate::types::ScanKinds;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModerationConfig {
    pub backend_url: String,
    /// Bound on one remote call
    pub request_timeout_ms: u64,
    /// Bound on one task in a batch, local fallback included
    pub task_timeout_ms: u64,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub debounce_ms: u64,
    pub sweep_interval_ms: u64,
    pub epoch_interval_ms: u64,
    pub probe_interval_ms: u64,
    pub history_capacity: usize,
    pub min_text_len: usize,
    pub long_text_threshold: usize,
    pub min_image_dimension: u32,
    /// Extra host suffixes whose images are never filtered
    pub allowed_image_hosts: Vec<String>,
    pub scan_kinds: ScanKinds,
    pub sampling: Option<SamplingPolicy>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:5000".to_string(),
            request_timeout_ms: 3_000,
            task_timeout_ms: 5_000,
            batch_size: 10,
            batch_delay_ms: 50,
            debounce_ms: 300,
            sweep_interval_ms: 3_000,
            epoch_interval_ms: 300_000,
            probe_interval_ms: 30_000,
            history_capacity: 100,
            min_text_len: 3,
            long_text_threshold: 1_000,
            min_image_dimension: 50,
            allowed_image_hosts: Vec::new(),
            scan_kinds: ScanKinds::ALL,
            sampling: None,
        }
    }
}

impl ModerationConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json_str(&json)?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "batchSize",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.backend_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "backendUrl",
                reason: "must not be empty".to_string(),
            });
        }
        if let Some(sampling) = &self.sampling {
            if !(0.0..=1.0).contains(&sampling.rate) {
                return Err(ConfigError::Invalid {
                    field: "sampling.rate",
                    reason: format!("{} is outside 0..=1", sampling.rate),
                });
            }
        }
        for (field, value) in [
            ("sweepIntervalMs", self.sweep_interval_ms),
            ("epochIntervalMs", self.epoch_interval_ms),
            ("probeIntervalMs", self.probe_interval_ms),
        ] {
            // tokio intervals panic on a zero period
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn epoch_interval(&self) -> Duration {
        Duration::from_millis(self.epoch_interval_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    pub fn classifier_settings(&self) -> ClassifierSettings {
        ClassifierSettings {
            min_text_len: self.min_text_len,
            long_text_threshold: self.long_text_threshold,
            min_image_dimension: self.min_image_dimension,
        }
    }

    /// Add the configured extra hosts to a rule builder.
    pub fn extend_rules(&self, builder: &mut RuleSetBuilder) {
        for host in &self.allowed_image_hosts {
            builder.add_word(RuleCategory::AllowedHost, host);
        }
    }

    /// Built-in tables plus configured hosts.
    pub fn default_rules(&self) -> RuleSet {
        let mut builder = RuleSetBuilder::with_builtin();
        self.extend_rules(&mut builder);
        match builder.build() {
            Ok(rules) => rules,
            Err(e) => {
                log::error!("failed to compile rule tables: {}", e);
                RuleSet::builtin()
            }
        }
    }

    pub fn local_classifier(&self, rules: RuleSet) -> LocalClassifier {
        LocalClassifier::new(rules, self.classifier_settings()).with_sampling(self.sampling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ModerationConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.debounce(), Duration::from_millis(300));
        assert_eq!(config.epoch_interval(), Duration::from_secs(300));
        assert!(config.sampling.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = ModerationConfig::from_json_str(r#"{"batchSize": 4, "backendUrl": "http://backend:8080"}"#).unwrap();
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.backend_url, "http://backend:8080");
        assert_eq!(config.sweep_interval_ms, 3_000);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            ModerationConfig::from_json_str(r#"{"batchSize": 0}"#),
            Err(ConfigError::Invalid { field: "batchSize", .. })
        ));
        assert!(matches!(
            ModerationConfig::from_json_str(r#"{"sampling": {"rate": 1.5}}"#),
            Err(ConfigError::Invalid { field: "sampling.rate", .. })
        ));
        assert!(matches!(ModerationConfig::from_json_str("not json"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"allowedImageHosts": ["cdn.example.net"], "minImageDimension": 64}}"#).unwrap();

        let config = ModerationConfig::load(file.path()).unwrap();
        assert_eq!(config.min_image_dimension, 64);

        let classifier = config.local_classifier(config.default_rules());
        assert!(classifier.is_exempt_image("https://img.cdn.example.net/nude.jpg", None));
        assert!(!classifier.is_exempt_image("https://other.example.net/a.jpg", Some((64, 64))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ModerationConfig::load("/definitely/not/here.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}
