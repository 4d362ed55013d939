//! Effective configuration with provenance
//!
//! Records the merged settings together with every layer that
//! contributed to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use super::defaults::DeleteConfig;
use super::merge::merge_layers;

/// Schema version for the effective config document.
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier.
pub const SCHEMA_ID: &str = "batchdel/effective_config@1";

/// Host configuration file read when no path is given.
pub const DEFAULT_HOST_CONFIG: &str = "/etc/batchdel/batchdel.toml";

/// Origin of a configuration layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    Host,
    Scenario,
    Cli,
}

/// A contributing layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin, scenario and cli layers)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Effective configuration with full provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub schema_version: u32,
    pub schema_id: String,
    pub created_at: DateTime<Utc>,

    /// Typed settings after merge and validation.
    pub settings: DeleteConfig,

    /// Contributing layers in precedence order.
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Build the effective config from its layers.
    ///
    /// A host path that does not exist is skipped.
    pub fn build(
        host_config_path: Option<&Path>,
        scenario_overlay: Option<Value>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![DeleteConfig::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = host_config_path {
            if path.exists() {
                let (value, digest) = load_toml_file(path)?;
                layers.push(value);
                sources.push(ConfigSource {
                    origin: ConfigOrigin::Host,
                    path: Some(path.to_string_lossy().to_string()),
                    digest: Some(digest),
                });
            }
        }

        for (origin, overlay) in [
            (ConfigOrigin::Scenario, scenario_overlay),
            (ConfigOrigin::Cli, cli_overrides),
        ] {
            if let Some(value) = overlay {
                layers.push(value);
                sources.push(ConfigSource {
                    origin,
                    path: None,
                    digest: None,
                });
            }
        }

        let merged = merge_layers(layers);
        let settings: DeleteConfig = serde_json::from_value(merged)
            .map_err(|e| ConfigError::ParseError(format!("invalid settings: {}", e)))?;
        settings.validate()?;

        Ok(Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            settings,
            sources,
        })
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Load a TOML file, returning its JSON form and SHA-256 digest.
fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
    let digest = hex::encode(Sha256::digest(&bytes));

    let contents = String::from_utf8(bytes)
        .map_err(|e| ConfigError::ParseError(format!("invalid UTF-8: {}", e)))?;
    let table: toml::Table = toml::from_str(&contents)
        .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

    let value = serde_json::to_value(table)
        .map_err(|e| ConfigError::ParseError(format!("unsupported TOML value: {}", e)))?;
    Ok((value, digest))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_build_with_defaults_only() {
        let config = EffectiveConfig::build(None, None, None).unwrap();
        assert_eq!(config.schema_version, SCHEMA_VERSION);
        assert_eq!(config.settings, DeleteConfig::default());
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].origin, ConfigOrigin::Builtin);
    }

    #[test]
    fn test_host_file_layer_and_digest() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "server_name = \"head\"\n[timers]\nresv_recheck_seconds = 10").unwrap();

        let config = EffectiveConfig::build(Some(file.path()), None, None).unwrap();
        assert_eq!(config.settings.server_name, "head");
        assert_eq!(config.settings.timers.resv_recheck_seconds, 10);
        assert_eq!(config.settings.timers.prerun_retry_seconds, 1);

        let host = &config.sources[1];
        assert_eq!(host.origin, ConfigOrigin::Host);
        assert_eq!(host.digest.as_ref().map(|d| d.len()), Some(64));
    }

    #[test]
    fn test_missing_host_file_is_skipped() {
        let config =
            EffectiveConfig::build(Some(Path::new("/nonexistent/batchdel.toml")), None, None)
                .unwrap();
        assert_eq!(config.sources.len(), 1);
    }

    #[test]
    fn test_cli_beats_scenario() {
        let scenario = serde_json::json!({"server_name": "from-scenario", "keep_history": false});
        let cli = serde_json::json!({"server_name": "from-cli"});

        let config = EffectiveConfig::build(None, Some(scenario), Some(cli)).unwrap();
        assert_eq!(config.settings.server_name, "from-cli");
        assert!(!config.settings.keep_history);
        let origins: Vec<ConfigOrigin> = config.sources.iter().map(|s| s.origin).collect();
        assert_eq!(
            origins,
            vec![ConfigOrigin::Builtin, ConfigOrigin::Scenario, ConfigOrigin::Cli]
        );
    }

    #[test]
    fn test_validation_error_surfaces() {
        let cli = serde_json::json!({"timers": {"prerun_retry_seconds": 0}});
        let err = EffectiveConfig::build(None, None, Some(cli)).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "server_name = ").unwrap();
        let err = EffectiveConfig::build(Some(file.path()), None, None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let cli = serde_json::json!({"keep_history": "yes"});
        let err = EffectiveConfig::build(None, None, Some(cli)).unwrap_err();
        assert!(err.to_string().contains("invalid settings"));
    }
}
