//! Configuration for the Conviva exporter.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::catalog::ApiVersion;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Conviva API settings.
    #[serde(default)]
    pub conviva: ConvivaConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Conviva API connection settings.
///
/// Identifiers are opaque: they are sent to the API as configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvivaConfig {
    /// API base URL, e.g. `https://api.conviva.com`.
    #[serde(default)]
    pub base_url: String,

    /// API version used in the request path (default: "3.0").
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Basic auth client id.
    #[serde(default)]
    pub client_id: String,

    /// Basic auth client secret.
    #[serde(default)]
    pub client_secret: String,

    /// Filters to report on.
    #[serde(default)]
    pub filter_ids: Vec<String>,

    /// Dimension to group by (name for v3, id for v2).
    #[serde(default)]
    pub dimension: String,

    /// Skip TLS certificate validation of the API (default: true).
    #[serde(default = "default_insecure_skip_verify")]
    pub insecure_skip_verify: bool,
}

fn default_api_version() -> String {
    "3.0".to_string()
}

fn default_insecure_skip_verify() -> bool {
    true
}

impl Default for ConvivaConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_version: default_api_version(),
            client_id: String::new(),
            client_secret: String::new(),
            filter_ids: Vec::new(),
            dimension: String::new(),
            insecure_skip_verify: default_insecure_skip_verify(),
        }
    }
}

impl ConvivaConfig {
    /// The API generation selected by `api_version`.
    pub fn version(&self) -> Result<ApiVersion, ConfigError> {
        self.api_version.parse().map_err(ConfigError::Validation)
    }
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,

    /// Metric name prefix (default: "conviva_experience_insights").
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

fn default_prefix() -> String {
    "conviva_experience_insights".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            prefix: default_prefix(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl ExporterConfig {
    /// Read a JSON5 configuration file without validating it.
    ///
    /// Command-line and environment overrides are usually applied before
    /// [`validate`](Self::validate) is called.
    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(json5::from_str(&content)?)
    }

    /// Load and validate configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.conviva.base_url.is_empty() {
            return Err(ConfigError::Validation(
                "conviva.base_url must be set".to_string(),
            ));
        }

        if reqwest::Url::parse(&self.conviva.base_url).is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid base URL: {}",
                self.conviva.base_url
            )));
        }

        self.conviva.version()?;

        if self.conviva.filter_ids.is_empty() {
            return Err(ConfigError::Validation(
                "At least one filter id is required".to_string(),
            ));
        }

        // Validate listen address format
        if self
            .prometheus
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            )));
        }

        // Validate path starts with /
        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if matches!(self.prometheus.path.as_str(), "/" | "/health") {
            return Err(ConfigError::Validation(format!(
                "Metrics path {} is reserved",
                self.prometheus.path
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"{
        conviva: {
            base_url: "https://api.conviva.com",
            filter_ids: ["12345"],
            dimension: "browser_name"
        }
    }"#;

    #[test]
    fn test_parse_minimal_config() {
        let config = ExporterConfig::parse(MINIMAL).unwrap();

        assert_eq!(config.conviva.api_version, "3.0");
        assert!(config.conviva.insecure_skip_verify);
        assert_eq!(config.conviva.version().unwrap(), ApiVersion::V3);
        assert_eq!(config.prometheus.listen, "0.0.0.0:8080");
        assert_eq!(config.prometheus.path, "/metrics");
        assert_eq!(config.prometheus.prefix, "conviva_experience_insights");
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            conviva: {
                base_url: "https://api.conviva.com",
                api_version: "2.4",
                client_id: "id",
                client_secret: "secret",
                filter_ids: ["7", "9"],
                dimension: "42",
                insecure_skip_verify: false,
            },
            prometheus: {
                listen: "127.0.0.1:9091",
                path: "/prometheus/metrics",
                prefix: "video"
            },
            logging: {
                level: "debug",
                format: "json"
            }
        }"#;

        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.conviva.version().unwrap(), ApiVersion::V2);
        assert_eq!(config.conviva.client_id, "id");
        assert_eq!(config.conviva.filter_ids, vec!["7", "9"]);
        assert!(!config.conviva.insecure_skip_verify);
        assert_eq!(config.prometheus.listen, "127.0.0.1:9091");
        assert_eq!(config.prometheus.path, "/prometheus/metrics");
        assert_eq!(config.prometheus.prefix, "video");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_validate_missing_base_url() {
        let result = ExporterConfig::parse("{ conviva: { filter_ids: [\"1\"] } }");
        assert!(result.unwrap_err().to_string().contains("base_url"));
    }

    #[test]
    fn test_validate_unsupported_api_version() {
        let json = r#"{
            conviva: { base_url: "https://api.conviva.com", api_version: "1.0", filter_ids: ["1"] }
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Unsupported API version")
        );
    }

    #[test]
    fn test_validate_no_filters() {
        let json = r#"{ conviva: { base_url: "https://api.conviva.com" } }"#;
        assert!(ExporterConfig::parse(json).is_err());
    }

    #[test]
    fn test_validate_invalid_listen() {
        let mut config = ExporterConfig::parse(MINIMAL).unwrap();
        config.prometheus.listen = "not-an-address".to_string();

        let result = config.validate();
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid listen address")
        );
    }

    #[test]
    fn test_validate_invalid_path() {
        let mut config = ExporterConfig::parse(MINIMAL).unwrap();
        config.prometheus.path = "no-leading-slash".to_string();

        let result = config.validate();
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must start with /")
        );
    }

    #[test]
    fn test_identifiers_are_not_validated() {
        let json = r#"{
            conviva: {
                base_url: "https://api.conviva.com",
                filter_ids: ["not a number!"],
                dimension: "??"
            }
        }"#;
        assert!(ExporterConfig::parse(json).is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = ExporterConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.conviva.dimension, "browser_name");
    }

    #[test]
    fn test_read_file_skips_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ prometheus: { path: \"/m\" } }").unwrap();

        let config = ExporterConfig::read_file(file.path()).unwrap();
        assert_eq!(config.prometheus.path, "/m");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let result = ExporterConfig::load_from_file("/nonexistent/config.json5");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
