//! manifold.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATA_DIR: &str = "/var/lib/manifold";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifoldConfig {
    pub server: Option<ServerConfig>,
    pub log: Option<LogConfig>,
    pub audit: Option<AuditConfig>,
    pub backoff: Option<BackoffConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    pub format: Option<LogFormat>,
    /// `EnvFilter` directives, e.g. `"info,manifold_repository=debug"`.
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditConfig {
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub initial_ms: Option<u64>,
    pub max_ms: Option<u64>,
}

impl ManifoldConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ManifoldConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Read `path` if given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_PORT)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.server
            .as_ref()
            .and_then(|s| s.data_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    pub fn log_format(&self) -> LogFormat {
        self.log.as_ref().and_then(|l| l.format).unwrap_or_default()
    }

    pub fn log_filter(&self) -> Option<&str> {
        self.log.as_ref().and_then(|l| l.filter.as_deref())
    }

    pub fn audit_interval(&self) -> Duration {
        let secs = self
            .audit
            .as_ref()
            .and_then(|a| a.interval_secs)
            .unwrap_or(30);
        Duration::from_secs(secs.max(1))
    }

    /// `(initial, max)` retry delays for background tasks.
    pub fn backoff(&self) -> (Duration, Duration) {
        let initial = self.backoff.as_ref().and_then(|b| b.initial_ms).unwrap_or(500);
        let max = self.backoff.as_ref().and_then(|b| b.max_ms).unwrap_or(60_000);
        (
            Duration::from_millis(initial),
            Duration::from_millis(max.max(initial)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ManifoldConfig::default();
        assert_eq!(config.port(), 8080);
        assert_eq!(config.data_dir(), PathBuf::from("/var/lib/manifold"));
        assert_eq!(config.log_format(), LogFormat::Text);
        assert_eq!(config.audit_interval(), Duration::from_secs(30));
        assert_eq!(
            config.backoff(),
            (Duration::from_millis(500), Duration::from_secs(60))
        );
    }

    #[test]
    fn test_parse_full() {
        let toml_str = r#"
[server]
port = 9090
data_dir = "/tmp/manifold"

[log]
format = "json"
filter = "debug"

[audit]
interval_secs = 5

[backoff]
initial_ms = 100
max_ms = 2000
"#;
        let config: ManifoldConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.port(), 9090);
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/manifold"));
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.log_filter(), Some("debug"));
        assert_eq!(config.audit_interval(), Duration::from_secs(5));
        assert_eq!(
            config.backoff(),
            (Duration::from_millis(100), Duration::from_secs(2))
        );
    }

    #[test]
    fn test_parse_partial() {
        let config: ManifoldConfig = toml::from_str("[server]\nport = 1234\n").unwrap();
        assert_eq!(config.port(), 1234);
        assert_eq!(config.data_dir(), PathBuf::from(DEFAULT_DATA_DIR));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifold.toml");
        std::fs::write(&path, "[audit]\ninterval_secs = 0\n").unwrap();
        let config = ManifoldConfig::load(Some(&path)).unwrap();
        // Zero would spin.
        assert_eq!(config.audit_interval(), Duration::from_secs(1));
    }
}
