use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "PG_EXPORTER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "pg-exporter.yaml";
pub const DATA_SOURCE_NAME_ENV: &str = "DATA_SOURCE_NAME";
pub const LISTEN_PORT_ENV: &str = "PG_EXPORTER_LISTEN_PORT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub scrape: ScrapeConfig,
    pub log: LogConfig,
    pub collectors: CollectorsConfig,
}

impl Configuration {
    /// Loads the file named by `PG_EXPORTER_CONFIG` and applies environment
    /// overrides. A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from(Path::new(&path), |key| std::env::var(key).ok())
    }

    pub fn load_from(
        path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut configuration = match std::fs::read_to_string(path) {
            Ok(content) => Self::from_yaml(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        configuration.apply_overrides(env)?;
        configuration.validate()?;
        Ok(configuration)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        // an empty document deserializes to unit, not to an empty mapping
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        Ok(serde_yaml::from_str(content)?)
    }

    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(url) = env(DATA_SOURCE_NAME_ENV) {
            self.database.url = url;
        }

        if let Some(port) = env(LISTEN_PORT_ENV) {
            self.server.port = port.trim().parse().map_err(|e| {
                ConfigError::Invalid(format!("{LISTEN_PORT_ENV}={port:?}: {e}"))
            })?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Invalid("database.url must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be positive".into(),
            ));
        }

        if self.scrape.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "scrape.channel_capacity must be positive".into(),
            ));
        }

        if self.scrape.timeout == Some(Duration::ZERO) {
            return Err(ConfigError::Invalid("scrape.timeout must be positive".into()));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: IpAddr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 9187,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    #[serde(deserialize_with = "duration")]
    pub acquire_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://postgres@localhost:5432/postgres".to_owned(),
            max_connections: 4,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

// The URL may carry credentials.
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Deadline for a whole scrape. Each collector is additionally capped by
    /// its own query timeout.
    #[serde(deserialize_with = "optional_duration")]
    pub timeout: Option<Duration>,
    pub channel_capacity: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            channel_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// Log to a daily rolling file in this directory instead of stdout.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            directory: None,
            file_prefix: "pg-exporter.log".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorToggle {
    pub enabled: bool,
}

/// Per-collector overrides of the default enabled flag, keyed by subsystem.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct CollectorsConfig(BTreeMap<String, CollectorToggle>);

impl CollectorsConfig {
    pub fn enabled(&self, name: &str) -> Option<bool> {
        self.0.get(name).map(|toggle| toggle.enabled)
    }

    pub fn set_enabled(&mut self, name: impl Into<String>, enabled: bool) {
        self.0.insert(name.into(), CollectorToggle { enabled });
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

fn duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    humantime::parse_duration(value.trim()).map_err(serde::de::Error::custom)
}

fn optional_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|value| humantime::parse_duration(value.trim()).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let config = Configuration::from_yaml("").unwrap();

        assert_eq!(9187, config.server.port);
        assert_eq!(4, config.database.max_connections);
        assert_eq!(Duration::from_secs(5), config.database.acquire_timeout);
        assert_eq!(None, config.scrape.timeout);
        assert_eq!(1024, config.scrape.channel_capacity);
        assert_eq!("info", config.log.level);
        assert!(config.log.directory.is_none());
        assert_eq!(None, config.collectors.enabled("stat_user_tables_size"));
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_full_document() {
        let yaml = r#"
server:
  address: 127.0.0.1
  port: 9000
database:
  url: postgres://exporter:secret@db:5432/app
  max_connections: 2
  acquire_timeout: 1500ms
scrape:
  timeout: 10s
  channel_capacity: 64
log:
  level: debug
  directory: /var/log/pg-exporter
collectors:
  stat_user_tables_size:
    enabled: false
"#;

        let config = Configuration::from_yaml(yaml).unwrap();

        assert_eq!("127.0.0.1".parse::<IpAddr>().unwrap(), config.server.address);
        assert_eq!(9000, config.server.port);
        assert_eq!("postgres://exporter:secret@db:5432/app", config.database.url);
        assert_eq!(2, config.database.max_connections);
        assert_eq!(Duration::from_millis(1500), config.database.acquire_timeout);
        assert_eq!(Some(Duration::from_secs(10)), config.scrape.timeout);
        assert_eq!(64, config.scrape.channel_capacity);
        assert_eq!("debug", config.log.level);
        assert_eq!(
            Some(PathBuf::from("/var/log/pg-exporter")),
            config.log.directory
        );
        assert_eq!("pg-exporter.log", config.log.file_prefix);
        assert_eq!(Some(false), config.collectors.enabled("stat_user_tables_size"));
    }

    #[test]
    fn test_invalid_duration() {
        let err = Configuration::from_yaml("scrape:\n  timeout: soon\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_debug_redacts_url() {
        let config = DatabaseConfig {
            url: "postgres://user:hunter2@db/app".to_owned(),
            ..Default::default()
        };

        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Configuration::load_from(&dir.path().join("absent.yaml"), no_env).unwrap();

        assert_eq!(9187, config.server.port);
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "server:\n  port: 9000\ndatabase:\n  url: postgres://file/db\n",
        )
        .unwrap();

        let env: HashMap<&str, &str> = [
            (DATA_SOURCE_NAME_ENV, "postgres://env/db"),
            (LISTEN_PORT_ENV, "9999"),
        ]
        .into_iter()
        .collect();

        let config =
            Configuration::load_from(&path, |key| env.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!("postgres://env/db", config.database.url);
        assert_eq!(9999, config.server.port);
    }

    #[test]
    fn test_invalid_port_override() {
        let dir = tempfile::tempdir().unwrap();
        let err = Configuration::load_from(&dir.path().join("absent.yaml"), |key| {
            (key == LISTEN_PORT_ENV).then(|| "http".to_owned())
        })
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let config = Configuration::from_yaml("scrape:\n  channel_capacity: 0\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
