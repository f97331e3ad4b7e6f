//! Server configuration.
//!
//! Resolution order: built-in defaults, then the TOML file, then
//! environment variables ([`Config::apply_env`]), then CLI flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use stratus_core::BackoffPolicy;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub provider: ProviderConfig,
    pub backoff: BackoffConfig,
    pub worker: WorkerConfig,
    pub cache: CacheConfig,
}

impl Config {
    /// Load configuration from the default path, or defaults if absent.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `STRATUS_BIND` | `server.bind` |
    /// | `PORT` | port of `server.bind` (ignored when `STRATUS_BIND` is set) |
    /// | `STRATUS_DB_PATH` | `storage.path` |
    /// | `WEATHER_API_BASE_URL` | `provider.base_url` |
    /// | `WEATHER_API_KEY` | `provider.api_key` |
    /// | `BACKOFF_MAX_RETRIES` | `backoff.max_retries` |
    /// | `BACKOFF_BASE_DELAY_MS` | `backoff.base_delay_ms` |
    /// | `BACKOFF_MAX_DELAY_MS` | `backoff.max_delay_ms` |
    /// | `WORKER_PERIOD_SECONDS` | `worker.period_secs` |
    /// | `WORKER_LOCATION_ID` | `worker.location_id` |
    /// | `WORKER_LIMIT` | `worker.limit` |
    /// | `WORKER_FORECAST_DAY_TOTAL` | `worker.forecast_days` |
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("STRATUS_BIND") {
            self.server.bind = bind;
        } else if let Some(port) = lookup("PORT") {
            let port: u16 = parse_env("PORT", &port)?;
            let host = self
                .server
                .bind
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            self.server.bind = format!("{}:{}", host, port);
        }

        if let Some(path) = lookup("STRATUS_DB_PATH") {
            self.storage.path = PathBuf::from(path);
        }
        if let Some(url) = lookup("WEATHER_API_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(key) = lookup("WEATHER_API_KEY") {
            self.provider.api_key = key;
        }

        if let Some(v) = lookup("BACKOFF_MAX_RETRIES") {
            self.backoff.max_retries = parse_env("BACKOFF_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("BACKOFF_BASE_DELAY_MS") {
            self.backoff.base_delay_ms = parse_env("BACKOFF_BASE_DELAY_MS", &v)?;
        }
        if let Some(v) = lookup("BACKOFF_MAX_DELAY_MS") {
            self.backoff.max_delay_ms = parse_env("BACKOFF_MAX_DELAY_MS", &v)?;
        }

        if let Some(v) = lookup("WORKER_PERIOD_SECONDS") {
            self.worker.period_secs = parse_env("WORKER_PERIOD_SECONDS", &v)?;
        }
        if let Some(v) = lookup("WORKER_LOCATION_ID") {
            let id: i64 = parse_env("WORKER_LOCATION_ID", &v)?;
            self.worker.location_id = (id > 0).then_some(id);
        }
        if let Some(v) = lookup("WORKER_LIMIT") {
            self.worker.limit = parse_env("WORKER_LIMIT", &v)?;
        }
        if let Some(v) = lookup("WORKER_FORECAST_DAY_TOTAL") {
            self.worker.forecast_days = parse_env("WORKER_FORECAST_DAY_TOTAL", &v)?;
        }

        Ok(())
    }

    /// Validate the configuration and return any errors.
    ///
    /// ```
    /// use stratus_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.provider.validate());
        errors.extend(self.backoff.validate());
        errors.extend(self.worker.validate());
        errors.extend(self.cache.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var,
        value: value.to_string(),
    })
}

fn error(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(error("server.bind", "bind address cannot be empty"));
            return errors;
        }

        match self.bind.rsplit_once(':') {
            None => errors.push(error(
                "server.bind",
                format!(
                    "invalid bind address '{}': expected format 'host:port'",
                    self.bind
                ),
            )),
            Some((_, port)) => match port.parse::<u16>() {
                Ok(0) => errors.push(error("server.bind", "port cannot be 0")),
                Ok(_) => {}
                Err(_) => errors.push(error(
                    "server.bind",
                    format!("invalid port '{}': must be a number 1-65535", port),
                )),
            },
        }

        errors
    }
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: stratus_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Vec<ValidationError> {
        if self.path.as_os_str().is_empty() {
            vec![error("storage.path", "database path cannot be empty")]
        } else {
            Vec::new()
        }
    }
}

/// Forecast provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// WeatherAPI endpoint.
    pub base_url: String,
    /// WeatherAPI key. Usually supplied via `WEATHER_API_KEY`.
    pub api_key: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: stratus_core::DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            timeout_secs: 10,
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            errors.push(error(
                "provider.base_url",
                format!(
                    "invalid base URL '{}': must start with http:// or https://",
                    self.base_url
                ),
            ));
        }
        if self.timeout_secs == 0 {
            errors.push(error("provider.timeout_secs", "timeout cannot be 0"));
        }

        errors
    }
}

/// Retry policy for provider calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        let policy = BackoffPolicy::default();
        Self {
            max_retries: policy.max_retries,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
        }
    }
}

/// Upper bound on retries, to keep a single sync run bounded.
pub const MAX_RETRIES: u32 = 10;

impl BackoffConfig {
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.max_retries,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.max_retries > MAX_RETRIES {
            errors.push(error(
                "backoff.max_retries",
                format!(
                    "max retries {} is too large (maximum {})",
                    self.max_retries, MAX_RETRIES
                ),
            ));
        }
        if self.base_delay_ms > self.max_delay_ms {
            errors.push(error(
                "backoff.base_delay_ms",
                format!(
                    "base delay {}ms exceeds max delay {}ms",
                    self.base_delay_ms, self.max_delay_ms
                ),
            ));
        }

        errors
    }
}

/// Periodic sync worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Whether `serve` also runs the worker.
    pub enabled: bool,
    /// Seconds between sync runs.
    pub period_secs: u64,
    /// Sync only this location.
    pub location_id: Option<i64>,
    /// Maximum locations per run (0 means 10).
    pub limit: u32,
    /// Forecast days to request (0 means 14).
    pub forecast_days: u32,
}

/// Minimum worker period in seconds.
pub const MIN_WORKER_PERIOD: u64 = 10;

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period_secs: 3600,
            location_id: None,
            limit: 10,
            forecast_days: 14,
        }
    }
}

impl WorkerConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.period_secs < MIN_WORKER_PERIOD {
            errors.push(error(
                "worker.period_secs",
                format!(
                    "period {} is too short (minimum {} seconds)",
                    self.period_secs, MIN_WORKER_PERIOD
                ),
            ));
        }
        if self.forecast_days > stratus_core::DEFAULT_FORECAST_DAYS {
            errors.push(error(
                "worker.forecast_days",
                format!(
                    "forecast days {} exceeds the provider maximum of {}",
                    self.forecast_days,
                    stratus_core::DEFAULT_FORECAST_DAYS
                ),
            ));
        }

        errors
    }
}

/// Query cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a cached weather query result.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 600 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn validate(&self) -> Vec<ValidationError> {
        if self.ttl_secs == 0 {
            vec![error("cache.ttl_secs", "ttl cannot be 0")]
        } else {
            Vec::new()
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid value '{value}' for environment variable {var}")]
    Env { var: &'static str, value: String },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind`).
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stratus")
        .join("server.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.provider.base_url, "https://api.weatherapi.com/v1");
        assert_eq!(config.cache.ttl(), Duration::from_secs(600));
        assert_eq!(config.backoff.policy(), BackoffPolicy::default());
        assert!(config.worker.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_full_toml() {
        let toml = r#"
            [server]
            bind = "0.0.0.0:9000"

            [storage]
            path = "/data/stratus.db"

            [provider]
            api_key = "abc"
            timeout_secs = 5

            [backoff]
            max_retries = 5
            base_delay_ms = 100
            max_delay_ms = 2000

            [worker]
            enabled = false
            period_secs = 900
            location_id = 7
            forecast_days = 3
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.storage.path, PathBuf::from("/data/stratus.db"));
        assert_eq!(config.provider.api_key, "abc");
        assert_eq!(config.provider.base_url, "https://api.weatherapi.com/v1");
        assert_eq!(config.provider.timeout(), Duration::from_secs(5));
        assert_eq!(config.backoff.policy().max_delay, Duration::from_secs(2));
        assert!(!config.worker.enabled);
        assert_eq!(config.worker.location_id, Some(7));
        assert_eq!(config.worker.limit, 10);
        assert_eq!(config.cache.ttl_secs, 600);
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("server.toml");

        let mut config = Config::default();
        config.server.bind = "0.0.0.0:9090".to_string();
        config.worker.period_secs = 60;
        config.save(&path).unwrap();

        let loaded = Config::load_validated(&path).unwrap();
        assert_eq!(loaded.server.bind, "0.0.0.0:9090");
        assert_eq!(loaded.worker.period_secs, 60);
    }

    #[test]
    fn test_config_load_errors() {
        assert!(matches!(
            Config::load("/nonexistent/path/config.toml"),
            Err(ConfigError::Read { .. })
        ));

        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("invalid.toml");
        std::fs::write(&path, "this is not valid { toml").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup(&[
                ("PORT", "9999"),
                ("WEATHER_API_KEY", "secret"),
                ("BACKOFF_MAX_RETRIES", "2"),
                ("WORKER_PERIOD_SECONDS", "120"),
                ("WORKER_LOCATION_ID", "0"),
                ("WORKER_LIMIT", "25"),
                ("WORKER_FORECAST_DAY_TOTAL", "7"),
            ]))
            .unwrap();

        assert_eq!(config.server.bind, "127.0.0.1:9999");
        assert_eq!(config.provider.api_key, "secret");
        assert_eq!(config.backoff.max_retries, 2);
        assert_eq!(config.worker.period(), Duration::from_secs(120));
        assert_eq!(config.worker.location_id, None);
        assert_eq!(config.worker.limit, 25);
        assert_eq!(config.worker.forecast_days, 7);
    }

    #[test]
    fn test_bind_override_wins_over_port() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup(&[("STRATUS_BIND", "[::1]:7000"), ("PORT", "9999")]))
            .unwrap();
        assert_eq!(config.server.bind, "[::1]:7000");
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(lookup(&[("WORKER_LIMIT", "ten")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "WORKER_LIMIT", .. }));
        assert!(err.to_string().contains("ten"));
    }

    #[test]
    fn test_server_bind_validation() {
        let ok = |bind: &str| {
            ServerConfig {
                bind: bind.to_string(),
            }
            .validate()
        };

        assert!(ok("127.0.0.1:8080").is_empty());
        assert!(ok("[::1]:8080").is_empty());
        assert!(ok("localhost:8080").is_empty());
        assert!(ok("")[0].message.contains("cannot be empty"));
        assert!(ok("127.0.0.1")[0].message.contains("host:port"));
        assert!(ok("127.0.0.1:0")[0].message.contains("cannot be 0"));
        assert!(ok("127.0.0.1:abc")[0].message.contains("must be a number"));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = Config::default();
        config.provider.base_url = "ftp://example.com".to_string();
        config.backoff.base_delay_ms = 10_000;
        config.worker.period_secs = 1;
        config.worker.forecast_days = 30;
        config.cache.ttl_secs = 0;

        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation errors");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            [
                "provider.base_url",
                "backoff.base_delay_ms",
                "worker.period_secs",
                "worker.forecast_days",
                "cache.ttl_secs",
            ]
        );

        let display = ConfigError::Validation(errors).to_string();
        assert!(display.contains("  - cache.ttl_secs: ttl cannot be 0"));
    }

    #[test]
    fn test_default_config_path() {
        assert!(default_config_path().ends_with("stratus/server.toml"));
    }
}
