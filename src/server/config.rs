use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::monitor::models::Project;
use crate::monitor::retry::RetryPolicy;
use crate::notifications::models::ChannelConfig;

const ENV_PREFIX: &str = "PULSEWATCH_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub from_address: String,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub log_dir: String,
    pub database_url: Option<String>,

    pub probe_timeout_secs: u64,
    pub probe_attempts: u32,
    pub probe_retry_delay_secs: u64,
    pub probe_concurrency: usize,
    /// Built-in scheduler period. Zero disables it.
    pub tick_interval_secs: u64,

    pub keepalive_urls: Vec<String>,
    pub keepalive_interval_secs: u64,
    pub keepalive_max_retries: u32,
    pub keepalive_retry_delay_secs: u64,

    pub probe_cache_capacity: usize,
    pub probe_cache_ttl_secs: u64,

    pub smtp: Option<SmtpConfig>,

    /// Seed rows, file only.
    pub projects: Vec<Project>,
    pub channels: Vec<ChannelConfig>,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    bind_address: Option<String>,
    log_dir: Option<String>,
    database_url: Option<String>,
    probe_timeout_secs: Option<u64>,
    probe_attempts: Option<u32>,
    probe_retry_delay_secs: Option<u64>,
    probe_concurrency: Option<usize>,
    tick_interval_secs: Option<u64>,
    keepalive_urls: Option<Vec<String>>,
    keepalive_interval_secs: Option<u64>,
    keepalive_max_retries: Option<u32>,
    keepalive_retry_delay_secs: Option<u64>,
    probe_cache_capacity: Option<usize>,
    probe_cache_ttl_secs: Option<u64>,
    smtp_host: Option<String>,
    smtp_port: Option<u16>,
    smtp_from: Option<String>,
    smtp_user: Option<String>,
    smtp_password: Option<String>,
}

#[derive(Deserialize, Default, Debug)]
struct FileConfig {
    #[serde(flatten)]
    settings: PartialServerConfig,
    #[serde(default)]
    projects: Vec<Project>,
    #[serde(default)]
    channels: Vec<ChannelConfig>,
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_smtp_from() -> String {
    "pulsewatch@localhost".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            log_dir: default_log_dir(),
            database_url: None,
            probe_timeout_secs: 8,
            probe_attempts: 1,
            probe_retry_delay_secs: 5,
            probe_concurrency: 4,
            tick_interval_secs: 300,
            keepalive_urls: Vec::new(),
            keepalive_interval_secs: 240,
            keepalive_max_retries: 3,
            keepalive_retry_delay_secs: 5,
            probe_cache_capacity: 256,
            probe_cache_ttl_secs: 30,
            smtp: None,
            projects: Vec::new(),
            channels: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config = match config_path {
            Some(path_str) => Self::read_file(Path::new(path_str))?,
            None => FileConfig::default(),
        };

        // 2. Load from environment variables
        let env_config: PartialServerConfig = envy::prefixed(ENV_PREFIX).from_env()?;

        // 3. Merge: environment overrides file
        let mut config = Self::merge(env_config, file_config);
        if config.database_url.is_none() {
            config.database_url = std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        }
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
        if !path.exists() {
            return Ok(FileConfig::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    fn merge(env: PartialServerConfig, file: FileConfig) -> Self {
        let defaults = Self::default();
        let f = file.settings;

        let smtp = env.smtp_host.or(f.smtp_host).filter(|h| !h.is_empty()).map(|host| SmtpConfig {
            host,
            port: env.smtp_port.or(f.smtp_port).unwrap_or(587),
            from_address: env.smtp_from.or(f.smtp_from).unwrap_or_else(default_smtp_from),
            user: env.smtp_user.or(f.smtp_user),
            password: env.smtp_password.or(f.smtp_password),
        });

        Self {
            bind_address: env.bind_address.or(f.bind_address).unwrap_or(defaults.bind_address),
            log_dir: env.log_dir.or(f.log_dir).unwrap_or(defaults.log_dir),
            database_url: env.database_url.or(f.database_url).filter(|v| !v.is_empty()),
            probe_timeout_secs: env
                .probe_timeout_secs
                .or(f.probe_timeout_secs)
                .unwrap_or(defaults.probe_timeout_secs),
            probe_attempts: env.probe_attempts.or(f.probe_attempts).unwrap_or(defaults.probe_attempts),
            probe_retry_delay_secs: env
                .probe_retry_delay_secs
                .or(f.probe_retry_delay_secs)
                .unwrap_or(defaults.probe_retry_delay_secs),
            probe_concurrency: env
                .probe_concurrency
                .or(f.probe_concurrency)
                .unwrap_or(defaults.probe_concurrency),
            tick_interval_secs: env
                .tick_interval_secs
                .or(f.tick_interval_secs)
                .unwrap_or(defaults.tick_interval_secs),
            keepalive_urls: env.keepalive_urls.or(f.keepalive_urls).unwrap_or_default(),
            keepalive_interval_secs: env
                .keepalive_interval_secs
                .or(f.keepalive_interval_secs)
                .unwrap_or(defaults.keepalive_interval_secs),
            keepalive_max_retries: env
                .keepalive_max_retries
                .or(f.keepalive_max_retries)
                .unwrap_or(defaults.keepalive_max_retries),
            keepalive_retry_delay_secs: env
                .keepalive_retry_delay_secs
                .or(f.keepalive_retry_delay_secs)
                .unwrap_or(defaults.keepalive_retry_delay_secs),
            probe_cache_capacity: env
                .probe_cache_capacity
                .or(f.probe_cache_capacity)
                .unwrap_or(defaults.probe_cache_capacity),
            probe_cache_ttl_secs: env
                .probe_cache_ttl_secs
                .or(f.probe_cache_ttl_secs)
                .unwrap_or(defaults.probe_cache_ttl_secs),
            smtp,
            projects: file.projects,
            channels: file.channels,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.probe_timeout_secs == 0 {
            return Err(ConfigError::Invalid("probe_timeout_secs must be greater than zero".to_string()));
        }
        if self.probe_concurrency == 0 {
            return Err(ConfigError::Invalid("probe_concurrency must be greater than zero".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        for project in &self.projects {
            if !seen.insert(project.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate project id '{}'", project.id)));
            }
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn probe_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.probe_attempts, Duration::from_secs(self.probe_retry_delay_secs))
    }

    pub fn keepalive_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.keepalive_max_retries,
            Duration::from_secs(self.keepalive_retry_delay_secs),
        )
    }

    pub fn probe_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.probe_cache_ttl_secs)
    }
}
