//! Server startup configuration
//!
//! Loaded in three layers: built-in defaults, an optional flat TOML file,
//! then environment variables:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | MORTAL_CONFIG | - | Path to a TOML config file |
//! | MORTAL_HOST | 127.0.0.1 | Bind host |
//! | MORTAL_PORT | 5000 | Bind port |
//! | MORTAL_BUFFER_DIR | ./buffer | Staging directory for submitted logs |
//! | MORTAL_DRAIN_DIR | ./drain | Sampling pool directory |
//! | MORTAL_SAMPLE_REUSE_RATE | 0.0 | Initial reuse rate |
//! | MORTAL_SAMPLE_REUSE_THRESHOLD | 0.0 | Initial reuse threshold |
//! | MORTAL_CAPACITY | 1024 | Initial buffer capacity |
//! | MORTAL_MAX_CONNECTIONS | 1024 | Concurrent connection bound |
//! | MORTAL_MAX_FRAME_BYTES | 1073741824 | Largest accepted frame |
//! | MORTAL_LOG_FORMAT | text | `text` or `json` |

use super::runtime_config::RuntimeConfig;
use crate::error::ConfigError;
use crate::observability::LogFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1 << 30;

const MAX_CONNECTIONS_MAX: usize = 65_536;

/// Startup configuration for the coordination server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Write-ahead staging area for submitted logs
    pub buffer_dir: PathBuf,
    /// Sampling-eligible pool
    pub drain_dir: PathBuf,
    pub sample_reuse_rate: f64,
    pub sample_reuse_threshold: f64,
    pub capacity: u64,
    /// Connections served concurrently; further accepts wait for a slot
    pub max_connections: usize,
    pub max_frame_bytes: usize,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let runtime = RuntimeConfig::default();
        ServerConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            buffer_dir: PathBuf::from("./buffer"),
            drain_dir: PathBuf::from("./drain"),
            sample_reuse_rate: runtime.sample_reuse_rate,
            sample_reuse_threshold: runtime.sample_reuse_threshold,
            capacity: runtime.capacity,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            log_format: LogFormat::Text,
        }
    }
}

impl ServerConfig {
    /// Defaults, then `path` (or `MORTAL_CONFIG`) if given, then env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var("MORTAL_CONFIG").ok().map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(env_path) {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("MORTAL_HOST") {
            self.host = host;
        }
        if let Some(port) = env_parse("MORTAL_PORT")? {
            self.port = port;
        }
        if let Ok(dir) = std::env::var("MORTAL_BUFFER_DIR") {
            self.buffer_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("MORTAL_DRAIN_DIR") {
            self.drain_dir = PathBuf::from(dir);
        }
        if let Some(rate) = env_parse("MORTAL_SAMPLE_REUSE_RATE")? {
            self.sample_reuse_rate = rate;
        }
        if let Some(threshold) = env_parse("MORTAL_SAMPLE_REUSE_THRESHOLD")? {
            self.sample_reuse_threshold = threshold;
        }
        if let Some(capacity) = env_parse("MORTAL_CAPACITY")? {
            self.capacity = capacity;
        }
        if let Some(max) = env_parse("MORTAL_MAX_CONNECTIONS")? {
            self.max_connections = max;
        }
        if let Some(max) = env_parse("MORTAL_MAX_FRAME_BYTES")? {
            self.max_frame_bytes = max;
        }
        if let Some(format) = env_parse("MORTAL_LOG_FORMAT")? {
            self.log_format = format;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.runtime().validate()?;
        if self.max_connections == 0 || self.max_connections > MAX_CONNECTIONS_MAX {
            return Err(ConfigError::invalid(format!(
                "max_connections must be in [1, {}], got {}",
                MAX_CONNECTIONS_MAX, self.max_connections
            )));
        }
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::invalid("max_frame_bytes must be > 0"));
        }
        if self.buffer_dir.as_os_str().is_empty() || self.drain_dir.as_os_str().is_empty() {
            return Err(ConfigError::invalid("buffer_dir and drain_dir must be set"));
        }
        if self.buffer_dir == self.drain_dir {
            return Err(ConfigError::invalid(
                "buffer_dir and drain_dir must be different directories",
            ));
        }
        Ok(())
    }

    /// Initial values of the runtime-mutable knobs
    pub fn runtime(&self) -> RuntimeConfig {
        RuntimeConfig::new(
            self.sample_reuse_rate,
            self.sample_reuse_threshold,
            self.capacity,
        )
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::invalid(format!("{}={:?}: {}", key, raw, e))),
        Err(_) => Ok(None),
    }
}
