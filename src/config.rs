/*!
 * Configuration types for Tether
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TetherError};

/// Connector configuration: where the remote endpoint lives and how to log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Explicit endpoint address; overrides protocol/host/port/root when set
    #[serde(default)]
    pub url: Option<String>,

    /// Endpoint protocol
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Endpoint host
    #[serde(default = "default_host")]
    pub host: String,

    /// Endpoint port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path prefix under which the remote models are mounted
    #[serde(default)]
    pub root: String,

    /// Per-request timeout in seconds for the HTTP invoker (None = no timeout)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Method names that are never proxied to the remote side
    #[serde(default = "default_excluded_methods")]
    pub excluded_methods: Vec<String>,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stderr)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            url: None,
            protocol: default_protocol(),
            host: default_host(),
            port: default_port(),
            root: String::new(),
            timeout_secs: None,
            excluded_methods: default_excluded_methods(),
            log_level: LogLevel::default(),
            log_file: None,
            verbose: false,
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

// Default value functions for serde
fn default_protocol() -> String {
    "http".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_excluded_methods() -> Vec<String> {
    vec!["Change".to_string(), "Checkpoint".to_string()]
}

impl ConnectorConfig {
    /// Configuration bound to an explicit endpoint address
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| TetherError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| TetherError::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Resolve the endpoint address
    ///
    /// The explicit `url` wins. Otherwise `protocol://host:port`, followed by
    /// `/root` when a root is configured.
    pub fn endpoint(&self) -> String {
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return url.to_string();
        }

        let protocol = self.protocol.trim_end_matches(|c: char| c == ':' || c == '/');
        let root = self.root.trim_matches('/');

        if root.is_empty() {
            format!("{}://{}:{}", protocol, self.host, self.port)
        } else {
            format!("{}://{}:{}/{}", protocol, self.host, self.port, root)
        }
    }

    /// Whether `name` is on the exclusion list
    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded_methods.iter().any(|m| m == name)
    }

    /// Request timeout for the HTTP invoker
    pub fn timeout(&self) -> Option<std::time::Duration> {
        self.timeout_secs.map(std::time::Duration::from_secs)
    }
}
