//! Configuration types for vcrproxy

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::proxy::Origin;
use crate::{Result, VcrError};

/// Maximum depth of `extends` chains
const MAX_EXTENDS_DEPTH: usize = 8;

/// Operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Forward cache misses to the origin and store the response
    Record,
    /// Serve from stored records only, answer misses with 501
    Play,
    /// Re-issue stored records against the origin to refresh them
    Replay,
}

impl std::str::FromStr for Mode {
    type Err = VcrError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "record" => Ok(Self::Record),
            "play" => Ok(Self::Play),
            "replay" => Ok(Self::Replay),
            other => Err(VcrError::ConfigError(format!("Unknown mode: {other}"))),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the stored archives
    #[serde(default = "default_snapshots_dir", alias = "snapshotsDir")]
    pub snapshots_dir: PathBuf,
    /// Proxied origins, in declaration order
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Resource limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// One proxied origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Display name used in log output
    #[serde(default = "default_name")]
    pub name: String,
    /// Origin base URL, e.g. `https://api.example.com/v1`
    pub origin: String,
    /// Host the proxy binds to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port the proxy binds to, 0 for an ephemeral port
    #[serde(default)]
    pub port: u16,
    /// Signature options
    #[serde(default)]
    pub options: ServerOptions,
}

impl ServerConfig {
    /// Create a server config with default bind address and options
    pub fn new(name: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: origin.into(),
            host: default_host(),
            port: 0,
            options: ServerOptions::default(),
        }
    }
}

/// Per-origin signature options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerOptions {
    /// Header names excluded from the request signature
    #[serde(default, alias = "ignoreHeaders")]
    pub ignore_headers: Vec<String>,
    /// Query parameter names excluded from the request signature
    #[serde(default, alias = "ignoreQueryParameters")]
    pub ignore_query_parameters: Vec<String>,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human readable output
    #[default]
    Compact,
    /// Multi-line human readable output
    Pretty,
    /// Newline-delimited JSON
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level filter, e.g. `info` or `vcrproxy=debug`
    #[serde(default)]
    pub level: Option<String>,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

/// Resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum concurrent connections per proxy server
    pub max_connections: usize,
    /// Maximum request body size in bytes
    pub max_request_size: usize,
    /// Maximum origin response body size in bytes
    pub max_response_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            max_request_size: 16 * 1024 * 1024,   // 16 MB
            max_response_size: 256 * 1024 * 1024, // 256 MB
        }
    }
}

fn default_snapshots_dir() -> PathBuf {
    PathBuf::from("./__vcr__")
}

fn default_name() -> String {
    "Unnamed".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

impl Config {
    /// Load configuration from a TOML file, following `extends` chains.
    ///
    /// A relative `snapshots_dir` is resolved against the directory of `path`.
    ///
    /// # Errors
    ///
    /// Returns error if a file cannot be read or parsed, or validation fails
    pub fn from_file(path: &Path) -> Result<Self> {
        let value = load_table(path, 0)?;

        let mut config: Self = value
            .try_into()
            .map_err(|e| VcrError::ConfigError(format!("Failed to parse config: {e}")))?;

        if config.snapshots_dir.is_relative() {
            if let Some(dir) = path.parent() {
                config.snapshots_dir = dir.join(&config.snapshots_dir);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string (no `extends` support)
    ///
    /// # Errors
    ///
    /// Returns error if the string cannot be parsed or validation fails
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| VcrError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(VcrError::ConfigError(
                "At least one server must be configured".to_string(),
            ));
        }

        for (i, server) in self.servers.iter().enumerate() {
            if server.name.trim().is_empty() {
                return Err(VcrError::ConfigError(format!(
                    "Server {i}: name cannot be empty"
                )));
            }

            if server.host.trim().is_empty() {
                return Err(VcrError::ConfigError(format!(
                    "Server {i}: host cannot be empty"
                )));
            }

            Origin::parse(&server.origin)
                .map_err(|e| VcrError::ConfigError(format!("Server {i}: {e}")))?;
        }

        if self.limits.max_connections == 0
            || self.limits.max_request_size == 0
            || self.limits.max_response_size == 0
        {
            return Err(VcrError::ConfigError(
                "Resource limits must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Read one config file as a TOML table, with its `extends` parent merged underneath
fn load_table(path: &Path, depth: usize) -> Result<toml::Value> {
    if depth > MAX_EXTENDS_DEPTH {
        return Err(VcrError::ConfigError(format!(
            "Config extends chain deeper than {MAX_EXTENDS_DEPTH} at {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        VcrError::ConfigError(format!(
            "Failed to read config file {}: {e}",
            path.display()
        ))
    })?;

    let mut table: toml::Table = toml::from_str(&content).map_err(|e| {
        VcrError::ConfigError(format!("Failed to parse {}: {e}", path.display()))
    })?;

    let Some(parent) = table.remove("extends") else {
        return Ok(toml::Value::Table(table));
    };

    let parent = parent.as_str().ok_or_else(|| {
        VcrError::ConfigError(format!("{}: extends must be a string", path.display()))
    })?;
    let parent_path = path
        .parent()
        .map_or_else(|| PathBuf::from(parent), |dir| dir.join(parent));

    let mut merged = match load_table(&parent_path, depth + 1)? {
        toml::Value::Table(base) => base,
        _ => toml::Table::new(),
    };
    // Shallow merge: keys of the extending file win
    merged.extend(table);

    Ok(toml::Value::Table(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_parse() {
        let config_toml = r#"
            snapshots_dir = "/tmp/vcr"

            [[servers]]
            name = "api"
            origin = "https://api.example.com"
            port = 8080

            [servers.options]
            ignore_headers = ["authorization"]
        "#;

        let config = Config::from_toml_str(config_toml).unwrap();
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].host, "localhost");
        assert_eq!(config.servers[0].port, 8080);
        assert_eq!(
            config.servers[0].options.ignore_headers,
            vec!["authorization".to_string()]
        );
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_partial_limits_keep_defaults() {
        let config_toml = r#"
            [limits]
            max_connections = 10

            [[servers]]
            origin = "http://localhost:9000"
        "#;

        let config = Config::from_toml_str(config_toml).unwrap();
        let defaults = LimitsConfig::default();
        assert_eq!(config.limits.max_connections, 10);
        assert_eq!(config.limits.max_request_size, defaults.max_request_size);
        assert_eq!(config.limits.max_response_size, defaults.max_response_size);
    }

    #[test]
    fn test_camel_case_option_aliases() {
        let config_toml = r#"
            [[servers]]
            origin = "http://localhost:9000"
            options = { ignoreHeaders = ["x-trace"], ignoreQueryParameters = ["ts"] }
        "#;

        let config = Config::from_toml_str(config_toml).unwrap();
        let server = &config.servers[0];
        assert_eq!(server.name, "Unnamed");
        assert_eq!(server.port, 0);
        assert_eq!(server.options.ignore_headers, vec!["x-trace".to_string()]);
        assert_eq!(
            server.options.ignore_query_parameters,
            vec!["ts".to_string()]
        );
        assert_eq!(config.snapshots_dir, PathBuf::from("./__vcr__"));
    }

    #[test]
    fn test_invalid_config_no_servers() {
        let result = Config::from_toml_str("servers = []");
        assert!(matches!(result, Err(VcrError::ConfigError(_))));
    }

    #[test]
    fn test_invalid_origin() {
        let config_toml = r#"
            [[servers]]
            origin = "ftp://example.com"
        "#;

        let err = Config::from_toml_str(config_toml).unwrap_err();
        assert!(err.to_string().contains("Server 0"));
    }

    #[test]
    fn test_extends_merges_parent() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("base.toml"),
            "snapshots_dir = \"recordings\"\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("vcr.toml"),
            r#"
                extends = "./base.toml"

                [[servers]]
                name = "test"
                origin = "https://google.com"
            "#,
        )
        .unwrap();

        let config = Config::from_file(&dir.path().join("vcr.toml")).unwrap();
        assert_eq!(config.snapshots_dir, dir.path().join("recordings"));
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert_eq!(config.servers[0].name, "test");
    }

    #[test]
    fn test_extends_cycle_is_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.toml"), "extends = \"b.toml\"\n").unwrap();
        std::fs::write(dir.path().join("b.toml"), "extends = \"a.toml\"\n").unwrap();

        let result = Config::from_file(&dir.path().join("a.toml"));
        assert!(matches!(result, Err(VcrError::ConfigError(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file(Path::new("/nonexistent/vcr.toml"));
        assert!(matches!(result, Err(VcrError::ConfigError(_))));
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("play".parse::<Mode>().unwrap(), Mode::Play);
        assert!("rewind".parse::<Mode>().is_err());
    }
}
