//! Configuration module for midi-relay.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default listen address (all interfaces, port 1235).
pub const DEFAULT_LISTEN: &str = "0.0.0.0:1235";
/// Fixed destination for uploads.
pub const DEFAULT_UPLOAD_PATH: &str = "received_recording.mid";
/// Idle timeout applied to every read.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 5;
/// Maximum bytes pulled from the socket per read.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "midi-relay")]
#[command(author = "midi-relay authors")]
#[command(version = "0.1.0")]
#[command(about = "Serve one MIDI file to a single client, or accept one upload", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve a source file to one client, then stop
    Serve {
        /// File returned to GET requests
        source: PathBuf,

        /// Address to bind to (e.g., 0.0.0.0:1235)
        #[arg(short = 'l', long)]
        listen: Option<String>,

        /// Where PUT uploads are written
        #[arg(short = 'o', long)]
        upload_path: Option<PathBuf>,

        /// Idle read timeout in seconds
        #[arg(short = 't', long)]
        read_timeout: Option<u64>,
    },
    /// Retrieve the served file from a running relay
    Fetch {
        /// Relay address (e.g., 192.168.1.20:1235)
        addr: String,
        /// Where to save the received bytes
        output: PathBuf,
    },
    /// Upload a file to a running relay
    Upload {
        /// Relay address (e.g., 192.168.1.20:1235)
        addr: String,
        /// File to send
        file: PathBuf,
    },
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Destination for uploads
    #[serde(default = "default_upload_path")]
    pub upload_path: PathBuf,
    /// Idle read timeout in seconds
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Maximum bytes per read
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            upload_path: default_upload_path(),
            read_timeout_secs: default_read_timeout_secs(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

fn default_upload_path() -> PathBuf {
    PathBuf::from(DEFAULT_UPLOAD_PATH)
}

fn default_read_timeout_secs() -> u64 {
    DEFAULT_READ_TIMEOUT_SECS
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolved settings for one serve attempt.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: String,
    pub upload_path: PathBuf,
    pub read_timeout: Duration,
    pub chunk_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerSection::default().into()
    }
}

impl From<ServerSection> for ServerConfig {
    fn from(section: ServerSection) -> Self {
        Self {
            listen: section.listen,
            upload_path: section.upload_path,
            read_timeout: Duration::from_secs(section.read_timeout_secs.max(1)),
            chunk_size: section.chunk_size.max(1),
        }
    }
}

/// What the process was asked to do.
#[derive(Debug, Clone)]
pub enum Action {
    Serve { source: PathBuf, server: ServerConfig },
    Fetch { addr: String, output: PathBuf },
    Upload { addr: String, file: PathBuf },
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub action: Action,
    /// Timeout for client-side reads and connects.
    pub client_timeout: Duration,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::merge(cli, toml_config))
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let client_timeout = Duration::from_secs(toml_config.server.read_timeout_secs.max(1));

        let action = match cli.command {
            Command::Serve {
                source,
                listen,
                upload_path,
                read_timeout,
            } => {
                let mut section = toml_config.server;
                if let Some(listen) = listen {
                    section.listen = listen;
                }
                if let Some(upload_path) = upload_path {
                    section.upload_path = upload_path;
                }
                if let Some(secs) = read_timeout {
                    section.read_timeout_secs = secs;
                }
                Action::Serve {
                    source,
                    server: section.into(),
                }
            }
            Command::Fetch { addr, output } => Action::Fetch { addr, output },
            Command::Upload { addr, file } => Action::Upload { addr, file },
        };

        Config {
            action,
            client_timeout,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.listen, "0.0.0.0:1235");
        assert_eq!(config.upload_path, PathBuf::from("received_recording.mid"));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.chunk_size, 1024);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "127.0.0.1:4000"
            upload_path = "/tmp/take1.mid"
            read_timeout_secs = 2

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:4000");
        assert_eq!(config.server.upload_path, PathBuf::from("/tmp/take1.mid"));
        assert_eq!(config.server.read_timeout_secs, 2);
        assert_eq!(config.server.chunk_size, 1024);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let cli = CliArgs::try_parse_from([
            "midi-relay",
            "serve",
            "cmaj.mid",
            "--listen",
            "127.0.0.1:9000",
            "--read-timeout",
            "1",
        ])
        .unwrap();
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            listen = "0.0.0.0:1"
            upload_path = "from_file.mid"
        "#,
        )
        .unwrap();

        let config = Config::merge(cli, toml_config);
        match config.action {
            Action::Serve { source, server } => {
                assert_eq!(source, PathBuf::from("cmaj.mid"));
                assert_eq!(server.listen, "127.0.0.1:9000");
                assert_eq!(server.upload_path, PathBuf::from("from_file.mid"));
                assert_eq!(server.read_timeout, Duration::from_secs(1));
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_zero_chunk_size_clamped() {
        let section = ServerSection {
            chunk_size: 0,
            ..ServerSection::default()
        };
        assert_eq!(ServerConfig::from(section).chunk_size, 1);
    }
}
