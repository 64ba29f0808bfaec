//! Importer configuration.
//!
//! Layered loading: built-in defaults, then an optional config file, then
//! `DIRLOAD_`-prefixed environment variables. CLI flags override the loaded
//! values last, in the tooling layer.

use crate::error::ImportError;
use crate::logging::LoggingConfig;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Connection settings for the directory server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server hostname
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Login username
    #[serde(default)]
    pub username: Option<String>,

    /// Login password
    #[serde(default)]
    pub password: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8089
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
        }
    }
}

impl ServerConfig {
    /// Base URL for the session endpoints.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Top-level importer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImporterConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Token source lookahead depth
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_buffer_size() -> usize {
    crate::xml::reader::DEFAULT_BUFFER_SIZE
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            buffer_size: default_buffer_size(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration loader.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Default config file location (~/.config/dirload/config.toml).
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "dirload", "dirload")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration, optionally from an explicit file path.
    pub fn load(explicit_file: Option<&Path>) -> Result<ImporterConfig, ImportError> {
        let mut builder = Config::builder()
            .set_default("buffer_size", default_buffer_size() as i64)
            .map_err(|e| ImportError::Config(e.to_string()))?;

        match explicit_file {
            Some(path) => {
                builder = builder.add_source(File::from(path.to_path_buf()));
            }
            None => {
                if let Some(path) = Self::default_config_path() {
                    builder = builder.add_source(File::from(path).required(false));
                }
            }
        }

        builder = builder.add_source(Environment::with_prefix("DIRLOAD").separator("__"));

        let settings = builder
            .build()
            .map_err(|e| ImportError::Config(e.to_string()))?;

        settings
            .try_deserialize::<ImporterConfig>()
            .map_err(|e| ImportError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ImporterConfig::default();
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.port, 8089);
        assert!(config.server.username.is_none());
    }

    #[test]
    fn test_base_url() {
        let server = ServerConfig {
            host: "dird.example.net".to_string(),
            port: 9000,
            ..Default::default()
        };
        assert_eq!(server.base_url(), "http://dird.example.net:9000");
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "buffer_size = 25").unwrap();
        writeln!(file, "[server]").unwrap();
        writeln!(file, "host = \"dird.example.net\"").unwrap();
        writeln!(file, "username = \"operator\"").unwrap();

        let config = ConfigLoader::load(Some(&path)).unwrap();
        assert_eq!(config.buffer_size, 25);
        assert_eq!(config.server.host, "dird.example.net");
        assert_eq!(config.server.username.as_deref(), Some("operator"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = ConfigLoader::load(Some(Path::new("/nonexistent/dirload.toml")));
        assert!(result.is_err());
    }
}
