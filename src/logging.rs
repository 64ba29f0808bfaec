//! Structured logging for the importer.
//!
//! `tracing`-based logging with configurable level, format and destination.
//! Priority order (highest to lowest): CLI flags, `DIRLOAD_LOG*` environment
//! variables, configuration file, defaults.

use crate::error::ImportError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr, file
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path when output is "file"; None means use runtime default
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Module-specific log levels
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stderr".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: None,
            modules: HashMap::new(),
        }
    }
}

/// Resolve the log file path with precedence: config file, DIRLOAD_LOG_FILE
/// env, platform state directory default.
pub fn resolve_log_file_path(config_file: Option<PathBuf>) -> Result<PathBuf, ImportError> {
    if let Ok(env_path) = std::env::var("DIRLOAD_LOG_FILE") {
        if !env_path.is_empty() {
            return Ok(PathBuf::from(env_path));
        }
    }
    if let Some(p) = config_file {
        if !p.as_os_str().is_empty() {
            return Ok(p);
        }
    }
    let project_dirs = directories::ProjectDirs::from("", "dirload", "dirload").ok_or_else(|| {
        ImportError::Config("could not determine platform state directory for log file".to_string())
    })?;
    let state_dir = project_dirs
        .state_dir()
        .unwrap_or_else(|| project_dirs.data_dir());
    Ok(state_dir.join("dirload.log"))
}

/// Initialize the logging system.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ImportError> {
    let filter = build_env_filter(config)?;
    let format = determine_format(config)?;
    let output = std::env::var("DIRLOAD_LOG_OUTPUT").unwrap_or_else(|_| config.output.clone());

    let writer = match output.as_str() {
        "stdout" => BoxMakeWriter::new(std::io::stdout),
        "stderr" => BoxMakeWriter::new(std::io::stderr),
        "file" => {
            let log_file = resolve_log_file_path(config.file.clone())?;
            if let Some(parent) = log_file.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        other => {
            return Err(ImportError::Config(format!(
                "invalid log output: {} (must be 'stdout', 'stderr' or 'file')",
                other
            )))
        }
    };

    let base = Registry::default().with(filter);

    if format == "json" {
        base.with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_writer(writer),
        )
        .init();
    } else {
        base.with(
            fmt::layer()
                .with_target(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(output != "file")
                .with_writer(writer),
        )
        .init();
    }

    Ok(())
}

/// Build environment filter from config or the DIRLOAD_LOG variable.
fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter, ImportError> {
    if let Ok(filter) = EnvFilter::try_from_env("DIRLOAD_LOG") {
        return Ok(filter);
    }

    let mut filter = EnvFilter::new(config.level.as_str());

    for (module, module_level) in &config.modules {
        let directive = format!("{}={}", module, module_level);
        filter = filter.add_directive(
            directive
                .parse()
                .map_err(|e| ImportError::Config(format!("invalid log directive: {}", e)))?,
        );
    }

    Ok(filter)
}

fn determine_format(config: &LoggingConfig) -> Result<String, ImportError> {
    let format = std::env::var("DIRLOAD_LOG_FORMAT").unwrap_or_else(|_| config.format.clone());

    if format != "json" && format != "text" {
        return Err(ImportError::Config(format!(
            "invalid log format: {} (must be 'json' or 'text')",
            format
        )));
    }

    Ok(format)
}
