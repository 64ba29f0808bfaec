//! Command-line interface for the importer.
//!
//! One invocation is one import run: parse the document, drive the remote
//! session, exit 0 on a successful commit (or a clean validation pass) and
//! nonzero on any abort.

use crate::config::{ConfigLoader, ImporterConfig};
use crate::error::ImportError;
use crate::logging::LoggingConfig;
use crate::session::HttpSession;
use crate::upload::{validate_structure, ImportSummary, UploadOrchestrator};
use crate::xml::TokenSource;
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

/// dirload - bulk XML import for the dird directory service
#[derive(Parser)]
#[command(name = "dirload")]
#[command(about = "Bulk XML import client for the dird directory service")]
pub struct Cli {
    /// XML document to import
    pub file: PathBuf,

    /// Login username (overrides config)
    #[arg(short, long)]
    pub username: Option<String>,

    /// Login password (overrides config)
    #[arg(short, long)]
    pub password: Option<String>,

    /// Server hostname (overrides config)
    #[arg(long)]
    pub host: Option<String>,

    /// Server port (overrides config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Token source lookahead depth
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Parse and validate only; no server connection
    #[arg(long, conflicts_with_all = ["schema_only", "data_only"])]
    pub dry_run: bool,

    /// Validate only the schema section; no server connection
    #[arg(long, conflicts_with = "data_only")]
    pub schema_only: bool,

    /// Import the data section, skipping any schema section (the default)
    #[arg(long)]
    pub data_only: bool,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Resolved configuration for one invocation.
pub struct CliContext {
    config: ImporterConfig,
}

impl CliContext {
    /// Load configuration and fold the CLI overrides in on top.
    pub fn new(cli: &Cli) -> Result<Self, ImportError> {
        let mut config = ConfigLoader::load(cli.config.as_deref())?;

        if let Some(username) = &cli.username {
            config.server.username = Some(username.clone());
        }
        if let Some(password) = &cli.password {
            config.server.password = Some(password.clone());
        }
        if let Some(host) = &cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(buffer_size) = cli.buffer_size {
            config.buffer_size = buffer_size;
        }
        if let Some(level) = &cli.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &cli.log_format {
            config.logging.format = format.clone();
        }
        if let Some(output) = &cli.log_output {
            config.logging.output = output.clone();
        }
        if let Some(file) = &cli.log_file {
            config.logging.file = Some(file.clone());
        }

        Ok(Self { config })
    }

    pub fn logging(&self) -> &LoggingConfig {
        &self.config.logging
    }

    /// Execute the invocation, returning the terminal message for stdout.
    pub fn execute(&self, cli: &Cli) -> Result<String, ImportError> {
        if cli.dry_run || cli.schema_only {
            return self.validate(cli);
        }
        self.import(cli)
    }

    fn validate(&self, cli: &Cli) -> Result<String, ImportError> {
        let mut source = TokenSource::from_file(&cli.file, self.config.buffer_size)?;
        let report = validate_structure(&mut source)?;

        if cli.schema_only {
            if report.has_schema {
                Ok("schema section is structurally valid".to_string())
            } else {
                Ok("document carries no schema section".to_string())
            }
        } else {
            Ok(format!(
                "document is structurally valid: {} object(s), {} field(s){}",
                report.objects,
                report.fields,
                if report.has_schema {
                    ", schema section present"
                } else {
                    ""
                }
            ))
        }
    }

    fn import(&self, cli: &Cli) -> Result<String, ImportError> {
        info!(
            host = %self.config.server.host,
            port = self.config.server.port,
            "connecting to directory server"
        );
        let session = HttpSession::login(&self.config.server)?;
        let catalog = session.fetch_catalog()?;

        let mut source = TokenSource::from_file(&cli.file, self.config.buffer_size)?;
        let mut orchestrator = UploadOrchestrator::new(&session, &catalog);
        let summary = orchestrator.run(&mut source)?;

        Ok(render_summary(&summary))
    }
}

fn render_summary(summary: &ImportSummary) -> String {
    let mut out = String::from("transaction committed");

    let sections: [(&str, &HashMap<String, usize>); 4] = [
        ("created", &summary.created),
        ("edited", &summary.edited),
        ("deleted", &summary.deleted),
        ("inactivated", &summary.inactivated),
    ];

    for (verb, counts) in sections {
        if counts.is_empty() {
            continue;
        }
        let mut items: Vec<_> = counts.iter().collect();
        items.sort();
        let detail: Vec<String> = items
            .iter()
            .map(|(type_name, count)| format!("{} {}", count, type_name))
            .collect();
        out.push_str(&format!("\n  {}: {}", verb, detail.join(", ")));
    }

    out
}
