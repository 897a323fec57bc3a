//! Command-line interface for message-export
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and argument overrides
//! - Translating export arguments into an [`ExportRequest`]

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::{Config, ExportFormat, LogLevel};
use crate::error::Result;
use crate::export::ExportRequest;

/// Actor used when none is given
const DEFAULT_ACTOR: &str = "local";

/// Streaming, chunked export of channel messages
#[derive(Parser, Debug)]
#[command(
    name = "message-export",
    version,
    about = "Export channel messages into chunked CSV or JSON Lines files",
    long_about = "Walks a message history newest-first, filters and projects every message,
and writes the result in bounded parts. Interrupt with Ctrl+C to stop cooperatively."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Quiet mode (errors only, no progress)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one export
    Export(ExportArgs),

    /// Show the effective configuration
    Config {
        /// Print only the configuration file path
        #[arg(long)]
        path: bool,
    },
}

/// Arguments of the `export` subcommand
#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Message history as JSON Lines, one message per line
    #[arg(short = 'i', long, value_name = "FILE")]
    pub input: PathBuf,

    /// Directory receiving the exported parts
    #[arg(short = 'o', long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Identity of the requester
    #[arg(long, value_name = "ID", default_value = DEFAULT_ACTOR)]
    pub actor: String,

    /// Name used in output file names (defaults to the input file stem)
    #[arg(long, value_name = "NAME")]
    pub label: Option<String>,

    /// Only messages whose author holds this role
    #[arg(long, value_name = "ROLE")]
    pub role: Option<String>,

    /// Only messages from channels in this category
    #[arg(long, value_name = "NAME")]
    pub category: Option<String>,

    /// Only messages containing this text (any case)
    #[arg(long, value_name = "TEXT")]
    pub search: Option<String>,

    /// First day to include (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub date_from: Option<String>,

    /// Last day to include (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub date_to: Option<String>,

    /// Messages per output file
    #[arg(long, value_name = "N")]
    pub chunk_size: Option<usize>,

    /// Optional columns: 1 attachments, 2 reactions, 3 reply to,
    /// 4 edited, 5 embeds, 6 pinned (e.g. "1,2,4")
    #[arg(long, value_name = "LIST")]
    pub data_options: Option<String>,

    /// Output format (csv, jsonl)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Disable the progress spinner
    #[arg(long)]
    pub no_progress: bool,

    /// Print process statistics after the run
    #[arg(long)]
    pub stats: bool,
}

impl ExportArgs {
    /// Label for output file names
    pub fn label(&self) -> String {
        self.label.clone().unwrap_or_else(|| {
            self.input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "export".to_string())
        })
    }

    /// Build the orchestrator request
    pub fn to_request(&self) -> ExportRequest {
        ExportRequest {
            actor: self.actor.clone(),
            label: self.label(),
            role: self.role.clone(),
            category: self.category.clone(),
            search: self.search.clone(),
            date_from: self.date_from.clone(),
            date_to: self.date_to.clone(),
            chunk_size: self.chunk_size,
            data_options: self.data_options.clone(),
        }
    }
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration with argument overrides applied
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Create a CLI interface from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file and merge with arguments
    ///
    /// # Arguments
    /// * `args` - Command-line arguments
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load(args.config_file.as_deref())?;
        Self::apply_args_to_config(&mut config, args);
        config.validate()?;
        Ok(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Path of the configuration file in use
    pub fn config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }

    /// Whether a progress spinner should be shown for `export`
    pub fn show_progress(&self, export: &ExportArgs) -> bool {
        !(self.args.quiet || export.no_progress)
    }

    /// Apply CLI arguments to configuration
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        Self::apply_logging_args(config, args);
        if let Commands::Export(ref export) = args.command {
            Self::apply_export_args(config, export);
        }
    }

    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    fn apply_export_args(config: &mut Config, export: &ExportArgs) {
        if let Some(chunk_size) = export.chunk_size {
            config.export.chunk_size = chunk_size;
        }
        if let Some(ref format) = export.format {
            config.export.format = Self::parse_export_format(format, config.export.format);
        }
    }

    /// Parse an output format name, keeping `fallback` for unknown names
    fn parse_export_format(name: &str, fallback: ExportFormat) -> ExportFormat {
        match name.to_lowercase().as_str() {
            "csv" => ExportFormat::Csv,
            "jsonl" | "json-lines" | "ndjson" => ExportFormat::JsonL,
            _ => {
                eprintln!("Warning: Unknown format '{}', using {}", name, fallback.extension());
                fallback
            }
        }
    }

    /// Handle the `config` subcommand
    ///
    /// # Returns
    /// * `Result<String>` - Text to print
    pub fn render_config(&self, path_only: bool) -> Result<String> {
        let path = self.config_path();
        if path_only {
            return Ok(path.display().to_string());
        }

        let source = if path.exists() {
            path.display().to_string()
        } else {
            format!("{} (not found, using defaults)", path.display())
        };
        Ok(format!(
            "# Configuration file: {}\n\n{}",
            source,
            self.config.to_toml()?
        ))
    }
}

/// Check that the output directory is usable
pub fn ensure_output_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}
