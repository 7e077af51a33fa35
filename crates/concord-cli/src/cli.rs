//! CLI command definitions and argument parsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Concord CLI - Extract structured fields from contracts.
#[derive(Debug, Parser)]
#[command(name = "concord")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<CliFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "CONCORD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliFormat {
    /// Table format (default)
    Table,
    /// JSON format
    Json,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Extract contract fields from a document
    Extract(ExtractArgs),

    /// Show how a document is chunked
    Chunk(ChunkArgs),

    /// List the extraction topics and their fields
    Topics,

    /// Show or initialize the configuration file
    Config(ConfigArgs),
}

/// Arguments for the extract command.
#[derive(Debug, Parser)]
pub struct ExtractArgs {
    /// Document to extract from (text or markdown; other formats need the converter)
    pub file: PathBuf,

    /// Strategy to run (repeatable); all available when omitted
    #[arg(short, long = "strategy")]
    pub strategies: Vec<String>,

    /// Topic to extract (repeatable); all topics when omitted
    #[arg(short, long = "topic")]
    pub topics: Vec<String>,

    /// Validate and correct each topic through the model
    #[arg(long)]
    pub retry: bool,

    /// Skip topics that do not fit the classified contract type
    #[arg(long)]
    pub narrow: bool,

    /// Ask the model to settle conflicting fields
    #[arg(long)]
    pub resolve: bool,

    /// Run without the model, even when one is configured
    #[arg(long)]
    pub offline: bool,
}

/// Arguments for the chunk command.
#[derive(Debug, Parser)]
pub struct ChunkArgs {
    /// Document to chunk
    pub file: PathBuf,

    /// Print chunk text as well
    #[arg(long)]
    pub text: bool,
}

/// Arguments for configuration management.
#[derive(Debug, Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl From<CliFormat> for crate::config::OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Table => crate::config::OutputFormat::Table,
            CliFormat::Json => crate::config::OutputFormat::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_command() {
        let cli = Cli::parse_from([
            "concord", "extract", "contract.md", "-s", "pattern", "-s", "rag", "-t", "financial",
            "--retry", "--format", "json",
        ]);
        match cli.command {
            Command::Extract(args) => {
                assert_eq!(args.file, PathBuf::from("contract.md"));
                assert_eq!(args.strategies, vec!["pattern", "rag"]);
                assert_eq!(args.topics, vec!["financial"]);
                assert!(args.retry);
                assert!(!args.narrow);
            }
            _ => panic!("Expected Extract command"),
        }
        assert_eq!(cli.format, Some(CliFormat::Json));
    }

    #[test]
    fn test_config_init_command() {
        let cli = Cli::parse_from(["concord", "config", "init", "--force"]);
        assert!(matches!(
            cli.command,
            Command::Config(ConfigArgs {
                action: ConfigAction::Init { force: true }
            })
        ));
    }

    #[test]
    fn test_command_is_required() {
        assert!(Cli::try_parse_from(["concord"]).is_err());
    }
}
