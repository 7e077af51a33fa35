//! Concord CLI - Contract field extraction from the command line.

use clap::Parser;
use concord_cli::commands;
use concord_cli::{Cli, Command, Config, Formatter};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    // Initialize tracing (log to stderr)
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> concord_cli::Result<()> {
    let path = Config::resolve_path(cli.config.as_deref())?;
    let config = Config::load_from(&path)?;

    let format = cli
        .format
        .map(Into::into)
        .unwrap_or(config.settings.format);
    let color_enabled = !cli.no_color && config.settings.color;
    let formatter = Formatter::new(format, color_enabled);

    match cli.command {
        Command::Extract(args) => {
            // Blocking model clients are built and dropped outside the runtime
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            commands::execute_extract(args, &config, &formatter, &runtime)?;
        }
        Command::Chunk(args) => commands::execute_chunk(args, &config, &formatter)?,
        Command::Topics => commands::execute_topics(&formatter)?,
        Command::Config(args) => commands::execute_config(args, &config, &path, &formatter)?,
    }

    Ok(())
}
