//! Config command implementation.

use crate::cli::{ConfigAction, ConfigArgs};
use crate::config::{Config, OutputFormat};
use crate::error::{CliError, Result};
use crate::output::Formatter;
use std::path::Path;

/// Execute the config command.
pub fn execute_config(
    args: ConfigArgs,
    config: &Config,
    path: &Path,
    formatter: &Formatter,
) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            if formatter.format() == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("{}", formatter.info(&format!("Config file: {}", path.display())));
                println!("{}", config.to_toml()?);
            }
        }
        ConfigAction::Init { force } => {
            init(path, force)?;
            println!("{}", formatter.success(&format!("Wrote {}", path.display())));
        }
    }
    Ok(())
}

/// Write a default configuration to `path`.
fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(CliError::InvalidInput(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    Config::default().save_to(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        init(&path, false).unwrap();
        assert!(path.exists());
        assert!(matches!(init(&path, false), Err(CliError::InvalidInput(_))));
        init(&path, true).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert!(loaded.model.enabled);
    }
}
