//! Command implementations.

pub mod chunk;
pub mod config;
pub mod extract;
pub mod topics;

pub use self::chunk::execute_chunk;
pub use self::config::execute_config;
pub use self::extract::execute_extract;
pub use self::topics::execute_topics;

use crate::error::{CliError, Result};
use concord_domain::traits::ConversionOptions;
use concord_extractor::SharedConverter;
use std::fs;
use std::path::Path;
use tracing::info;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

/// True for files read directly as text.
pub fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Read a document as text, converting non-text formats when a converter is configured.
pub fn read_document(path: &Path, converter: Option<&SharedConverter>) -> Result<String> {
    if is_text_file(path) {
        return Ok(fs::read_to_string(path)?);
    }

    let converter = converter.ok_or_else(|| {
        CliError::InvalidInput(format!(
            "{}: only text and markdown files can be read without a converter script",
            path.display()
        ))
    })?;
    if !converter.is_available() {
        return Err(CliError::InvalidInput(format!(
            "{}: the document converter is not available",
            path.display()
        )));
    }

    let document = converter.convert(path, &ConversionOptions::default())?;
    info!(file = %path.display(), pages = document.page_count, "Converted document");
    Ok(document.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_text_files_are_read_directly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("contract.MD");
        fs::write(&path, "合同编号：CT-001").unwrap();

        assert!(is_text_file(&path));
        assert_eq!(read_document(&path, None).unwrap(), "合同编号：CT-001");
    }

    #[test]
    fn test_other_formats_need_a_converter() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("contract.pdf");
        fs::write(&path, b"%PDF").unwrap();

        assert!(!is_text_file(&path));
        assert!(matches!(read_document(&path, None), Err(CliError::InvalidInput(_))));
    }
}
