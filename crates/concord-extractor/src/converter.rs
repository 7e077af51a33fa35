//! Document conversion through the docling wrapper script

use crate::error::ExtractorError;
use concord_domain::traits::{ConversionOptions, ConvertedDocument, ConvertedTable, DocumentConverter};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Output of `<script> convert <file> <options_json>`
#[derive(Debug, Deserialize)]
struct WrapperOutput {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    markdown: String,
    #[serde(default)]
    tables: Vec<ConvertedTable>,
    #[serde(default)]
    pages: usize,
    #[serde(default)]
    error: Option<String>,
}

/// Output of `<script> --version`
#[derive(Debug, Deserialize)]
struct VersionOutput {
    #[serde(default)]
    docling_available: bool,
}

/// Converts documents by running the docling wrapper as a subprocess
///
/// The wrapper process is killed once it runs past the configured timeout.
#[derive(Debug, Clone)]
pub struct DoclingConverter {
    interpreter: String,
    script: PathBuf,
    timeout: Duration,
}

impl DoclingConverter {
    /// Create a converter that runs `python3 <script>`
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: "python3".to_string(),
            script: script.into(),
            timeout: Duration::from_secs(300),
        }
    }

    /// Use a different interpreter for the script
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Kill the wrapper when a single run exceeds `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The wrapper script path
    pub fn script(&self) -> &Path {
        &self.script
    }

    fn run(&self, args: &[&str]) -> Result<Vec<u8>, ExtractorError> {
        let mut child = Command::new(&self.interpreter)
            .arg(&self.script)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ExtractorError::UnavailableDependency(format!(
                    "failed to run {}: {}",
                    self.interpreter, e
                ))
            })?;

        // Both pipes are drained while the wrapper runs
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    if let Err(e) = child.kill() {
                        warn!(error = %e, "Failed to kill converter");
                    }
                    // Reap the process; the reader threads finish once its pipes close
                    let _ = child.wait();
                    return Err(ExtractorError::Timeout(format!(
                        "converter killed after {}ms",
                        self.timeout.as_millis()
                    )));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(ExtractorError::Conversion(format!(
                        "waiting for converter: {}",
                        e
                    )))
                }
            }
        };

        let stdout = stdout.join().unwrap_or_default();
        if !status.success() && stdout.is_empty() {
            let stderr = stderr.join().unwrap_or_default();
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(ExtractorError::Conversion(format!(
                "converter exited with {}: {}",
                status,
                stderr.trim()
            )));
        }
        Ok(stdout)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf) {
                debug!(error = %e, "Converter pipe closed early");
            }
        }
        buf
    })
}

impl DocumentConverter for DoclingConverter {
    type Error = ExtractorError;

    fn convert(&self, path: &Path, options: &ConversionOptions) -> Result<ConvertedDocument, Self::Error> {
        let options_json = serde_json::to_string(options)?;
        let file = path.to_string_lossy();
        debug!(file = %file, "Converting document");

        let stdout = self.run(&["convert", &file, &options_json])?;
        let output: WrapperOutput = serde_json::from_slice(&stdout)?;

        if !output.success {
            let reason = output.error.unwrap_or_else(|| "unknown error".to_string());
            if reason.to_lowercase().contains("not installed") {
                return Err(ExtractorError::UnavailableDependency(reason));
            }
            return Err(ExtractorError::Conversion(reason));
        }

        Ok(ConvertedDocument {
            text: output.markdown,
            tables: output.tables,
            page_count: output.pages,
        })
    }

    fn is_available(&self) -> bool {
        match self.run(&["--version"]) {
            Ok(stdout) => serde_json::from_slice::<VersionOutput>(&stdout)
                .map(|v| v.docling_available)
                .unwrap_or(false),
            Err(e) => {
                warn!(error = %e, "Docling probe failed");
                false
            }
        }
    }
}

/// A document converter shareable across tasks
pub type SharedConverter = Arc<dyn DocumentConverter<Error = ExtractorError> + Send + Sync>;

/// Runs a blocking converter off the async runtime with a time limit
#[derive(Clone)]
pub struct ConverterClient {
    converter: SharedConverter,
    timeout: Duration,
}

impl ConverterClient {
    /// Wrap a converter
    pub fn new(converter: SharedConverter, timeout: Duration) -> Self {
        Self { converter, timeout }
    }

    /// Cheap availability probe, run off the runtime
    pub async fn is_available(&self) -> bool {
        let converter = Arc::clone(&self.converter);
        tokio::task::spawn_blocking(move || converter.is_available())
            .await
            .unwrap_or(false)
    }

    /// Convert `path`, failing with `Timeout` when the limit is exceeded
    pub async fn convert(
        &self,
        path: &Path,
        options: ConversionOptions,
    ) -> Result<ConvertedDocument, ExtractorError> {
        let converter = Arc::clone(&self.converter);
        let path = path.to_path_buf();
        let task = tokio::task::spawn_blocking(move || converter.convert(&path, &options));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ExtractorError::Conversion(format!(
                "conversion task failed: {}",
                join_error
            ))),
            Err(_) => Err(ExtractorError::Timeout(format!(
                "conversion after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;

    fn script(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", body).unwrap();
        file
    }

    #[test]
    fn test_convert_parses_wrapper_output() {
        let file = script(
            r#"if [ "$1" = "convert" ]; then
echo '{"success": true, "markdown": "合同编号：CT-1", "tables": [{"markdown": "| a |", "rows": 1, "cols": 1}], "pages": 3, "images": []}'
fi"#,
        );
        let converter = DoclingConverter::new(file.path()).with_interpreter("sh");
        let doc = converter
            .convert(Path::new("contract.pdf"), &ConversionOptions::default())
            .unwrap();
        assert_eq!(doc.text, "合同编号：CT-1");
        assert_eq!(doc.page_count, 3);
        assert_eq!(doc.tables[0].cols, 1);
    }

    #[test]
    fn test_convert_failure_is_reported() {
        let file = script(r#"echo '{"success": false, "error": "File not found: x.pdf"}'"#);
        let converter = DoclingConverter::new(file.path()).with_interpreter("sh");
        let err = converter
            .convert(Path::new("x.pdf"), &ConversionOptions::default())
            .unwrap_err();
        assert_eq!(err, ExtractorError::Conversion("File not found: x.pdf".to_string()));
    }

    #[test]
    fn test_missing_docling_is_unavailable() {
        let file = script(
            r#"if [ "$1" = "--version" ]; then
echo '{"docling_available": false, "version": null}'
else
echo '{"success": false, "error": "Docling is not installed"}'
fi"#,
        );
        let converter = DoclingConverter::new(file.path()).with_interpreter("sh");
        assert!(!converter.is_available());
        let err = converter
            .convert(Path::new("x.pdf"), &ConversionOptions::default())
            .unwrap_err();
        assert!(matches!(err, ExtractorError::UnavailableDependency(_)));
    }

    #[test]
    fn test_missing_interpreter_is_unavailable() {
        let converter = DoclingConverter::new("wrapper.py").with_interpreter("concord-no-such-binary");
        assert!(!converter.is_available());
    }

    #[test]
    fn test_runaway_wrapper_is_killed() {
        let file = script("exec sleep 5");
        let converter = DoclingConverter::new(file.path())
            .with_interpreter("sh")
            .with_timeout(Duration::from_millis(100));

        let started = Instant::now();
        let err = converter
            .convert(Path::new("x.pdf"), &ConversionOptions::default())
            .unwrap_err();
        assert_eq!(err, ExtractorError::Timeout("converter killed after 100ms".to_string()));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_client_times_out() {
        let file = script("sleep 2");
        let converter: SharedConverter =
            Arc::new(DoclingConverter::new(file.path()).with_interpreter("sh"));
        let client = ConverterClient::new(converter, Duration::from_millis(100));
        let err = client
            .convert(Path::new("x.pdf"), ConversionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractorError::Timeout(_)));
    }
}
