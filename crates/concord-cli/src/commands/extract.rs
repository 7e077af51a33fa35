//! Extract command implementation.

use super::{is_text_file, read_document};
use crate::cli::ExtractArgs;
use crate::config::Config;
use crate::error::Result;
use crate::output::Formatter;
use concord_extractor::{
    DoclingConverter, ExtractionRequest, Extractor, Resolution, SharedConverter,
};
use concord_gatekeeper::AbortSignal;
use concord_llm::{ModelClient, ModelService, OllamaProvider};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{info, warn};

/// Execute the extract command.
///
/// Must run outside the runtime: the model client is blocking and is built
/// and dropped here.
pub fn execute_extract(
    args: ExtractArgs,
    config: &Config,
    formatter: &Formatter,
    runtime: &Runtime,
) -> Result<()> {
    let converter = build_converter(config);
    let text = read_document(&args.file, converter.as_ref())?;

    let model = if args.offline { None } else { build_model(config) };
    if model.is_none() && (args.retry || args.resolve) {
        eprintln!(
            "{}",
            formatter.warning("No model available: --retry and --resolve have no effect")
        );
    }

    let extractor = Extractor::new(config.extractor.clone(), model, converter)?;
    let request = build_request(&args, text);

    let (handle, signal) = AbortSignal::new();
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.abort();
        }
    });

    let outcome = runtime.block_on(extractor.extract(request.with_abort(signal)))?;
    println!("{}", formatter.format_outcome(&outcome, extractor.registry())?);
    Ok(())
}

fn build_request(args: &ExtractArgs, text: String) -> ExtractionRequest {
    let mut request = ExtractionRequest::new(text).with_validation_retry(args.retry);
    if !args.strategies.is_empty() {
        request = request.with_strategies(args.strategies.iter().cloned());
    }
    if !args.topics.is_empty() {
        request = request.with_topics(args.topics.iter().cloned());
    }
    if args.narrow {
        request = request.with_narrowing(true);
    }
    if args.resolve {
        request = request.with_resolution(Resolution::Llm);
    }
    if !is_text_file(&args.file) {
        request = request.with_file_path(args.file.clone());
    }
    request
}

/// Connect to the configured Ollama model, or `None` when it is disabled or unreachable.
fn build_model(config: &Config) -> Option<Arc<dyn ModelService>> {
    if !config.model.enabled {
        return None;
    }
    let provider = OllamaProvider::new(&config.model.endpoint, &config.model.name)
        .with_max_retries(config.model.max_retries);
    match provider.ping() {
        Ok(()) => {
            info!(endpoint = %config.model.endpoint, model = %config.model.name, "Model connected");
            Some(Arc::new(ModelClient::new(provider)) as Arc<dyn ModelService>)
        }
        Err(e) => {
            warn!(error = %e, "Model unavailable, running local strategies only");
            None
        }
    }
}

fn build_converter(config: &Config) -> Option<SharedConverter> {
    let script = config.converter.script.as_ref()?;
    let converter = DoclingConverter::new(script)
        .with_interpreter(&config.converter.interpreter)
        .with_timeout(config.extractor.strategy_timeout());
    Some(Arc::new(converter) as SharedConverter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args(file: &str) -> ExtractArgs {
        ExtractArgs {
            file: PathBuf::from(file),
            strategies: vec![],
            topics: vec![],
            retry: false,
            narrow: false,
            resolve: false,
            offline: true,
        }
    }

    #[test]
    fn test_request_defaults() {
        let request = build_request(&args("contract.md"), "text".to_string());
        assert!(request.strategies.is_none());
        assert!(request.topics.is_none());
        assert!(request.narrow_by_contract_type.is_none());
        assert!(request.resolution.is_none());
        assert!(request.file_path.is_none());
    }

    #[test]
    fn test_request_from_flags() {
        let mut args = args("contract.pdf");
        args.strategies = vec!["pattern".into()];
        args.topics = vec!["financial".into()];
        args.retry = true;
        args.narrow = true;
        args.resolve = true;

        let request = build_request(&args, "text".to_string());
        assert_eq!(request.strategies.unwrap(), vec!["pattern"]);
        assert_eq!(request.topics.unwrap(), vec!["financial"]);
        assert!(request.enable_validation_retry);
        assert_eq!(request.narrow_by_contract_type, Some(true));
        assert_eq!(request.resolution, Some(Resolution::Llm));
        assert_eq!(request.file_path, Some(PathBuf::from("contract.pdf")));
    }

    #[test]
    fn test_disabled_model_is_not_built() {
        let mut config = Config::default();
        config.model.enabled = false;
        assert!(build_model(&config).is_none());
        assert!(build_converter(&config).is_none());
    }
}
