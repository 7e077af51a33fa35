//! Chunk command implementation.

use super::read_document;
use crate::cli::ChunkArgs;
use crate::config::Config;
use crate::error::Result;
use crate::output::Formatter;
use concord_extractor::{Chunker, DoclingConverter, SharedConverter};
use std::sync::Arc;

/// Execute the chunk command.
pub fn execute_chunk(args: ChunkArgs, config: &Config, formatter: &Formatter) -> Result<()> {
    let converter: Option<SharedConverter> = config.converter.script.as_ref().map(|script| {
        let converter = DoclingConverter::new(script)
            .with_interpreter(&config.converter.interpreter)
            .with_timeout(config.extractor.strategy_timeout());
        Arc::new(converter) as SharedConverter
    });
    let text = read_document(&args.file, converter.as_ref())?;

    let chunks = Chunker::new(config.extractor.chunker.clone()).chunk(&text);
    println!("{}", formatter.format_chunks(&chunks, args.text)?);
    Ok(())
}
