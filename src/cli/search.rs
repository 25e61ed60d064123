//! Search command implementation

use anyhow::Result;

use crate::config::Config;
use crate::embedding::{create_embedder, DisabledEmbedder, Embedder};
use crate::index::EmbeddingIndex;
use crate::search::{format_results, OutputFormat, SearchQuery, Searcher};
use crate::store::MetadataStore;
use std::sync::Arc;

pub fn run(config: &Config, query: SearchQuery, format: OutputFormat) -> Result<()> {
    let store = MetadataStore::open_read_only(&config.database_path())?;
    let index = EmbeddingIndex::open(&config.index_path())?;

    // Keyword, file and tool searches never touch the embedder
    let embedder: Arc<dyn Embedder> = if query.keyword || query.text.is_none() {
        Arc::new(DisabledEmbedder)
    } else {
        create_embedder(&config.embedding)?
    };

    if embedder.is_enabled() && index.is_empty() {
        println!("Embedding index is empty. Run 'insights sync' or 'insights index rebuild' first.");
        return Ok(());
    }

    let hits = Searcher::new(&store, &index, embedder).run(&query)?;
    println!("{}", format_results(&hits, format)?);
    Ok(())
}
