//! Index command implementations

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::index::EmbeddingIndex;
use crate::store::MetadataStore;
use crate::sync::SyncController;

/// Re-embed every conversation and replace the index in one swap
pub fn rebuild(config: &Config) -> Result<()> {
    let store_path = config.database_path();
    MetadataStore::open(&store_path)?;

    let index = Arc::new(EmbeddingIndex::open(&config.index_path())?);
    let embedder = create_embedder(&config.embedding)?;
    let model = embedder.model_name().to_string();
    let controller = SyncController::new(
        config.sync.clone(),
        config.embedding.clone(),
        store_path,
        index,
        embedder,
    );

    println!("Rebuilding embedding index with {}...", model);
    let count = super::runtime()?.block_on(controller.rebuild_index())?;
    println!("✅ Indexed {} conversations", count);
    Ok(())
}

pub fn stats(config: &Config) -> Result<()> {
    let index = EmbeddingIndex::open(&config.index_path())?;
    let stats = index.stats();

    println!("Index: {}", stats.path.display());
    println!("Entries: {}", stats.entries);
    if stats.models.is_empty() {
        println!("No embeddings yet. Run 'insights sync' first.");
        return Ok(());
    }

    println!("\n{:<30} {:<8} {}", "Model", "Dims", "Entries");
    println!("{}", "-".repeat(50));
    for (model, dims, count) in &stats.models {
        println!("{:<30} {:<8} {}", model, dims, count);
    }

    if let Ok(store) = MetadataStore::open_read_only(&config.database_path()) {
        let conversations = store.counts()?.conversations as usize;
        if conversations > stats.entries {
            println!(
                "\n{} conversations have no embedding.",
                conversations - stats.entries
            );
        }
    }
    Ok(())
}
