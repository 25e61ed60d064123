//! Sync command implementation

use anyhow::{bail, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::index::EmbeddingIndex;
use crate::ingest::discover;
use crate::store::MetadataStore;
use crate::sync::{CursorSet, SourceOutcome, SyncController};

pub fn run(config: &Config, full: bool, project: Option<&str>) -> Result<()> {
    let store_path = config.database_path();
    let store = MetadataStore::open(&store_path)?;
    let cursors = if full {
        CursorSet::default()
    } else {
        store.load_cursors()?
    };

    let root = config.sources_root();
    let project = project.or(config.sources.project.as_deref());
    let sources = discover(&root, project)?;
    if sources.is_empty() {
        println!("No transcripts found under {}.", root.display());
        return Ok(());
    }

    let index = Arc::new(EmbeddingIndex::open(&config.index_path())?);
    let embedder = create_embedder(&config.embedding)?;
    let controller = SyncController::new(
        config.sync.clone(),
        config.embedding.clone(),
        store_path,
        index,
        embedder,
    )
    .full(full);

    println!(
        "Syncing {} transcripts{}...",
        sources.len(),
        if full { " (full)" } else { "" }
    );

    let (cursors, summary) = super::runtime()?.block_on(async move {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping after in-flight work");
                let _ = cancel_tx.send(true);
            }
        });
        controller.run(sources, cursors, cancel_rx).await
    });

    let up_to_date = summary.count(|o| matches!(o, SourceOutcome::UpToDate { .. }));
    let changed = summary.count(|o| matches!(o, SourceOutcome::UpToDate { new_records } if *new_records > 0));
    let cancelled = summary.count(|o| matches!(o, SourceOutcome::Cancelled));
    let failed: Vec<_> = summary.failed().collect();

    println!(
        "✅ {} up to date ({} changed, {} new records), {} tracked",
        up_to_date,
        changed,
        summary.new_records(),
        cursors.len()
    );
    if cancelled > 0 {
        println!("⏸  {} cancelled; they resume from their last cursor next run", cancelled);
    }
    for (path, reason) in &failed {
        println!("❌ {}: {}", path.display(), reason);
    }

    if !failed.is_empty() {
        bail!("{} source(s) failed to sync", failed.len());
    }
    Ok(())
}
