//! Incremental sync controller
//!
//! For every source log: read from its cursor, commit the increment to
//! the metadata store, refresh the conversation's embedding, and only
//! then persist the new cursor. A crash anywhere before the last step
//! replays the increment on the next run, which the store absorbs
//! without duplication.

mod cursor;
mod state;

pub use cursor::{CursorSet, SyncCursor};
pub use state::{SourceState, SourceTracker};

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{EmbeddingConfig, SyncConfig};
use crate::embedding::{content_hash, document_text, embed_with_retry, Embedder};
use crate::error::{PipelineError, PipelineResult};
use crate::index::{EmbeddingIndex, IndexEntry};
use crate::ingest::{read_increment, SourceLog};
use crate::store::MetadataStore;

/// How one source ended a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    UpToDate { new_records: u64 },
    Failed { reason: String },
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    /// One entry per source, ordered by path
    pub outcomes: Vec<(PathBuf, SourceOutcome)>,
}

impl RunSummary {
    pub fn new_records(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|(_, o)| match o {
                SourceOutcome::UpToDate { new_records } => *new_records,
                _ => 0,
            })
            .sum()
    }

    pub fn failed(&self) -> impl Iterator<Item = (&PathBuf, &str)> {
        self.outcomes.iter().filter_map(|(path, o)| match o {
            SourceOutcome::Failed { reason } => Some((path, reason.as_str())),
            _ => None,
        })
    }

    pub fn count(&self, pred: impl Fn(&SourceOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Drives sources through ingest → store → index with bounded
/// concurrency. Cheap to clone; clones share locks and the index.
#[derive(Clone)]
pub struct SyncController {
    sync: SyncConfig,
    embedding: EmbeddingConfig,
    store_path: PathBuf,
    index: Arc<EmbeddingIndex>,
    embedder: Arc<dyn Embedder>,
    full: bool,
    locks: Arc<Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>>,
}

impl SyncController {
    /// The store at `store_path` must already have been opened once with
    /// [`MetadataStore::open`] so that its schema exists.
    pub fn new(
        sync: SyncConfig,
        embedding: EmbeddingConfig,
        store_path: PathBuf,
        index: Arc<EmbeddingIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            sync,
            embedding,
            store_path,
            index,
            embedder,
            full: false,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Replace each conversation's stored facts instead of appending.
    pub fn full(mut self, full: bool) -> Self {
        self.full = full;
        self
    }

    /// Sync every source and return the cursors as they now stand.
    ///
    /// Sources missing from `cursors` start at offset zero. A source that
    /// fails or is cancelled keeps its previous cursor.
    pub async fn run(
        &self,
        sources: Vec<SourceLog>,
        cursors: CursorSet,
        cancel: watch::Receiver<bool>,
    ) -> (CursorSet, RunSummary) {
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(run = %run_id, sources = sources.len(), workers = self.sync.workers, "sync started");

        let semaphore = Arc::new(Semaphore::new(self.sync.workers.max(1)));
        let mut tasks = JoinSet::new();

        for source in sources {
            let start = cursors.get(&source.path).copied();
            let controller = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let mut cancel = cancel.clone();

            tasks.spawn(async move {
                let path = source.path.clone();
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (path, SourceOutcome::Cancelled, None);
                };
                let lock = controller.lock_for(&path);
                let _guard = lock.lock().await;
                let (outcome, cursor) = controller.sync_source(&source, start, &mut cancel).await;
                (path, outcome, cursor)
            });
        }

        let mut cursors = cursors;
        let mut outcomes = vec![];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((path, outcome, cursor)) => {
                    if let Some(cursor) = cursor {
                        cursors.insert(path.clone(), cursor);
                    }
                    outcomes.push((path, outcome));
                }
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => warn!(error = %e, "sync task aborted"),
            }
        }
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));

        let summary = RunSummary { run_id, outcomes };
        info!(
            run = %summary.run_id,
            new_records = summary.new_records(),
            failed = summary.count(|o| matches!(o, SourceOutcome::Failed { .. })),
            cancelled = summary.count(|o| matches!(o, SourceOutcome::Cancelled)),
            "sync finished"
        );
        (cursors, summary)
    }

    /// Recompute every conversation's embedding and swap the index in
    /// one step. Returns the number of entries written.
    pub async fn rebuild_index(&self) -> Result<usize> {
        if !self.embedder.is_enabled() {
            bail!("embedding provider is disabled; nothing to rebuild");
        }

        let store_path = self.store_path.clone();
        let documents = run_blocking("load documents", self.sync.ingest_timeout(), move || {
            let store = MetadataStore::connect(&store_path)?;
            let mut docs = vec![];
            for id in store.all_conversation_ids()? {
                if let Some(doc) = store.embedding_document(&id)? {
                    docs.push(doc);
                }
            }
            Ok(docs)
        })
        .await?;

        let model = self.embedder.model_name().to_string();
        let mut entries = Vec::with_capacity(documents.len());
        for doc in documents {
            let text = document_text(&doc);
            if text.is_empty() {
                continue;
            }
            let vector = self.embed(text.clone()).await?;
            entries.push(IndexEntry {
                content_hash: content_hash(&model, &text),
                conversation_id: doc.conversation_id,
                model: model.clone(),
                vector,
                timestamp: doc.timestamp,
            });
        }

        let index = Arc::clone(&self.index);
        let count = run_blocking("index rebuild", self.sync.ingest_timeout(), move || {
            index.rebuild(entries)
        })
        .await?;
        Ok(count)
    }

    fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    /// Drive one source to `UpToDate`, `Failed` or `Cancelled`.
    async fn sync_source(
        &self,
        source: &SourceLog,
        start: Option<SyncCursor>,
        cancel: &mut watch::Receiver<bool>,
    ) -> (SourceOutcome, Option<SyncCursor>) {
        let mut tracker = SourceTracker::new(source.path.clone(), start.is_some());
        let start = start.unwrap_or_default();

        loop {
            if *cancel.borrow() {
                tracker.advance(SourceState::Cancelled);
                return (SourceOutcome::Cancelled, None);
            }

            tracker.advance(SourceState::Ingesting);
            let result = tokio::select! {
                result = self.attempt(source, start, &mut tracker) => result,
                Ok(_) = cancel.wait_for(|c| *c) => Err(PipelineError::Cancelled),
            };
            // The cursor write is not raced against cancellation: a cursor
            // that reaches the store is always one this run reports.
            let result = match result {
                Ok((cursor, new_records)) => self
                    .save_cursor(&source.path, start, cursor)
                    .await
                    .map(|()| (cursor, new_records)),
                Err(e) => Err(e),
            };

            match result {
                Ok((cursor, new_records)) => {
                    tracker.advance(SourceState::UpToDate);
                    return (SourceOutcome::UpToDate { new_records }, Some(cursor));
                }
                Err(PipelineError::Cancelled) => {
                    tracker.advance(SourceState::Cancelled);
                    return (SourceOutcome::Cancelled, None);
                }
                Err(e) => {
                    tracker.advance(SourceState::Failed);
                    let retries_left = tracker.attempts() <= self.sync.max_retries;
                    if !e.is_transient() || !retries_left {
                        warn!(
                            source = %source.path.display(),
                            attempt = tracker.attempts(),
                            error = %e,
                            "source failed"
                        );
                        return (SourceOutcome::Failed { reason: e.to_string() }, None);
                    }

                    let delay = self.sync.retry_backoff() * 2u32.pow((tracker.attempts() - 1).min(5));
                    warn!(
                        source = %source.path.display(),
                        attempt = tracker.attempts(),
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "transient failure, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        Ok(_) = cancel.wait_for(|c| *c) => {}
                    }
                }
            }
        }
    }

    /// One pass of ingest, store and index from `start`. Returns the
    /// cursor to persist and the number of records consumed.
    async fn attempt(
        &self,
        source: &SourceLog,
        start: SyncCursor,
        tracker: &mut SourceTracker,
    ) -> PipelineResult<(SyncCursor, u64)> {
        let store_path = self.store_path.clone();
        let src = source.clone();
        let full = self.full;
        let increment = run_blocking("ingest", self.sync.ingest_timeout(), move || {
            let mut increment = read_increment(&src, start.offset)?;
            if full && increment.start_offset == 0 {
                increment.reset = true;
            }
            if !increment.is_empty() {
                MetadataStore::connect(&store_path)?.apply_increment(&increment)?;
            }
            Ok(increment)
        })
        .await?;

        if !increment.is_empty() && self.embedder.is_enabled() {
            self.index_conversation(&increment.conversation_id, increment.reset)
                .await?;
        }
        tracker.advance(SourceState::Indexed);

        let cursor = SyncCursor {
            offset: increment.end_offset,
            records: if increment.reset {
                increment.records
            } else {
                start.records + increment.records
            },
            file_len: increment.file_len,
        };

        debug!(
            source = %source.path.display(),
            offset = cursor.offset,
            records = increment.records,
            skipped = increment.skipped.len(),
            "increment committed"
        );
        Ok((cursor, increment.records))
    }

    async fn save_cursor(&self, path: &Path, start: SyncCursor, cursor: SyncCursor) -> PipelineResult<()> {
        if cursor == start {
            return Ok(());
        }
        let store_path = self.store_path.clone();
        let path = path.to_path_buf();
        run_blocking("cursor", self.sync.ingest_timeout(), move || {
            MetadataStore::connect(&store_path)?.save_cursor(&path, &cursor)
        })
        .await
    }

    /// Refresh one conversation's embedding if its document changed.
    ///
    /// After a `reset` that left nothing to embed, the old vector is
    /// removed.
    async fn index_conversation(&self, conversation_id: &str, reset: bool) -> PipelineResult<()> {
        let store_path = self.store_path.clone();
        let id = conversation_id.to_string();
        let doc = run_blocking("load document", self.sync.ingest_timeout(), move || {
            MetadataStore::connect(&store_path)?.embedding_document(&id)
        })
        .await?;

        let text = doc.as_ref().map(document_text).unwrap_or_default();
        let Some(doc) = doc.filter(|_| !text.is_empty()) else {
            if reset {
                let index = Arc::clone(&self.index);
                let id = conversation_id.to_string();
                let removed = run_blocking("index", self.sync.ingest_timeout(), move || {
                    index.remove(&id)
                })
                .await?;
                if removed {
                    debug!(conversation = %conversation_id, "embedding removed");
                }
            }
            return Ok(());
        };

        let model = self.embedder.model_name().to_string();
        let hash = content_hash(&model, &text);
        if self.index.content_hash(&doc.conversation_id).as_deref() == Some(hash.as_str()) {
            debug!(conversation = %doc.conversation_id, "embedding unchanged");
            return Ok(());
        }

        let vector = self.embed(text).await?;
        let entry = IndexEntry {
            conversation_id: doc.conversation_id,
            model,
            content_hash: hash,
            vector,
            timestamp: doc.timestamp,
        };
        let index = Arc::clone(&self.index);
        run_blocking("index", self.sync.ingest_timeout(), move || {
            index.upsert_embedding(entry)
        })
        .await
    }

    async fn embed(&self, text: String) -> PipelineResult<Vec<f32>> {
        embed_with_retry(
            Arc::clone(&self.embedder),
            text,
            self.embedding.timeout(),
            self.embedding.max_retries,
            self.embedding.backoff(),
        )
        .await
    }
}

/// Run blocking work off the async workers, bounded by `limit`.
///
/// On timeout the blocking call keeps running to completion in the
/// background; callers must only rely on effects they observed.
pub(crate) async fn run_blocking<T, F>(stage: &'static str, limit: Duration, f: F) -> PipelineResult<T>
where
    F: FnOnce() -> PipelineResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(limit, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Ok(Err(_)) => Err(PipelineError::Cancelled),
        Err(_) => Err(PipelineError::Timeout {
            stage,
            secs: limit.as_secs(),
        }),
    }
}
