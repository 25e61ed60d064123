//! End-to-end checks of ingest → store → index → report through the
//! public API.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use convo_insights::config::{EmbeddingConfig, SyncConfig};
use convo_insights::embedding::{document_text, Embedder, HashingEmbedder};
use convo_insights::ingest::{discover, read_increment, SourceLog};
use convo_insights::report::{renderer_for, ReportData, ReportFormat, ReportKind, TimeWindow};
use convo_insights::store::FileHotspot;
use convo_insights::sync::SourceOutcome;
use convo_insights::{CursorSet, EmbeddingIndex, MetadataStore, SyncController};
use tempfile::TempDir;
use tokio::sync::watch;

fn user(ts: &str, text: &str) -> String {
    serde_json::json!({
        "type": "user",
        "timestamp": ts,
        "cwd": "/work/app",
        "message": {"role": "user", "content": text}
    })
    .to_string()
}

fn assistant_tools(ts: &str, tools: &[(&str, &str)]) -> String {
    let mut content = vec![serde_json::json!({"type": "text", "text": "On it"})];
    for (i, (name, path)) in tools.iter().enumerate() {
        content.push(serde_json::json!({
            "type": "tool_use",
            "id": format!("t{}", i),
            "name": name,
            "input": {"file_path": path}
        }));
    }
    serde_json::json!({
        "type": "assistant",
        "timestamp": ts,
        "message": {"role": "assistant", "content": content}
    })
    .to_string()
}

struct Workspace {
    dir: TempDir,
    store_path: PathBuf,
    index: Arc<EmbeddingIndex>,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store_path = dir.path().join("insights.db");
        MetadataStore::open(&store_path).unwrap();
        let index = Arc::new(EmbeddingIndex::open(&dir.path().join("embeddings.db")).unwrap());
        Self {
            dir,
            store_path,
            index,
        }
    }

    fn root(&self) -> PathBuf {
        self.dir.path().join("projects")
    }

    fn write_log(&self, name: &str, lines: &[String]) -> PathBuf {
        let dir = self.root().join("-work-app");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
        path
    }

    fn controller(&self, workers: usize) -> SyncController {
        let sync = SyncConfig {
            workers,
            retry_backoff_ms: 1,
            ..SyncConfig::default()
        };
        let embedding = EmbeddingConfig {
            dims: 64,
            backoff_ms: 1,
            ..EmbeddingConfig::default()
        };
        SyncController::new(
            sync,
            embedding,
            self.store_path.clone(),
            Arc::clone(&self.index),
            embedder(),
        )
    }

    fn store(&self) -> MetadataStore {
        MetadataStore::open(&self.store_path).unwrap()
    }

    async fn sync(&self, workers: usize, cursors: CursorSet) -> CursorSet {
        let sources = discover(&self.root(), None).unwrap();
        let (cursors, summary) = self
            .controller(workers)
            .run(sources, cursors, not_cancelled())
            .await;
        assert_eq!(summary.failed().count(), 0);
        // The controller persists each cursor after its facts are committed
        assert_eq!(self.store().load_cursors().unwrap(), cursors);
        cursors
    }
}

fn embedder() -> Arc<dyn Embedder> {
    Arc::new(HashingEmbedder::new(64).unwrap())
}

fn not_cancelled() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    std::mem::forget(tx);
    rx
}

fn all_time() -> TimeWindow {
    TimeWindow::default()
}

fn populate(ws: &Workspace, sessions: usize) {
    for i in 0..sessions {
        let day = format!("2026-02-{:02}", i + 1);
        ws.write_log(
            &format!("session-{}.jsonl", i),
            &[
                user(&format!("{}T09:00:00Z", day), "add tests for the parser"),
                assistant_tools(
                    &format!("{}T09:01:00Z", day),
                    &[("Read", "src/parser.rs"), ("Edit", "src/parser.rs")],
                ),
                user(&format!("{}T09:05:00Z", day), "now fix the docker build"),
                assistant_tools(&format!("{}T09:06:00Z", day), &[("Write", "Dockerfile")]),
            ],
        );
    }
}

fn hotspot_paths(store: &MetadataStore) -> Vec<(String, i64)> {
    store
        .query_file_hotspots(&all_time(), 10)
        .unwrap()
        .into_iter()
        .map(|h| (h.path, h.count))
        .collect()
}

#[tokio::test]
async fn hotspots_rank_files_by_touches() {
    let ws = Workspace::new();
    ws.write_log(
        "s1.jsonl",
        &[
            user("2026-03-02T09:00:00Z", "update the entry points"),
            assistant_tools(
                "2026-03-02T09:01:00Z",
                &[("Write", "a.ts"), ("Write", "a.ts"), ("Read", "b.ts")],
            ),
        ],
    );
    ws.sync(2, CursorSet::default()).await;

    let hotspots = ws.store().query_file_hotspots(&all_time(), 10).unwrap();
    assert_eq!(
        hotspots,
        vec![
            FileHotspot {
                path: "a.ts".into(),
                count: 2,
                reads: 0,
                writes: 2,
                edits: 0,
                conversations: 1,
            },
            FileHotspot {
                path: "b.ts".into(),
                count: 1,
                reads: 1,
                writes: 0,
                edits: 0,
                conversations: 1,
            },
        ]
    );
}

#[tokio::test]
async fn resync_without_changes_is_idempotent() {
    let ws = Workspace::new();
    populate(&ws, 3);

    let cursors = ws.sync(2, CursorSet::default()).await;
    let counts = ws.store().counts().unwrap();
    let hotspots = hotspot_paths(&ws.store());

    let again = ws.sync(2, cursors.clone()).await;
    assert_eq!(again, cursors);
    assert_eq!(ws.store().counts().unwrap(), counts);
    assert_eq!(hotspot_paths(&ws.store()), hotspots);
    assert_eq!(ws.index.len(), 3);
}

#[tokio::test]
async fn replay_after_crash_before_cursor_commit() {
    let ws = Workspace::new();
    let path = ws.write_log(
        "s1.jsonl",
        &[
            user("2026-03-02T09:00:00Z", "refactor the cache layer"),
            assistant_tools("2026-03-02T09:01:00Z", &[("Edit", "src/cache.rs")]),
        ],
    );

    // Facts reach the store but the process dies before the cursor is saved
    let source = SourceLog::new(path.clone());
    let increment = read_increment(&source, 0).unwrap();
    ws.store().apply_increment(&increment).unwrap();
    assert!(ws.store().load_cursors().unwrap().is_empty());

    let cursors = ws.sync(1, CursorSet::default()).await;
    assert_eq!(cursors.position(&path).records, 2);

    let counts = ws.store().counts().unwrap();
    assert_eq!(counts.conversations, 1);
    assert_eq!(counts.messages, 2);
    assert_eq!(counts.tool_uses, 1);
    assert_eq!(hotspot_paths(&ws.store()), vec![("src/cache.rs".to_string(), 1)]);
}

#[tokio::test]
async fn concurrent_and_sequential_syncs_agree() {
    let sequential = Workspace::new();
    let concurrent = Workspace::new();
    populate(&sequential, 6);
    populate(&concurrent, 6);

    sequential.sync(1, CursorSet::default()).await;
    concurrent.sync(4, CursorSet::default()).await;

    let a = sequential.store();
    let b = concurrent.store();
    assert_eq!(a.counts().unwrap(), b.counts().unwrap());
    assert_eq!(hotspot_paths(&a), hotspot_paths(&b));
    assert_eq!(
        a.query_tool_usage_breakdown(&all_time()).unwrap(),
        b.query_tool_usage_breakdown(&all_time()).unwrap()
    );
    assert_eq!(
        a.query_activity_timeline(&all_time()).unwrap(),
        b.query_activity_timeline(&all_time()).unwrap()
    );
    assert_eq!(sequential.index.len(), concurrent.index.len());
}

#[tokio::test]
async fn conversation_is_most_similar_to_itself() {
    let ws = Workspace::new();
    let path = ws.write_log(
        "s1.jsonl",
        &[
            user("2026-03-02T09:00:00Z", "why does the websocket reconnect loop"),
            assistant_tools("2026-03-02T09:01:00Z", &[("Read", "src/ws.rs")]),
        ],
    );
    ws.sync(1, CursorSet::default()).await;

    let id = SourceLog::new(path).conversation_id();
    let doc = ws.store().embedding_document(&id).unwrap().unwrap();
    let vector = embedder().embed(&document_text(&doc)).unwrap();

    let hits = ws.index.query_similar(&vector, 5);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].conversation_id, id);
    assert!((hits[0].similarity - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn window_without_activity_reports_zeros() {
    let ws = Workspace::new();
    populate(&ws, 2);
    ws.sync(2, CursorSet::default()).await;

    let window = TimeWindow::parse(Some("2020-01-01"), Some("2020-02-01")).unwrap();
    let data = ReportData::collect(&ws.store(), ReportKind::Overview, &window, 10).unwrap();
    assert!(data.is_empty());
    assert_eq!(data.overview.conversations, 0);
    assert!(data.file_hotspots.is_empty());

    for format in [
        ReportFormat::Structured,
        ReportFormat::Tabular,
        ReportFormat::Standalone,
        ReportFormat::Narrative,
    ] {
        let out = renderer_for(format).render(&data).unwrap();
        assert!(!out.is_empty());
    }
}

#[tokio::test]
async fn aggregates_are_deterministic() {
    let ws = Workspace::new();
    populate(&ws, 4);
    ws.sync(4, CursorSet::default()).await;

    let store = ws.store();
    // Equal touch counts fall back to path order
    assert_eq!(
        hotspot_paths(&store),
        vec![
            ("src/parser.rs".to_string(), 8),
            ("Dockerfile".to_string(), 4),
        ]
    );
    let first = ReportData::collect(&store, ReportKind::Overview, &all_time(), 10).unwrap();
    let second = ReportData::collect(&store, ReportKind::Overview, &all_time(), 10).unwrap();
    assert_eq!(first.topics, second.topics);
    assert_eq!(first.weekdays, second.weekdays);
    assert_eq!(
        renderer_for(ReportFormat::Tabular).render(&first).unwrap(),
        renderer_for(ReportFormat::Tabular).render(&second).unwrap()
    );
}

#[tokio::test]
async fn outcomes_are_reported_per_source() {
    let ws = Workspace::new();
    populate(&ws, 2);
    ws.write_log("broken.jsonl", &["{not json".to_string(), "[1,2]".to_string()]);

    let sources = discover(&ws.root(), None).unwrap();
    assert_eq!(sources.len(), 3);
    let (_, summary) = ws
        .controller(2)
        .run(sources, CursorSet::default(), not_cancelled())
        .await;

    let paths: Vec<&Path> = summary.outcomes.iter().map(|(p, _)| p.as_path()).collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);
    assert_eq!(
        summary
            .outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SourceOutcome::UpToDate { new_records: 4 }))
            .count(),
        2
    );
}
