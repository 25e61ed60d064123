//! Conversation search: semantic, keyword, by file and by tool

use anyhow::{anyhow, bail, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::embedding::Embedder;
use crate::index::EmbeddingIndex;
use crate::report::TimeWindow;
use crate::store::{ConversationRow, MetadataStore};

/// Over-fetch factor for semantic queries that are filtered afterwards
const FILTER_OVERFETCH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Markdown,
}

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub text: Option<String>,
    /// Keyword matching instead of embeddings
    pub keyword: bool,
    pub file: Option<String>,
    pub tool: Option<String>,
    pub window: TimeWindow,
    pub limit: usize,
}

/// A matching conversation with its related facts
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub conversation: ConversationRow,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    pub topics: Vec<String>,
    pub files: Vec<String>,
    pub tools: Vec<String>,
}

pub struct Searcher<'a> {
    store: &'a MetadataStore,
    index: &'a EmbeddingIndex,
    embedder: Arc<dyn Embedder>,
}

impl<'a> Searcher<'a> {
    pub fn new(store: &'a MetadataStore, index: &'a EmbeddingIndex, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            index,
            embedder,
        }
    }

    /// Dispatch on which parts of the query are set: a tool wins, then
    /// text (semantic unless `keyword`), then a bare file pattern.
    pub fn run(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        let limit = query.limit.max(1);
        if let Some(ref tool) = query.tool {
            return self.by_tool(tool, limit);
        }
        match (query.text.as_deref(), query.file.as_deref()) {
            (Some(text), file) if !query.keyword => {
                self.semantic(text, &query.window, file, limit)
            }
            (Some(text), file) => self.keyword(text, &query.window, file, limit),
            (None, Some(file)) => self.by_file(file, limit),
            (None, None) => bail!("Provide a query, --file or --tool"),
        }
    }

    /// Nearest conversations to `text` in embedding space, optionally
    /// restricted to a time window and a file pattern.
    pub fn semantic(
        &self,
        text: &str,
        window: &TimeWindow,
        file: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        if !self.embedder.is_enabled() {
            bail!("Semantic search needs an embedding provider; use --keyword");
        }
        let vector = self
            .embedder
            .embed(text)
            .map_err(|e| anyhow!("Failed to embed query: {}", e))?;

        let filtered = file.is_some() || *window != TimeWindow::default();
        let k = if filtered { limit * FILTER_OVERFETCH } else { limit };
        let similar = self.index.query_similar(&vector, k);
        debug!(query = text, candidates = similar.len(), "semantic search");

        let mut hits = vec![];
        for candidate in similar {
            let Some(conversation) = self.store.get_conversation(&candidate.conversation_id)? else {
                continue;
            };
            if let Some(ts) = conversation.last_activity() {
                if !window.contains(&ts) {
                    continue;
                }
            }
            let mut hit = self.enrich(conversation)?;
            if let Some(pattern) = file {
                if !hit.files.iter().any(|f| f.contains(pattern)) {
                    continue;
                }
            }
            hit.similarity = Some(candidate.similarity);
            hits.push(hit);
            if hits.len() == limit {
                break;
            }
        }
        Ok(hits)
    }

    pub fn keyword(
        &self,
        text: &str,
        window: &TimeWindow,
        file: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let fetch = if file.is_some() { limit * FILTER_OVERFETCH } else { limit };
        let mut hits = vec![];
        for conversation in self.store.keyword_search(text, window, fetch)? {
            let hit = self.enrich(conversation)?;
            if let Some(pattern) = file {
                if !hit.files.iter().any(|f| f.contains(pattern)) {
                    continue;
                }
            }
            hits.push(hit);
            if hits.len() == limit {
                break;
            }
        }
        Ok(hits)
    }

    pub fn by_file(&self, pattern: &str, limit: usize) -> Result<Vec<SearchHit>> {
        self.store
            .conversations_by_file(pattern, limit)?
            .into_iter()
            .map(|c| self.enrich(c))
            .collect()
    }

    pub fn by_tool(&self, name: &str, limit: usize) -> Result<Vec<SearchHit>> {
        self.store
            .conversations_by_tool(name, limit)?
            .into_iter()
            .map(|c| self.enrich(c))
            .collect()
    }

    fn enrich(&self, conversation: ConversationRow) -> Result<SearchHit> {
        Ok(SearchHit {
            topics: self.store.conversation_topics(&conversation.id)?,
            files: self.store.conversation_files(&conversation.id)?,
            tools: self.store.conversation_tools(&conversation.id)?,
            similarity: None,
            conversation,
        })
    }
}

pub fn format_results(hits: &[SearchHit], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(hits)?),
        OutputFormat::Markdown => Ok(format_markdown(hits)),
        OutputFormat::Text => Ok(format_text(hits)),
    }
}

fn format_text(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No matching conversations.".to_string();
    }

    let mut out = vec![format!("Found {} conversations:\n", hits.len())];
    for (i, hit) in hits.iter().enumerate() {
        let c = &hit.conversation;
        out.push(format!("{}. {}{}", i + 1, similarity_prefix(hit), c.id));
        out.push(format!("   Date: {}", c.started_at.as_deref().unwrap_or("-")));
        out.push(format!("   Messages: {}", c.message_count));
        if !hit.topics.is_empty() {
            out.push(format!("   Topics: {}", first_n(&hit.topics, 3)));
        }
        if !hit.files.is_empty() {
            out.push(format!("   Files: {}", first_n(&hit.files, 3)));
        }
        if let Some(ref msg) = c.first_user_message {
            out.push(format!("   Preview: {}", preview(msg, 100)));
        }
        out.push(String::new());
    }
    out.join("\n")
}

fn format_markdown(hits: &[SearchHit]) -> String {
    let mut out = vec![format!("# Search Results ({} found)\n", hits.len())];
    for (i, hit) in hits.iter().enumerate() {
        let c = &hit.conversation;
        out.push(format!("## {}. {}{}", i + 1, similarity_prefix(hit), c.id));
        out.push(format!("**Date:** {}", c.started_at.as_deref().unwrap_or("-")));
        out.push(format!("**Messages:** {}", c.message_count));
        if let Some(ref project) = c.project_path {
            out.push(format!("**Project:** {}", project));
        }
        if !hit.topics.is_empty() {
            out.push(format!("**Topics:** {}", hit.topics.join(", ")));
        }
        if !hit.files.is_empty() {
            out.push(format!("**Files:** {}", first_n(&hit.files, 5)));
            if hit.files.len() > 5 {
                out.push(format!("  _(and {} more)_", hit.files.len() - 5));
            }
        }
        if !hit.tools.is_empty() {
            out.push(format!("**Tools:** {}", first_n(&hit.tools, 5)));
        }
        if let Some(ref msg) = c.first_user_message {
            out.push(format!("\n**Snippet:** {}", preview(msg, 200)));
        }
        out.push(String::new());
    }
    out.join("\n")
}

fn similarity_prefix(hit: &SearchHit) -> String {
    hit.similarity
        .map(|s| format!("[Similarity: {:.3}] ", s))
        .unwrap_or_default()
}

fn first_n(items: &[String], n: usize) -> String {
    items.iter().take(n).cloned().collect::<Vec<_>>().join(", ")
}

fn preview(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or(text);
    let short = crate::ingest::truncate_chars(line, max);
    if short.len() < text.len() {
        format!("{}...", short)
    } else {
        short
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{content_hash, document_text, HashingEmbedder};
    use crate::index::IndexEntry;
    use crate::store::tests::{sample_increment, temp_store};
    use tempfile::TempDir;

    fn indexed(store: &MetadataStore, embedder: &dyn Embedder) -> (TempDir, EmbeddingIndex) {
        let dir = TempDir::new().unwrap();
        let index = EmbeddingIndex::open(&dir.path().join("embeddings.db")).unwrap();
        for id in store.all_conversation_ids().unwrap() {
            let doc = store.embedding_document(&id).unwrap().unwrap();
            let text = document_text(&doc);
            index
                .upsert_embedding(IndexEntry {
                    conversation_id: id,
                    model: embedder.model_name().into(),
                    content_hash: content_hash(embedder.model_name(), &text),
                    vector: embedder.embed(&text).unwrap(),
                    timestamp: doc.timestamp,
                })
                .unwrap();
        }
        (dir, index)
    }

    #[test]
    fn test_semantic_finds_matching_conversation() {
        let (_dir, store) = temp_store();
        store.apply_increment(&sample_increment("c1")).unwrap();
        let mut other = sample_increment("c2");
        other.topics = vec!["css".into()];
        other.first_user_message.as_mut().unwrap().text = "tweak the button colour".into();
        other.last_assistant_message.as_mut().unwrap().text = "restyled".into();
        store.apply_increment(&other).unwrap();

        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(128).unwrap());
        let (_idx, index) = indexed(&store, embedder.as_ref());
        let searcher = Searcher::new(&store, &index, embedder);

        let hits = searcher
            .semantic("fix auth", &TimeWindow::default(), None, 1)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].conversation.id, "c1");
        assert!(hits[0].similarity.is_some());

        // File post-filter removes conversations that never touched the file
        let hits = searcher
            .semantic("fix auth", &TimeWindow::default(), Some("nothing.rs"), 5)
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_dispatch() {
        let (_dir, store) = temp_store();
        store.apply_increment(&sample_increment("c1")).unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(crate::embedding::DisabledEmbedder);
        let idx_dir = TempDir::new().unwrap();
        let index = EmbeddingIndex::open(&idx_dir.path().join("e.db")).unwrap();
        let searcher = Searcher::new(&store, &index, embedder);

        let by_tool = searcher
            .run(&SearchQuery {
                tool: Some("Read".into()),
                limit: 10,
                ..SearchQuery::default()
            })
            .unwrap();
        assert_eq!(by_tool.len(), 1);
        assert_eq!(by_tool[0].files, vec!["a.ts", "b.ts"]);

        let keyword = searcher
            .run(&SearchQuery {
                text: Some("auth".into()),
                keyword: true,
                file: Some("b.ts".into()),
                limit: 10,
                ..SearchQuery::default()
            })
            .unwrap();
        assert_eq!(keyword.len(), 1);

        // Semantic search without an embedder is an error, not an empty result
        assert!(searcher
            .run(&SearchQuery {
                text: Some("auth".into()),
                limit: 10,
                ..SearchQuery::default()
            })
            .is_err());
        assert!(searcher.run(&SearchQuery::default()).is_err());
    }

    #[test]
    fn test_formats() {
        let (_dir, store) = temp_store();
        store.apply_increment(&sample_increment("c1")).unwrap();
        let idx_dir = TempDir::new().unwrap();
        let index = EmbeddingIndex::open(&idx_dir.path().join("e.db")).unwrap();
        let searcher = Searcher::new(&store, &index, Arc::new(crate::embedding::DisabledEmbedder));
        let hits = searcher.by_file("a.ts", 10).unwrap();

        let text = format_results(&hits, OutputFormat::Text).unwrap();
        assert!(text.contains("1. c1"));
        assert!(text.contains("Preview: fix auth"));

        let md = format_results(&hits, OutputFormat::Markdown).unwrap();
        assert!(md.starts_with("# Search Results (1 found)"));
        assert!(md.contains("**Tools:** Write, Read"));

        let json: serde_json::Value =
            serde_json::from_str(&format_results(&hits, OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json[0]["id"], "c1");
        assert!(json[0].get("similarity").is_none());

        assert_eq!(
            format_results(&[], OutputFormat::Text).unwrap(),
            "No matching conversations."
        );
    }
}
