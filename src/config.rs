//! Configuration management with YAML support

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::report::ReportFormat;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

/// Metadata store location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

/// Embedding index location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: String,
}

/// Where transcripts live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_sources_root")]
    pub root: String,

    /// Glob matched against project directory names, e.g. `*my-app*`
    #[serde(default)]
    pub project: Option<String>,
}

/// Embedding collaborator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// `hashing`, `http` or `disabled`
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default = "default_dims")]
    pub dims: usize,

    /// Base URL of an OpenAI-compatible API (http provider only)
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

/// Sync controller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_ingest_timeout")]
    pub ingest_timeout_secs: u64,
}

/// Report defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub format: ReportFormat,

    #[serde(default)]
    pub output_path: Option<String>,

    #[serde(default = "default_hotspot_limit")]
    pub hotspot_limit: usize,
}

// Default value functions
fn default_database_path() -> String {
    "~/.local/share/insights/insights.db".to_string()
}

fn default_index_path() -> String {
    "~/.local/share/insights/embeddings.db".to_string()
}

fn default_sources_root() -> String {
    "~/.claude/projects".to_string()
}

fn default_provider() -> String {
    "hashing".to_string()
}

fn default_dims() -> usize {
    256
}

fn default_embed_timeout() -> u64 {
    30
}

fn default_ingest_timeout() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_workers() -> usize {
    4
}

fn default_hotspot_limit() -> usize {
    20
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            root: default_sources_root(),
            project: None,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            endpoint: None,
            timeout_secs: default_embed_timeout(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_backoff_ms(),
            ingest_timeout_secs: default_ingest_timeout(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: ReportFormat::default(),
            output_path: None,
            hotspot_limit: default_hotspot_limit(),
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl SyncConfig {
    pub fn ingest_timeout(&self) -> Duration {
        Duration::from_secs(self.ingest_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Config {
    /// Load configuration from a YAML file
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./insights.yaml (current directory)
    /// 3. ~/.config/insights/insights.yaml
    pub fn load(path: &str) -> Result<Self> {
        let search_paths = vec![
            shellexpand::tilde(path).to_string(),
            "insights.yaml".to_string(),
            dirs::home_dir()
                .unwrap_or_default()
                .join(".config/insights/insights.yaml")
                .to_string_lossy()
                .to_string(),
        ];

        for search_path in &search_paths {
            if std::path::Path::new(search_path).exists() {
                let content = std::fs::read_to_string(search_path)?;
                let config: Config = serde_yaml::from_str(&content)?;
                tracing::debug!(path = %search_path, "loaded config");
                return Ok(config);
            }
        }

        // No config file found, use defaults
        Ok(Config::default())
    }

    /// Get the database path, expanding ~ to home directory
    pub fn database_path(&self) -> PathBuf {
        expand(&self.database.path)
    }

    pub fn index_path(&self) -> PathBuf {
        expand(&self.index.path)
    }

    pub fn sources_root(&self) -> PathBuf {
        expand(&self.sources.root)
    }

    pub fn report_output_path(&self) -> Option<PathBuf> {
        self.report.output_path.as_deref().map(expand)
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.embedding.provider, "hashing");
        assert_eq!(config.embedding.dims, 256);
        assert_eq!(config.sync.workers, 4);
        assert_eq!(config.report.format, ReportFormat::Narrative);
        assert!(config.sources.project.is_none());
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
database:
  path: ~/.local/share/insights/test.db

sources:
  root: /tmp/transcripts
  project: "*annex*"

embedding:
  provider: http
  model: text-embedding-3-small
  dims: 1536
  endpoint: http://localhost:11434

sync:
  workers: 2

report:
  format: tabular
  output_path: ./report.csv
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.database.path, "~/.local/share/insights/test.db");
        assert_eq!(config.sources_root(), PathBuf::from("/tmp/transcripts"));
        assert_eq!(config.sources.project.as_deref(), Some("*annex*"));
        assert_eq!(config.embedding.provider, "http");
        assert_eq!(config.embedding.dims, 1536);
        // unspecified fields keep their defaults
        assert_eq!(config.embedding.max_retries, 3);
        assert_eq!(config.sync.workers, 2);
        assert_eq!(config.sync.ingest_timeout(), Duration::from_secs(120));
        assert_eq!(config.report.format, ReportFormat::Tabular);
        assert_eq!(
            config.report_output_path(),
            Some(PathBuf::from("./report.csv"))
        );
    }
}
