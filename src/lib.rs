pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingest;
pub mod report;
pub mod search;
pub mod store;
pub mod sync;

pub use config::Config;
pub use embedding::{create_embedder, Embedder};
pub use error::{EmbeddingError, PipelineError, PipelineResult};
pub use index::EmbeddingIndex;
pub use report::{ReportFormat, ReportKind, ReportRequest, TimeWindow};
pub use store::MetadataStore;
pub use sync::{CursorSet, RunSummary, SyncController};
