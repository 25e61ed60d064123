//! Report generation over the metadata store
//!
//! [`ReportData::collect`] runs the windowed aggregate queries once; a
//! [`Renderer`] per [`ReportFormat`] turns the result into text.

mod csv;
mod html;
mod json;
mod narrative;
mod summary;
mod window;

pub use csv::CsvRenderer;
pub use html::HtmlRenderer;
pub use json::JsonRenderer;
pub use narrative::NarrativeRenderer;
pub use summary::{bar_chart, sparkline, RuleSummarizer, Summarizer};
pub use window::TimeWindow;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::store::{
    DayActivity, FileHotspot, HourCount, MetadataStore, Overview, ToolUsage, TopicCount,
    WeekdayCount,
};

/// Files listed by the heatmap report, whatever the configured hotspot limit
const HEATMAP_FILES: usize = 50;
/// Most heat marks a single file gets
const MAX_HEAT: i64 = 5;

/// Output format of a report
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// JSON document
    Structured,
    /// CSV rows
    Tabular,
    /// Self-contained HTML page
    Standalone,
    /// Markdown prose with ASCII charts
    #[default]
    Narrative,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Structured => "json",
            ReportFormat::Tabular => "csv",
            ReportFormat::Standalone => "html",
            ReportFormat::Narrative => "md",
        }
    }
}

/// Which report to produce
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ReportKind {
    /// Activity overview: charts, hotspots, topics and insights
    #[default]
    Overview,
    /// Per-file reads, writes and edits with a heat level
    FileHeatmap,
    /// Each tool's share of all tool uses
    ToolUsage,
}

#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub kind: ReportKind,
    pub format: ReportFormat,
    pub window: TimeWindow,
    /// Written to stdout when unset
    pub output_path: Option<PathBuf>,
}

/// Everything a report shows, gathered in one pass
#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub kind: ReportKind,
    pub window: TimeWindow,
    pub generated_at: DateTime<Utc>,
    pub overview: Overview,
    pub file_hotspots: Vec<FileHotspot>,
    pub tool_usage: Vec<ToolUsage>,
    pub topics: Vec<TopicCount>,
    pub timeline: Vec<DayActivity>,
    pub weekdays: Vec<WeekdayCount>,
    pub hourly: Vec<HourCount>,
}

/// One row of the file heatmap
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileHeat {
    pub path: String,
    pub conversations: i64,
    pub reads: i64,
    pub writes: i64,
    pub edits: i64,
    /// reads + writes + edits
    pub total: i64,
    /// 1 to 5, one step per two conversations
    pub heat_level: i64,
}

impl From<&FileHotspot> for FileHeat {
    fn from(h: &FileHotspot) -> Self {
        Self {
            path: h.path.clone(),
            conversations: h.conversations,
            reads: h.reads,
            writes: h.writes,
            edits: h.edits,
            total: h.reads + h.writes + h.edits,
            heat_level: ((h.conversations + 1) / 2).min(MAX_HEAT),
        }
    }
}

/// A tool with its percentage of all tool uses in the window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolShare {
    pub tool_name: String,
    pub uses: i64,
    pub conversations: i64,
    pub percentage: f64,
}

impl ReportData {
    pub fn collect(
        store: &MetadataStore,
        kind: ReportKind,
        window: &TimeWindow,
        hotspot_limit: usize,
    ) -> PipelineResult<Self> {
        let query = |e: anyhow::Error| PipelineError::ReportQuery(format!("{:#}", e));
        let hotspot_limit = match kind {
            ReportKind::FileHeatmap => hotspot_limit.max(HEATMAP_FILES),
            _ => hotspot_limit,
        };

        Ok(Self {
            kind,
            window: *window,
            generated_at: Utc::now(),
            overview: store.query_overview(window).map_err(query)?,
            file_hotspots: store
                .query_file_hotspots(window, hotspot_limit)
                .map_err(query)?,
            tool_usage: store.query_tool_usage_breakdown(window).map_err(query)?,
            topics: store.query_topic_clusters(window, 15).map_err(query)?,
            timeline: store.query_activity_timeline(window).map_err(query)?,
            weekdays: store.query_weekday_distribution(window).map_err(query)?,
            hourly: store.query_hourly_distribution(window).map_err(query)?,
        })
    }

    /// Files ranked by conversations, then touches, then path
    pub fn file_heatmap(&self) -> Vec<FileHeat> {
        let mut files: Vec<FileHeat> = self.file_hotspots.iter().map(FileHeat::from).collect();
        files.sort_by(|a, b| {
            b.conversations
                .cmp(&a.conversations)
                .then(b.total.cmp(&a.total))
                .then(a.path.cmp(&b.path))
        });
        files
    }

    pub fn tool_shares(&self) -> Vec<ToolShare> {
        let total: i64 = self.tool_usage.iter().map(|t| t.uses).sum();
        self.tool_usage
            .iter()
            .map(|t| ToolShare {
                tool_name: t.tool_name.clone(),
                uses: t.uses,
                conversations: t.conversations,
                percentage: if total > 0 {
                    t.uses as f64 * 100.0 / total as f64
                } else {
                    0.0
                },
            })
            .collect()
    }

    /// No conversation activity fell inside the window
    pub fn is_empty(&self) -> bool {
        self.overview.conversations == 0
            && self.overview.messages == 0
            && self.overview.tool_uses == 0
    }
}

/// Turns collected data into one output format.
pub trait Renderer: Send + Sync {
    fn render(&self, data: &ReportData) -> Result<String>;
}

pub fn renderer_for(format: ReportFormat) -> Box<dyn Renderer> {
    match format {
        ReportFormat::Structured => Box::new(JsonRenderer),
        ReportFormat::Tabular => Box::new(CsvRenderer),
        ReportFormat::Standalone => Box::new(HtmlRenderer::default()),
        ReportFormat::Narrative => Box::new(NarrativeRenderer::new(Box::new(RuleSummarizer))),
    }
}

/// Collect, render and deliver one report. Returns the rendered text.
pub fn generate(
    store: &MetadataStore,
    request: &ReportRequest,
    hotspot_limit: usize,
) -> Result<String> {
    let data = ReportData::collect(store, request.kind, &request.window, hotspot_limit)?;
    let rendered = renderer_for(request.format).render(&data)?;

    match request.output_path {
        Some(ref path) => {
            write_output(path, &rendered)?;
            info!(
                path = %path.display(),
                kind = ?request.kind,
                format = ?request.format,
                "report written"
            );
        }
        None => println!("{}", rendered),
    }
    Ok(rendered)
}

fn write_output(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}
