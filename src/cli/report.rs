//! Report command implementation

use anyhow::Result;
use chrono::Utc;
use std::path::PathBuf;

use crate::config::Config;
use crate::report::{self, ReportFormat, ReportKind, ReportRequest, TimeWindow};
use crate::store::MetadataStore;

pub struct ReportArgs {
    pub kind: ReportKind,
    pub format: Option<ReportFormat>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub days: Option<i64>,
    pub output: Option<String>,
}

pub fn run(config: &Config, args: ReportArgs) -> Result<()> {
    let window = match args.days {
        Some(days) => TimeWindow::last_days(Utc::now(), days)?,
        None => TimeWindow::parse(args.from.as_deref(), args.to.as_deref())?,
    };

    let request = ReportRequest {
        kind: args.kind,
        format: args.format.unwrap_or(config.report.format),
        window,
        output_path: args
            .output
            .map(|p| PathBuf::from(shellexpand::tilde(&p).to_string()))
            .or_else(|| config.report_output_path()),
    };

    let store = MetadataStore::open_read_only(&config.database_path())?;
    report::generate(&store, &request, config.report.hotspot_limit)?;

    if let Some(ref path) = request.output_path {
        println!("✅ Report written to {}", path.display());
    }
    Ok(())
}
