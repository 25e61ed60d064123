use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use convo_insights::cli::{index, list, report, search, stats, sync};
use convo_insights::config::Config;
use convo_insights::report::{ReportFormat, ReportKind, TimeWindow};
use convo_insights::search::{OutputFormat, SearchQuery};

#[derive(Parser)]
#[command(name = "insights")]
#[command(about = "Incremental analytics over AI coding assistant conversation logs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "insights.yaml", global = true)]
    config: String,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest new transcript lines and update the embedding index
    Sync {
        /// Re-read every transcript from the beginning
        #[arg(long)]
        full: bool,

        /// Only sync transcript directories matching this glob
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Embedding index maintenance
    Index {
        #[command(subcommand)]
        command: IndexCommands,
    },

    /// Search conversations
    Search {
        /// Query text
        query: Option<String>,

        /// Match words instead of embeddings
        #[arg(long)]
        keyword: bool,

        /// Only conversations that touched a file matching this pattern
        #[arg(long)]
        file: Option<String>,

        /// Conversations that used this tool
        #[arg(long)]
        tool: Option<String>,

        /// Window start (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        from: Option<String>,

        /// Window end, exclusive
        #[arg(long)]
        to: Option<String>,

        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Generate an insights report
    Report {
        #[arg(long, value_enum, default_value_t = ReportKind::Overview)]
        kind: ReportKind,

        #[arg(long, value_enum)]
        format: Option<ReportFormat>,

        #[arg(long)]
        from: Option<String>,

        #[arg(long)]
        to: Option<String>,

        /// Last N days, overrides --from/--to
        #[arg(long)]
        days: Option<i64>,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// List recent conversations
    List {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Show store statistics
    Stats {
        /// Touch counts for one file path
        #[arg(long)]
        file: Option<String>,
    },
}

#[derive(Subcommand)]
enum IndexCommands {
    /// Re-embed every conversation and replace the index
    Rebuild,
    /// Show index size and models
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    // Load config
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        Config::default()
    });

    match cli.command {
        Commands::Sync { full, project } => {
            sync::run(&config, full, project.as_deref())?;
        }
        Commands::Index { command } => match command {
            IndexCommands::Rebuild => index::rebuild(&config)?,
            IndexCommands::Stats => index::stats(&config)?,
        },
        Commands::Search {
            query,
            keyword,
            file,
            tool,
            from,
            to,
            limit,
            format,
        } => {
            let query = SearchQuery {
                text: query,
                keyword,
                file,
                tool,
                window: TimeWindow::parse(from.as_deref(), to.as_deref())?,
                limit,
            };
            search::run(&config, query, format)?;
        }
        Commands::Report {
            kind,
            format,
            from,
            to,
            days,
            output,
        } => {
            report::run(
                &config,
                report::ReportArgs {
                    kind,
                    format,
                    from,
                    to,
                    days,
                    output,
                },
            )?;
        }
        Commands::List { limit } => {
            list::run(&config, limit)?;
        }
        Commands::Stats { file } => {
            stats::run(&config, file.as_deref())?;
        }
    }

    Ok(())
}
