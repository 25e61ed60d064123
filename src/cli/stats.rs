//! Stats command implementation

use anyhow::Result;

use crate::config::Config;
use crate::report::TimeWindow;
use crate::store::MetadataStore;

pub fn run(config: &Config, file: Option<&str>) -> Result<()> {
    let store = MetadataStore::open_read_only(&config.database_path())?;

    if let Some(path) = file {
        return file_stats(&store, path);
    }

    let counts = store.counts()?;
    let overview = store.query_overview(&TimeWindow::default())?;
    let cursors = store.load_cursors()?;

    println!("Store: {}", config.database_path().display());
    println!("{}", "=".repeat(50));
    println!("Conversations:  {}", counts.conversations);
    println!(
        "Messages:       {} ({} user, {} assistant)",
        counts.messages, overview.user_messages, overview.assistant_messages
    );
    println!("Tool uses:      {}", counts.tool_uses);
    println!("Topic tags:     {}", counts.topics);
    println!("Active days:    {}", overview.active_days);
    println!("Sources synced: {}", cursors.len());
    if let (Some(first), Some(last)) = (&overview.first_activity, &overview.last_activity) {
        println!("Activity:       {} .. {}", first, last);
    }

    let tools = store.query_tool_usage_breakdown(&TimeWindow::default())?;
    if !tools.is_empty() {
        println!("\n{:<24} {:>8} {:>14}", "Tool", "Uses", "Conversations");
        println!("{}", "-".repeat(50));
        for t in tools.iter().take(10) {
            println!("{:<24} {:>8} {:>14}", t.tool_name, t.uses, t.conversations);
        }
    }
    Ok(())
}

fn file_stats(store: &MetadataStore, path: &str) -> Result<()> {
    let Some(touch) = store.file_touch(path)? else {
        println!("No tool use touched '{}'.", path);
        return Ok(());
    };

    println!("{}", touch.path);
    println!("{}", "-".repeat(50));
    println!("Reads:  {}", touch.reads);
    println!("Writes: {}", touch.writes);
    println!("Edits:  {}", touch.edits);
    println!("Other:  {}", touch.other);
    println!("Total:  {}", touch.total());
    println!("Conversations ({}):", touch.conversation_ids.len());
    for id in &touch.conversation_ids {
        println!("  {}", id);
    }
    Ok(())
}
