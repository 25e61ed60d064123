//! List command implementation

use anyhow::Result;

use crate::config::Config;
use crate::store::MetadataStore;

pub fn run(config: &Config, limit: usize) -> Result<()> {
    let store = MetadataStore::open_read_only(&config.database_path())?;
    let conversations = store.list_conversations(limit)?;

    if conversations.is_empty() {
        println!("No conversations found. Run 'insights sync' first.");
        return Ok(());
    }

    println!(
        "{:<12} {:<18} {:<24} {:>5}  {}",
        "Started", "ID", "Project", "Msgs", "First message"
    );
    println!("{}", "-".repeat(100));

    for c in conversations {
        // Format timestamp
        let started = c
            .started_at
            .as_ref()
            .map(|ts| {
                if ts.len() >= 16 {
                    format!("{} {}", &ts[5..10], &ts[11..16])
                } else {
                    ts.clone()
                }
            })
            .unwrap_or_else(|| "-".to_string());

        let project = c
            .project_path
            .as_deref()
            .and_then(|p| p.rsplit('/').next())
            .unwrap_or("-");

        let title = c
            .first_user_message
            .as_ref()
            .map(|t| {
                let t = t.lines().next().unwrap_or(t);
                if t.chars().count() > 40 {
                    format!("{}...", t.chars().take(37).collect::<String>())
                } else {
                    t.to_string()
                }
            })
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<12} {:<18} {:<24} {:>5}  {}",
            started, c.id, project, c.message_count, title
        );
    }

    Ok(())
}
