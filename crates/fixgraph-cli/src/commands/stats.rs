//! Stats command implementation

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use fixgraph_db::FixStore;

/// Displays database statistics
pub fn cmd_stats(json: bool, db: FixStore) -> Result<()> {
    let watermarks = db.watermarks()?;

    if json {
        let value = serde_json::json!({
            "commits": db.commit_count(),
            "edges": db.edge_count(),
            "db_size_bytes": db.db_size_bytes(),
            "watermarks": watermarks,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", "Database Statistics:".bright_cyan().bold());
    println!(
        "  {}: {}",
        "Commits".bright_yellow(),
        db.commit_count().to_string().bold()
    );
    println!(
        "  {}: {}",
        "Fix edges".bright_yellow(),
        db.edge_count().to_string().bold()
    );
    println!(
        "  {}: {}",
        "Size on disk".bright_yellow(),
        format!("{} KiB", db.db_size_bytes() / 1024).bold()
    );
    for w in watermarks {
        println!(
            "  {}: {} ({})",
            w.branch.bright_yellow(),
            w.last_sha.bold(),
            format_timestamp(w.updated_at)
        );
    }
    Ok(())
}

/// Formats a unix timestamp as a readable date
fn format_timestamp(timestamp: u64) -> String {
    let dt = DateTime::<Utc>::from_timestamp(timestamp as i64, 0)
        .unwrap_or_else(|| DateTime::<Utc>::MIN_UTC);
    dt.format("%Y-%m-%d %H:%M").to_string()
}
