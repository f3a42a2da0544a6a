//! Fixes lookup command implementation

use anyhow::Result;
use fixgraph_core::SHA_ABBREV_LEN;
use fixgraph_db::FixStore;
use tabled::Table;

use crate::output::FixRow;

/// Lists the commits recorded as fixing or reverting the given commit
pub fn cmd_fixes(sha: &str, db: FixStore) -> Result<()> {
    let sha = if sha.len() > SHA_ABBREV_LEN {
        &sha[..SHA_ABBREV_LEN]
    } else {
        sha
    };

    let Some(record) = db.get_commit(sha)? else {
        println!("Commit {} not found in the database", sha);
        return Ok(());
    };

    let edges = db.fixes_for(sha)?;
    if edges.is_empty() {
        println!("No fixes recorded for {}", record);
        return Ok(());
    }

    let rows: Vec<FixRow> = edges
        .iter()
        .map(|edge| {
            let description = db
                .get_commit(&edge.fixing_sha)
                .ok()
                .flatten()
                .map(|r| r.description)
                .unwrap_or_default();
            FixRow {
                commit: edge.fixing_sha.clone(),
                description,
            }
        })
        .collect();

    println!("{} is fixed or reverted by:", record);
    println!("{}", Table::new(rows));
    Ok(())
}
