//! Output formatting structures for CLI display

use tabled::Tabled;

/// Table row for displaying a fixing commit
#[derive(Tabled)]
pub struct FixRow {
    #[tabled(rename = "Commit")]
    pub commit: String,
    #[tabled(rename = "Description")]
    pub description: String,
}
