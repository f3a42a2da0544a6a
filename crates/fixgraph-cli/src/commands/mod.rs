//! Command implementations

mod fixes;
mod stats;
mod sync;

pub use fixes::cmd_fixes;
pub use stats::cmd_stats;
pub use sync::cmd_sync;
