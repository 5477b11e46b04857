//! Reading the export: the event-driven record reader and the overview pass.

pub mod overview;
pub mod reader;

pub use overview::{BackupOverviewHandler, read_backup_overview};
pub use reader::{ChainedHandler, ImportEntityHandler, parse_record, read_export, read_records};
