//! Backup tree storage.
//!
//! - [`ArchiveStore`]: the operations the scanner and pruner need
//! - [`FilesystemStore`]: `std::fs` implementation
//! - [`scan_project`]: turns a project directory into [`crate::BackupRecord`]s

mod filesystem;
mod scanner;
mod traits;

pub use filesystem::FilesystemStore;
pub use scanner::{ScanResult, SkippedArchive, scan_project};
pub use traits::ArchiveStore;
