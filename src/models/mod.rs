//! Data models for keepsake.
//!
//! Backup records and the archive naming convention they are parsed from.

mod archive_name;
mod record;

pub use archive_name::{
    ARCHIVE_EXTENSION, archive_dir, archive_file_name, is_candidate, parse_archive_name,
};
pub use record::BackupRecord;
