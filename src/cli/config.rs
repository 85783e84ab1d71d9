//! `keepsake config --show`.

use super::{json_error, output_error};
use crate::Result;
use crate::config::KeepsakeConfig;
use std::io::Write;

/// Prints the effective configuration as JSON, including the resolved
/// project root and log file.
///
/// # Errors
///
/// Returns an error if the output cannot be written.
pub fn cmd_config<W: Write>(config: &KeepsakeConfig, out: &mut W) -> Result<()> {
    let mut value = serde_json::to_value(config).map_err(|e| json_error(&e))?;
    if let Some(map) = value.as_object_mut() {
        map.insert(
            "project_root".to_string(),
            config
                .project_root()
                .map_or(serde_json::Value::Null, |p| p.display().to_string().into()),
        );
        map.insert(
            "log_file".to_string(),
            config
                .log_file()
                .map_or(serde_json::Value::Null, |p| p.display().to_string().into()),
        );
    }

    let json = serde_json::to_string_pretty(&value).map_err(|e| json_error(&e))?;
    writeln!(out, "{json}").map_err(|e| output_error(&e))
}
