//! Persistence layer.
//!
//! Saves and loads the published output table to/from a JSON file so a
//! restarted process can serve last-known values while engines warm up.
//! JSON is sufficient here; a time-series store for output history can
//! be added later.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::types::Output;

/// Default output snapshot file path.
const DEFAULT_OUTPUTS_FILE: &str = "macroscope_outputs.json";

/// Save the published output table to a JSON file.
pub fn save_outputs(outputs: &HashMap<String, Output>, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_OUTPUTS_FILE);
    let json = serde_json::to_string_pretty(outputs)
        .context("Failed to serialise engine outputs")?;

    std::fs::write(path, &json)
        .context(format!("Failed to write outputs to {path}"))?;

    debug!(path, engines = outputs.len(), "Outputs saved");
    Ok(())
}

/// Load a previously saved output table.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_outputs(path: Option<&str>) -> Result<Option<HashMap<String, Output>>> {
    let path = path.unwrap_or(DEFAULT_OUTPUTS_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved outputs found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .context(format!("Failed to read outputs from {path}"))?;

    let outputs: HashMap<String, Output> = serde_json::from_str(&json)
        .context(format!("Failed to parse outputs from {path}"))?;

    info!(path, engines = outputs.len(), "Outputs loaded from disk");
    Ok(Some(outputs))
}

/// Delete the outputs file (for testing or reset).
pub fn delete_outputs(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_OUTPUTS_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path)
            .context(format!("Failed to delete outputs file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
