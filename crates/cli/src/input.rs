// crates/cli/src/input.rs
//! Reading the connection config handed to `start`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;

/// What `start` sends to the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRequest {
    pub config: Value,
    pub tables: Vec<String>,
}

/// Load the JSON connection config at `path`. Tables given on the command
/// line win; otherwise the config's `selected_tables` array is used.
pub fn load_import_request(path: &Path, tables: Vec<String>) -> Result<ImportRequest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Value = serde_json::from_str(&raw)
        .with_context(|| format!("config file {} is not valid JSON", path.display()))?;
    if !config.is_object() {
        bail!("config file {} must contain a JSON object", path.display());
    }

    let tables = if tables.is_empty() {
        selected_tables(&config)?
    } else {
        tables
    };
    let tables = dedup(tables);
    if tables.is_empty() {
        bail!("no tables selected; pass --table or set selected_tables in the config");
    }

    Ok(ImportRequest { config, tables })
}

fn selected_tables(config: &Value) -> Result<Vec<String>> {
    let Some(value) = config.get("selected_tables") else {
        return Ok(Vec::new());
    };
    let Some(items) = value.as_array() else {
        bail!("selected_tables must be an array of table names");
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .context("selected_tables must contain only strings")
        })
        .collect()
}

fn dedup(tables: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tables
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}
