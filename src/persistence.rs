//! JSON snapshots of relationships and agent runtime state.
//!
//! Loading never fails: a missing or corrupt file is logged and treated as
//! empty so the town can always start.

use anyhow::{Context as _, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::relationship::RelationshipSnapshot;
use crate::types::Agent;

pub fn load_relationships(path: &Path) -> RelationshipSnapshot {
    load_or_default(path, "relationships")
}

pub fn save_relationships(path: &Path, snapshot: &RelationshipSnapshot) -> Result<()> {
    write_json(path, snapshot)
}

pub fn load_agents(path: &Path) -> Vec<Agent> {
    load_or_default(path, "agent states")
}

pub fn save_agents(path: &Path, agents: &[Agent]) -> Result<()> {
    write_json(path, agents)
}

fn load_or_default<T: DeserializeOwned + Default>(path: &Path, what: &str) -> T {
    if !path.exists() {
        log::info!("📂 No saved {} at {:?}, starting fresh", what, path);
        return T::default();
    }

    let parsed = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {:?}", path))
        .and_then(|content| serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path)));

    match parsed {
        Ok(value) => {
            log::info!("📂 Loaded {} from {:?}", what, path);
            value
        }
        Err(e) => {
            log::error!("❌ Ignoring saved {}: {:#}", what, e);
            T::default()
        }
    }
}

/// Writes to a sibling temp file, then renames over the target
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;
    }

    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("Failed to write {:?}", tmp))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {:?}", path))?;
    Ok(())
}
