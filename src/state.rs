//! Persisted installed-requirements state.
//!
//! The durable record of what the engine believes is installed lives in a
//! JSON file inside the environment directory. Its contents are the raw
//! requirement lines in canonical sorted order, so two reconciliations with
//! the same desired set produce byte-identical files. An absent file is
//! equivalent to an empty set.

use crate::error::{IsoEnvError, Result};
use crate::requirements::Requirements;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the persisted state inside the environment directory.
pub const STATE_FILE_NAME: &str = "installed-requirements.json";

/// On-disk document shape.
#[derive(Debug, Serialize, Deserialize)]
struct StateDoc {
    /// Schema version for migration.
    version: u32,
    /// Raw requirement lines, canonically sorted.
    requirements: Vec<String>,
}

const CURRENT_VERSION: u32 = 1;

/// Path of the state file for an environment.
pub fn state_path(env_path: &Path) -> PathBuf {
    env_path.join(STATE_FILE_NAME)
}

/// Load the persisted requirement set.
///
/// Returns the empty set when no state file exists. A file that exists but
/// does not parse is an error, never silently discarded.
pub fn load(env_path: &Path) -> Result<Requirements> {
    let path = state_path(env_path);
    if !path.exists() {
        return Ok(Requirements::new());
    }

    let content = fs::read_to_string(&path)?;
    let doc: StateDoc =
        serde_json::from_str(&content).map_err(|e| IsoEnvError::StateParseError {
            path: path.clone(),
            message: e.to_string(),
        })?;
    Requirements::parse(doc.requirements)
}

/// Save the requirement set as the new persisted state using atomic write.
///
/// Uses the write-to-temp-then-rename pattern so readers outside the lock
/// never observe a partially written file, only a possibly outdated one.
pub fn save(env_path: &Path, requirements: &Requirements) -> Result<()> {
    fs::create_dir_all(env_path)?;

    let doc = StateDoc {
        version: CURRENT_VERSION,
        requirements: requirements.sorted_lines(),
    };
    let content = serde_json::to_string_pretty(&doc).map_err(|e| {
        IsoEnvError::Other(anyhow::anyhow!("failed to serialize state: {e}"))
    })?;

    let path = state_path(env_path);
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, &content)?;
    fs::rename(&temp_path, &path)?;

    Ok(())
}
