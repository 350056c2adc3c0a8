//! Profile preference patching applied before spawn.
//!
//! A hard-killed stale instance leaves the profile marked as crashed, which
//! makes the next launch prompt for session restore. Patching the exit state
//! and restore mode into the existing preferences suppresses that.

use std::path::Path;

use serde_json::{Value, json};
use tracing::debug;

use crate::error::{GateError, Result};

/// Merges exit/session-restore defaults into `Default/Preferences` under the
/// working directory. Returns `false` when the file does not exist yet (first
/// launch; the browser will create it).
pub fn patch_preferences(working_directory: &Path) -> Result<bool> {
	let path = working_directory.join("Default").join("Preferences");
	if !path.exists() {
		return Ok(false);
	}

	let raw = std::fs::read_to_string(&path)?;
	let mut prefs: Value =
		serde_json::from_str(&raw).map_err(|e| GateError::Config(format!("unreadable preferences {}: {e}", path.display())))?;
	merge(&mut prefs, &session_defaults());
	std::fs::write(&path, serde_json::to_string(&prefs)?)?;

	debug!(target = "gate.supervisor", path = %path.display(), "patched profile preferences");
	Ok(true)
}

fn session_defaults() -> Value {
	json!({
		"profile": { "exit_type": "Normal", "exited_cleanly": true },
		"session": { "restore_on_startup": 4 },
	})
}

fn merge(target: &mut Value, patch: &Value) {
	match (target, patch) {
		(Value::Object(target), Value::Object(patch)) => {
			for (key, value) in patch {
				merge(target.entry(key.clone()).or_insert(Value::Null), value);
			}
		}
		(target, patch) => *target = patch.clone(),
	}
}
