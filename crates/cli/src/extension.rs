//! Ephemeral credential-injection extension.
//!
//! Proxy credentials must never show up in process arguments or auth prompts,
//! so they are provisioned through a generated extension that answers proxy
//! authentication challenges in-browser. The package is rebuilt on every
//! launch: exactly two files, manifest plus background script.

use std::path::{Path, PathBuf};

use serde_json::json;
use tracing::debug;

use crate::error::Result;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const BACKGROUND_FILE: &str = "background.js";

/// Writes the extension package for one session.
pub struct ExtensionSynthesizer {
	directory: PathBuf,
}

impl ExtensionSynthesizer {
	pub fn new(directory: PathBuf) -> Self {
		Self { directory }
	}

	/// Clears and rewrites the extension directory; returns its path.
	pub fn build(&self, username: &str, password: &str) -> Result<PathBuf> {
		if self.directory.exists() {
			std::fs::remove_dir_all(&self.directory)?;
		}
		std::fs::create_dir_all(&self.directory)?;

		std::fs::write(self.directory.join(MANIFEST_FILE), manifest_json()?)?;
		std::fs::write(self.directory.join(BACKGROUND_FILE), background_script(username, password)?)?;

		debug!(target = "gate.extension", path = %self.directory.display(), "extension package written");
		Ok(self.directory.clone())
	}

	pub fn directory(&self) -> &Path {
		&self.directory
	}
}

fn manifest_json() -> Result<String> {
	let manifest = json!({
		"manifest_version": 2,
		"name": "browsergate proxy auth",
		"version": "1.0",
		"permissions": ["webRequest", "webRequestBlocking", "<all_urls>"],
		"background": { "scripts": [BACKGROUND_FILE], "persistent": true },
	});
	Ok(serde_json::to_string_pretty(&manifest)?)
}

fn background_script(username: &str, password: &str) -> Result<String> {
	// JSON-encode so arbitrary credential bytes cannot break out of the script.
	let username = serde_json::to_string(username)?;
	let password = serde_json::to_string(password)?;
	Ok(format!(
		r#"var credentials = {{ username: {username}, password: {password} }};

chrome.webRequest.onAuthRequired.addListener(
	function (details) {{
		if (!details.isProxy) {{
			return {{}};
		}}
		return {{ authCredentials: credentials }};
	}},
	{{ urls: ["<all_urls>"] }},
	["blocking"]
);
"#
	))
}
