//! Browser executable discovery.

use std::path::PathBuf;

use crate::error::{GateError, Result};

/// Resolves a usable Chromium-family executable for the current platform.
pub trait ExecutableResolver: Send + Sync {
	fn resolve(&self) -> Result<PathBuf>;
}

/// Probes well-known install locations, then PATH.
pub struct SystemChromiumResolver;

impl ExecutableResolver for SystemChromiumResolver {
	fn resolve(&self) -> Result<PathBuf> {
		for candidate in candidate_paths() {
			if candidate.starts_with('/') || candidate.contains('\\') || candidate.contains(':') {
				let path = PathBuf::from(&candidate);
				if path.exists() {
					return Ok(path);
				}
			} else if let Ok(found) = which::which(&candidate) {
				return Ok(found);
			}
		}
		Err(GateError::ExecutableNotFound(
			"install Chrome/Chromium or point --workdir at an existing setup".to_string(),
		))
	}
}

pub(crate) fn candidate_paths() -> Vec<String> {
	if cfg!(target_os = "macos") {
		vec![
			"/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
			"/Applications/Chromium.app/Contents/MacOS/Chromium",
			"/Applications/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
			"/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
		]
		.into_iter()
		.map(str::to_string)
		.collect()
	} else if cfg!(target_os = "windows") {
		let mut candidates = Vec::new();
		for key in ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"] {
			if let Ok(root) = std::env::var(key) {
				candidates.push(format!(r"{root}\Google\Chrome\Application\chrome.exe"));
				candidates.push(format!(r"{root}\Chromium\Application\chrome.exe"));
				candidates.push(format!(r"{root}\Microsoft\Edge\Application\msedge.exe"));
			}
		}
		candidates.extend(["chrome.exe".to_string(), "msedge.exe".to_string(), "chromium.exe".to_string()]);
		candidates
	} else {
		vec![
			"google-chrome-stable",
			"google-chrome",
			"chromium-browser",
			"chromium",
			"/usr/bin/google-chrome-stable",
			"/usr/bin/google-chrome",
			"/usr/bin/chromium-browser",
			"/usr/bin/chromium",
			"/snap/bin/chromium",
		]
		.into_iter()
		.map(str::to_string)
		.collect()
	}
}
