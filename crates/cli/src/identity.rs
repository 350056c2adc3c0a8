//! Persistent opaque identity token, prepended to the synthetic user-agent.
//!
//! The token is minted once per installation and reused on every later run so
//! the session presents a stable identity. Persistence lives behind the trait;
//! there is no process-wide cached state.

use std::path::PathBuf;

use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::info;

use crate::error::Result;

/// Supplies the per-installation identity token.
pub trait IdentityProvider: Send + Sync {
	fn get_or_create(&self) -> Result<String>;
}

/// File-backed provider: one marker file, created on first use.
pub struct FileIdentityProvider {
	marker_path: PathBuf,
}

impl FileIdentityProvider {
	pub fn new(marker_path: PathBuf) -> Self {
		Self { marker_path }
	}
}

impl IdentityProvider for FileIdentityProvider {
	fn get_or_create(&self) -> Result<String> {
		if let Ok(existing) = std::fs::read_to_string(&self.marker_path) {
			let token = existing.trim();
			if !token.is_empty() {
				return Ok(token.to_string());
			}
		}

		let suffix: String = rand::rng().sample_iter(&Alphanumeric).take(20).map(char::from).collect();
		let token = format!("bg-{suffix}");

		if let Some(parent) = self.marker_path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(&self.marker_path, &token)?;
		info!(target = "gate.identity", path = %self.marker_path.display(), "minted identity token");
		Ok(token)
	}
}
