//! Config retrieval collaborators.
//!
//! Providers hide where the session config comes from; errors here are fatal
//! for the launch. The HTTP provider mirrors the original deployment: a
//! base64-encoded access key decodes to the config URL and is persisted
//! locally after the first successful fetch.

use std::path::PathBuf;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{info, warn};

use super::SessionConfig;
use crate::error::{GateError, Result};

/// Source of the immutable session configuration.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
	async fn fetch(&self) -> Result<SessionConfig>;
}

/// Reads a local JSON config file.
pub struct FileConfigProvider {
	path: PathBuf,
}

impl FileConfigProvider {
	pub fn new(path: PathBuf) -> Self {
		Self { path }
	}
}

#[async_trait]
impl ConfigProvider for FileConfigProvider {
	async fn fetch(&self) -> Result<SessionConfig> {
		let raw = std::fs::read_to_string(&self.path)
			.map_err(|e| GateError::Config(format!("cannot read config {}: {e}", self.path.display())))?;
		serde_json::from_str(&raw).map_err(|e| GateError::Config(format!("invalid config {}: {e}", self.path.display())))
	}
}

/// Downloads the config from the URL hidden in a base64 access key.
pub struct HttpConfigProvider {
	key: Option<String>,
	key_file: PathBuf,
}

impl HttpConfigProvider {
	pub fn new(key: Option<String>, key_file: PathBuf) -> Self {
		Self { key, key_file }
	}

	fn resolve_key(&self) -> Result<String> {
		if let Some(key) = &self.key {
			return Ok(key.trim().to_string());
		}
		match std::fs::read_to_string(&self.key_file) {
			Ok(saved) if !saved.trim().is_empty() => {
				info!(target = "gate.config", "using previously saved access key");
				Ok(saved.trim().to_string())
			}
			_ => Err(GateError::Config(
				"no access key: pass --config-key or provide a saved key file".to_string(),
			)),
		}
	}
}

/// Decodes an access key into the config URL it encodes.
pub fn decode_key(key: &str) -> Result<String> {
	let bytes = BASE64
		.decode(key.trim())
		.map_err(|_| GateError::Config("access key is not valid base64".to_string()))?;
	String::from_utf8(bytes).map_err(|_| GateError::Config("access key does not decode to a URL".to_string()))
}

#[async_trait]
impl ConfigProvider for HttpConfigProvider {
	async fn fetch(&self) -> Result<SessionConfig> {
		let key = self.resolve_key()?;
		let url = decode_key(&key)?;

		info!(target = "gate.config", "downloading session config");
		let config = reqwest::Client::new()
			.get(&url)
			.send()
			.await?
			.error_for_status()?
			.json::<SessionConfig>()
			.await?;

		// Persist the key only after a fetch it actually worked for.
		if let Some(parent) = self.key_file.parent() {
			let _ = std::fs::create_dir_all(parent);
		}
		if let Err(error) = std::fs::write(&self.key_file, &key) {
			warn!(target = "gate.config", %error, "could not save access key; continuing");
		}

		Ok(config)
	}
}
