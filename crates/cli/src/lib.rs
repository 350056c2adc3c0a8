//! Proxy-gated browser session launcher.
//!
//! Supervises a proxy-routed Chromium process, injects proxy credentials
//! through an ephemeral extension, holds all page traffic behind an egress
//! identity check, restores cookies once the identity is verified, and hands
//! the page to the target application.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

pub mod cli;
pub mod config;
pub mod error;
pub mod executable;
pub mod extension;
pub mod gate;
pub mod identity;
pub mod lifecycle;
pub mod orchestrator;
pub mod supervisor;

pub use cli::Cli;
pub use error::{GateError, Result};

use config::{ConfigProvider, FileConfigProvider, HttpConfigProvider, SessionConfig};
use executable::{ExecutableResolver, SystemChromiumResolver};
use extension::ExtensionSynthesizer;
use identity::{FileIdentityProvider, IdentityProvider};
use lifecycle::{AttachExisting, OwnedLaunch, SessionLifecycle};
use orchestrator::{OrchestratorSettings, SessionOrchestrator};
use supervisor::ProcessSupervisor;

/// Layout of the on-disk state directory.
struct StatePaths {
	profile: PathBuf,
	extension: PathBuf,
	identity_marker: PathBuf,
	access_key: PathBuf,
}

impl StatePaths {
	fn resolve(workdir: Option<PathBuf>) -> Self {
		let base = workdir
			.or_else(|| dirs::data_local_dir().map(|dir| dir.join("browsergate")))
			.unwrap_or_else(|| PathBuf::from(".browsergate"));
		Self {
			profile: base.join("profile"),
			extension: base.join("proxy-auth-extension"),
			identity_marker: base.join("identity-token"),
			access_key: base.join("access-key"),
		}
	}
}

/// Runs one complete session from the parsed command line.
pub async fn run(args: Cli) -> Result<()> {
	let paths = StatePaths::resolve(args.workdir.clone());

	let provider: Box<dyn ConfigProvider> = match &args.config {
		Some(path) => Box::new(FileConfigProvider::new(path.clone())),
		None => Box::new(HttpConfigProvider::new(args.config_key.clone(), paths.access_key.clone())),
	};
	let config = Arc::new(provider.fetch().await?);
	info!(
		target = "gate",
		proxy = %config.proxy_config.server,
		cookies = config.cookies.len(),
		"session config loaded"
	);

	let lifecycle: Box<dyn SessionLifecycle> = match args.attach {
		Some(port) => Box::new(AttachExisting::new(port)),
		None => Box::new(OwnedLaunch::new(build_supervisor(&paths, &config)?)),
	};

	let settings = OrchestratorSettings {
		kill_on_failure: args.kill_on_failure,
		..OrchestratorSettings::default()
	};
	SessionOrchestrator::new(lifecycle, config, settings).run().await
}

fn build_supervisor(paths: &StatePaths, config: &SessionConfig) -> Result<ProcessSupervisor> {
	let executable = SystemChromiumResolver.resolve()?;
	let identity_token = FileIdentityProvider::new(paths.identity_marker.clone()).get_or_create()?;

	// Credentials ride the extension, never the command line.
	let extension_directory = match (&config.proxy_config.username, &config.proxy_config.password) {
		(Some(username), Some(password)) => {
			Some(ExtensionSynthesizer::new(paths.extension.clone()).build(username, password)?)
		}
		_ => None,
	};

	Ok(ProcessSupervisor::new(
		executable,
		paths.profile.clone(),
		extension_directory,
		config.proxy_config.server.clone(),
		identity_token,
	))
}
