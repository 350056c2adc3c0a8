//! Browser process supervision.
//!
//! One launch runs the ladder `stale kill → port → spawn → readiness →
//! connect`; the ordering is load-bearing (extension files must exist before
//! spawn, stale instances must be gone before the port probe) and any step's
//! failure is terminal for the attempt. There is no automatic re-launch.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cdp::Connection;
use tracing::info;

use crate::error::Result;

mod port;
mod prefs;
mod readiness;
mod spawn;
mod stale;

pub use port::allocate_port;
pub use prefs::patch_preferences;
pub use readiness::{VersionInfo, await_readiness, fetch_version};
pub use spawn::{SpawnSpec, USER_AGENT_SIGNATURE, launch_args, spawn_browser};
pub use stale::{terminate_pid, terminate_stale_instances};

const PORT_MIN: u16 = 9300;
const PORT_MAX: u16 = 9999;
const PORT_ATTEMPTS: u32 = 25;
const READY_RETRIES: u32 = 40;
const READY_DELAY: Duration = Duration::from_millis(200);

/// Identity of a spawned browser process. Owned here; observed elsewhere.
#[derive(Debug, Clone)]
pub struct BrowserProcessHandle {
	pub pid: u32,
	pub control_port: u16,
	pub working_directory: PathBuf,
	pub extension_directory: Option<PathBuf>,
}

/// Result of a successful launch.
pub struct LaunchOutcome {
	pub handle: BrowserProcessHandle,
	pub connection: Arc<Connection>,
}

/// Supervises exactly one browser process per working directory.
pub struct ProcessSupervisor {
	executable: PathBuf,
	working_directory: PathBuf,
	extension_directory: Option<PathBuf>,
	proxy_server: String,
	identity_token: String,
}

impl ProcessSupervisor {
	pub fn new(
		executable: PathBuf,
		working_directory: PathBuf,
		extension_directory: Option<PathBuf>,
		proxy_server: String,
		identity_token: String,
	) -> Self {
		Self {
			executable,
			working_directory,
			extension_directory,
			proxy_server,
			identity_token,
		}
	}

	/// Runs the full launch ladder and attaches the control connection.
	pub async fn launch(&self) -> Result<LaunchOutcome> {
		let marker = self.working_directory.to_string_lossy();
		let killed = terminate_stale_instances(&marker);
		if killed > 0 {
			info!(target = "gate.supervisor", killed, "reclaimed working directory from stale instances");
		}

		let control_port = allocate_port(PORT_MIN, PORT_MAX, PORT_ATTEMPTS)?;

		std::fs::create_dir_all(&self.working_directory)?;
		patch_preferences(&self.working_directory)?;

		let pid = spawn_browser(&SpawnSpec {
			executable: &self.executable,
			working_directory: &self.working_directory,
			extension_directory: self.extension_directory.as_deref(),
			control_port,
			proxy_server: &self.proxy_server,
			identity_token: &self.identity_token,
		})?;

		let version = await_readiness(control_port, READY_RETRIES, READY_DELAY).await?;
		let connection = connect_control(&version).await?;

		Ok(LaunchOutcome {
			handle: BrowserProcessHandle {
				pid,
				control_port,
				working_directory: self.working_directory.clone(),
				extension_directory: self.extension_directory.clone(),
			},
			connection,
		})
	}
}

/// Attaches a control connection to an already-ready endpoint and spawns its
/// dispatch loop.
pub async fn connect_control(version: &VersionInfo) -> Result<Arc<Connection>> {
	let parts = cdp::transport::connect(&version.web_socket_debugger_url).await?;
	let connection = Arc::new(Connection::new(parts));
	let runner = Arc::clone(&connection);
	tokio::spawn(async move { runner.run().await });
	info!(
		target = "gate.supervisor",
		browser = version.browser.as_deref().unwrap_or("unknown"),
		"control connection established"
	);
	Ok(connection)
}
