//! Detached browser spawn with the fixed hardening argument set.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::info;

use crate::error::{GateError, Result};

/// Realistic signature the identity token is prepended to.
pub const USER_AGENT_SIGNATURE: &str =
	"Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Everything needed to assemble the launch command line.
pub struct SpawnSpec<'a> {
	pub executable: &'a Path,
	pub working_directory: &'a Path,
	pub extension_directory: Option<&'a Path>,
	pub control_port: u16,
	pub proxy_server: &'a str,
	pub identity_token: &'a str,
}

/// Fixed argument set: control port, profile, proxy routing, certificate
/// validation off, automation/throttling/crash-reporting signals off, and the
/// synthetic user-agent. Credentials are never part of this.
pub fn launch_args(spec: &SpawnSpec<'_>) -> Vec<String> {
	let mut args = vec![
		format!("--remote-debugging-port={}", spec.control_port),
		format!("--user-data-dir={}", spec.working_directory.display()),
		format!("--proxy-server={}", spec.proxy_server),
		format!("--user-agent={} {}", spec.identity_token, USER_AGENT_SIGNATURE),
		"--no-first-run".to_string(),
		"--no-default-browser-check".to_string(),
		"--no-sandbox".to_string(),
		"--disable-setuid-sandbox".to_string(),
		"--ignore-certificate-errors".to_string(),
		"--disable-blink-features=AutomationControlled".to_string(),
		"--disable-infobars".to_string(),
		"--disable-background-timer-throttling".to_string(),
		"--disable-backgrounding-occluded-windows".to_string(),
		"--disable-renderer-backgrounding".to_string(),
		"--disable-breakpad".to_string(),
		"--disable-crash-reporter".to_string(),
		"--window-position=0,0".to_string(),
		"--force-dark-mode".to_string(),
	];
	if let Some(dir) = spec.extension_directory {
		args.push(format!("--load-extension={}", dir.display()));
	}
	args
}

/// Spawns the browser detached; the child must survive parent exit, so the
/// parent never waits on it. Returns the child pid.
pub fn spawn_browser(spec: &SpawnSpec<'_>) -> Result<u32> {
	let mut cmd = Command::new(spec.executable);
	cmd.args(launch_args(spec)).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

	#[cfg(unix)]
	std::os::unix::process::CommandExt::process_group(&mut cmd, 0);

	let child = cmd
		.spawn()
		.map_err(|e| GateError::Spawn(format!("failed to launch {}: {e}", spec.executable.display())))?;

	let pid = child.id();
	info!(target = "gate.supervisor", pid, port = spec.control_port, "browser spawned");
	Ok(pid)
}
