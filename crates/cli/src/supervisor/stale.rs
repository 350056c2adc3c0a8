//! Best-effort teardown of stale browser processes.
//!
//! A stale instance is a still-running browser whose command line names this
//! session's working directory. At most one live process may use a working
//! directory, so every match is killed before a new spawn. Individual kill
//! failures are logged and skipped.

use sysinfo::{ProcessesToUpdate, System};
use tracing::{info, warn};

/// Kills every process whose command line carries both `marker` and a
/// `--user-data-dir` flag. Returns how many were terminated.
pub fn terminate_stale_instances(marker: &str) -> usize {
	let mut sys = System::new();
	sys.refresh_processes(ProcessesToUpdate::All, true);

	let own_pid = std::process::id();
	let mut killed = 0;

	for (pid, process) in sys.processes() {
		if pid.as_u32() == own_pid {
			continue;
		}
		let cmd: Vec<String> = process.cmd().iter().map(|arg| arg.to_string_lossy().into_owned()).collect();
		if !is_stale_match(&cmd, marker) {
			continue;
		}

		if process.kill() {
			info!(target = "gate.supervisor", pid = pid.as_u32(), "terminated stale browser instance");
			killed += 1;
		} else {
			warn!(target = "gate.supervisor", pid = pid.as_u32(), "failed to kill stale browser; continuing");
		}
	}

	killed
}

/// Kills a single process by pid. Used for explicit post-failure cleanup.
pub fn terminate_pid(pid: u32) -> bool {
	let mut sys = System::new();
	sys.refresh_processes(ProcessesToUpdate::All, true);
	match sys.process(sysinfo::Pid::from_u32(pid)) {
		Some(process) => process.kill(),
		None => false,
	}
}

pub(crate) fn is_stale_match(cmd: &[String], marker: &str) -> bool {
	let has_marker = cmd.iter().any(|arg| arg.contains(marker));
	let has_profile_flag = cmd.iter().any(|arg| arg.starts_with("--user-data-dir"));
	has_marker && has_profile_flag
}
