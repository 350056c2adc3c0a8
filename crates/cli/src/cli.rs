//! Command-line surface for the `browsergate` binary.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "browsergate", version, about = "Launches a proxy-gated browser session")]
pub struct Cli {
	/// Local JSON session config instead of the keyed download.
	#[arg(long, value_name = "FILE", conflicts_with = "config_key")]
	pub config: Option<PathBuf>,

	/// Base64 access key encoding the config URL. Saved after the first
	/// successful fetch, so later runs can omit it.
	#[arg(long, value_name = "KEY")]
	pub config_key: Option<String>,

	/// Attach to a browser already listening on this debugging port instead
	/// of spawning one.
	#[arg(long, value_name = "PORT")]
	pub attach: Option<u16>,

	/// State directory for the profile, extension, identity token, and saved
	/// access key. Defaults to the platform data directory.
	#[arg(long, value_name = "DIR")]
	pub workdir: Option<PathBuf>,

	/// Terminate a browser this program spawned when the session fails.
	/// Off by default so the window stays up for diagnostics.
	#[arg(long)]
	pub kill_on_failure: bool,
}
