//! Error taxonomy for session launch and gating.
//!
//! Fatal variants abort the whole launch and surface at the top level.
//! Cookie-record and stale-kill failures are best-effort by design and are
//! logged where they happen instead of appearing here.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, GateError>;

#[derive(Debug, Error)]
pub enum GateError {
	/// Random port sampling exhausted its attempt budget.
	#[error("no free control port found after {attempts} random samples")]
	PortExhaustion { attempts: u32 },
	/// No usable browser executable on this machine.
	#[error("no usable browser executable found: {0}")]
	ExecutableNotFound(String),
	/// The control endpoint never answered on the allocated port.
	#[error("control endpoint on port {port} not ready after {attempts} attempts")]
	ReadinessTimeout { port: u16, attempts: u32 },
	/// The browser reported no page within the retry budget.
	#[error("no page available after {attempts} attempts")]
	PageAcquisition { attempts: u32 },
	/// The proxy's egress address does not match the configured identity.
	#[error("egress identity mismatch: expected {expected}, got {actual}")]
	IpVerificationMismatch { expected: String, actual: String },
	/// The identity check itself could not complete.
	#[error("identity verification could not complete: {0}")]
	VerificationUnavailable(String),
	#[error("configuration error: {0}")]
	Config(String),
	#[error("browser spawn failed: {0}")]
	Spawn(String),
	#[error(transparent)]
	Cdp(#[from] cdp::CdpError),
	#[error(transparent)]
	Io(#[from] std::io::Error),
	#[error(transparent)]
	Json(#[from] serde_json::Error),
	#[error("http request failed: {0}")]
	Http(#[from] reqwest::Error),
}
