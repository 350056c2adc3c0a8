//! Error surface for the CDP client.

use thiserror::Error;

/// Result alias for CDP client operations.
pub type Result<T> = std::result::Result<T, CdpError>;

/// Failures raised by the transport and correlation layers.
#[derive(Debug, Error)]
pub enum CdpError {
	/// Transport closed before a pending request completed.
	#[error("connection closed before response arrived")]
	ConnectionClosed,
	/// The browser rejected a command.
	#[error("protocol error {code}: {message}")]
	Protocol { code: i64, message: String },
	/// A frame could not be serialized or parsed.
	#[error("malformed protocol message: {0}")]
	Serde(#[from] serde_json::Error),
	/// The underlying websocket failed.
	#[error("websocket transport failed: {0}")]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
