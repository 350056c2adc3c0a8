//! Wire types for the DevTools protocol.
//!
//! Responses carry an `id` correlating them to a request; events do not.
//! Both may carry a `sessionId` when scoped to an attached target.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Command sent to the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	/// Correlation id, unique per connection.
	pub id: u64,
	/// Domain-qualified method, e.g. `Network.setCookie`.
	pub method: String,
	/// Target session the command is scoped to, if any.
	#[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
	/// Method parameters.
	pub params: Value,
}

/// Reply to a previously sent [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	/// Correlation id of the originating request.
	pub id: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorPayload>,
	#[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

/// Error body of a failed command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
	pub code: i64,
	pub message: String,
}

/// Unsolicited notification from the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
	pub method: String,
	#[serde(default)]
	pub params: Value,
	#[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
	pub session_id: Option<String>,
}

/// Incoming frame, discriminated by the presence of `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	Response(Response),
	Event(Event),
}
