//! Request/response correlation and ordered event dispatch.
//!
//! Commands get a unique id and a oneshot for the reply; incoming frames with
//! an `id` complete the matching oneshot, frames without one fan out to event
//! subscribers in registration order. When the transport closes, every pending
//! command fails with [`CdpError::ConnectionClosed`] and subscriber channels
//! close, which is how consumers observe a browser disconnect.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{CdpError, Result};
use crate::message::{Message, Request};
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// Event delivered to subscribers.
#[derive(Debug, Clone)]
pub struct CdpEvent {
	pub method: String,
	pub params: Value,
	/// Session of the attached target that emitted the event, if any.
	pub session_id: Option<String>,
}

struct Subscriber {
	label: String,
	tx: mpsc::UnboundedSender<CdpEvent>,
}

/// Single connection to a browser's debugger endpoint.
pub struct Connection {
	next_id: AtomicU64,
	pending: Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>,
	sender: Mutex<Box<dyn Transport>>,
	receiver: Mutex<Option<(Box<dyn TransportReceiver>, mpsc::UnboundedReceiver<Value>)>>,
	subscribers: Mutex<Vec<Subscriber>>,
}

impl Connection {
	pub fn new(parts: TransportParts) -> Self {
		Self {
			next_id: AtomicU64::new(1),
			pending: Mutex::new(HashMap::new()),
			sender: Mutex::new(parts.sender),
			receiver: Mutex::new(Some((parts.receiver, parts.message_rx))),
			subscribers: Mutex::new(Vec::new()),
		}
	}

	/// Registers an event subscriber. Events are fanned out in registration
	/// order; the label only shows up in logs.
	pub async fn subscribe(&self, label: &str) -> mpsc::UnboundedReceiver<CdpEvent> {
		let (tx, rx) = mpsc::unbounded_channel();
		self.subscribers.lock().await.push(Subscriber {
			label: label.to_string(),
			tx,
		});
		rx
	}

	/// Sends a browser-scoped command and awaits its result.
	pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
		self.send_request(None, method, params).await
	}

	/// Sends a command scoped to an attached target session.
	pub async fn send_to_session(&self, session_id: &str, method: &str, params: Value) -> Result<Value> {
		self.send_request(Some(session_id.to_string()), method, params).await
	}

	async fn send_request(&self, session_id: Option<String>, method: &str, params: Value) -> Result<Value> {
		let id = self.next_id.fetch_add(1, Ordering::SeqCst);
		let (tx, rx) = oneshot::channel();
		self.pending.lock().await.insert(id, tx);

		let request = Request {
			id,
			method: method.to_string(),
			session_id,
			params,
		};

		let payload = serde_json::to_value(&request)?;
		if let Err(error) = self.sender.lock().await.send(payload).await {
			self.pending.lock().await.remove(&id);
			return Err(error);
		}

		rx.await.map_err(|_| CdpError::ConnectionClosed).and_then(|result| result)
	}

	/// Runs the dispatch loop until the transport closes. Call once, from a
	/// spawned task.
	pub async fn run(&self) {
		let Some((receiver, mut message_rx)) = self.receiver.lock().await.take() else {
			warn!(target = "cdp.connection", "dispatch loop started twice; ignoring");
			return;
		};

		let receiver_handle = tokio::spawn(async move {
			if let Err(error) = receiver.run().await {
				debug!(target = "cdp.connection", %error, "transport receiver stopped");
			}
		});

		while let Some(frame) = message_rx.recv().await {
			match serde_json::from_value::<Message>(frame.clone()) {
				Ok(message) => self.dispatch(message).await,
				Err(error) => {
					warn!(target = "cdp.connection", %error, %frame, "unrecognized frame");
				}
			}
		}

		debug!(target = "cdp.connection", "transport closed; failing pending commands");
		for (_, tx) in self.pending.lock().await.drain() {
			let _ = tx.send(Err(CdpError::ConnectionClosed));
		}
		// Dropping the senders closes subscriber receivers.
		self.subscribers.lock().await.clear();

		let _ = receiver_handle.await;
	}

	async fn dispatch(&self, message: Message) {
		match message {
			Message::Response(response) => {
				let Some(tx) = self.pending.lock().await.remove(&response.id) else {
					warn!(target = "cdp.connection", id = response.id, "response without pending request");
					return;
				};
				let result = match response.error {
					Some(error) => Err(CdpError::Protocol {
						code: error.code,
						message: error.message,
					}),
					None => Ok(response.result.unwrap_or(Value::Null)),
				};
				let _ = tx.send(result);
			}
			Message::Event(event) => {
				let event = CdpEvent {
					method: event.method,
					params: event.params,
					session_id: event.session_id,
				};
				let mut subscribers = self.subscribers.lock().await;
				subscribers.retain(|subscriber| {
					if subscriber.tx.send(event.clone()).is_err() {
						debug!(target = "cdp.connection", label = %subscriber.label, "dropping gone subscriber");
						false
					} else {
						true
					}
				});
			}
		}
	}
}

/// Handle for one attached target session.
#[derive(Clone)]
pub struct CdpSession {
	connection: Arc<Connection>,
	session_id: String,
}

impl CdpSession {
	pub fn new(connection: Arc<Connection>, session_id: String) -> Self {
		Self { connection, session_id }
	}

	pub fn session_id(&self) -> &str {
		&self.session_id
	}

	/// Sends a command scoped to this session.
	pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
		self.connection.send_to_session(&self.session_id, method, params).await
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::testing::FakeTransportBuilder;

	fn spawn_connection() -> (Arc<Connection>, crate::testing::FakeTransportController) {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let connection = Arc::new(Connection::new(parts));
		let runner = Arc::clone(&connection);
		tokio::spawn(async move { runner.run().await });
		(connection, controller)
	}

	#[tokio::test]
	async fn responses_correlate_out_of_order() {
		let (connection, controller) = spawn_connection();

		let first = {
			let connection = Arc::clone(&connection);
			tokio::spawn(async move { connection.send("Target.getTargets", json!({})).await })
		};
		let second = {
			let connection = Arc::clone(&connection);
			tokio::spawn(async move { connection.send("Browser.getVersion", json!({})).await })
		};

		controller.wait_for_sent(2).await;
		controller.inject_response(2, json!({"product": "Chrome"}));
		controller.inject_response(1, json!({"targetInfos": []}));

		let first = first.await.unwrap().unwrap();
		let second = second.await.unwrap().unwrap();
		assert!(first["targetInfos"].is_array());
		assert_eq!(second["product"], "Chrome");
	}

	#[tokio::test]
	async fn protocol_errors_surface_as_typed_failures() {
		let (connection, controller) = spawn_connection();

		let pending = {
			let connection = Arc::clone(&connection);
			tokio::spawn(async move { connection.send("Network.setCookie", json!({"name": "x"})).await })
		};

		controller.wait_for_sent(1).await;
		controller.inject_error(1, -32000, "Invalid cookie fields");

		match pending.await.unwrap() {
			Err(CdpError::Protocol { code, message }) => {
				assert_eq!(code, -32000);
				assert_eq!(message, "Invalid cookie fields");
			}
			other => panic!("expected protocol error, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn events_reach_subscribers_in_registration_order() {
		let (connection, controller) = spawn_connection();

		let mut first = connection.subscribe("first").await;
		let mut second = connection.subscribe("second").await;

		controller.inject_event("Target.targetCreated", json!({"targetInfo": {"type": "page"}}), None);

		let a = first.recv().await.unwrap();
		let b = second.recv().await.unwrap();
		assert_eq!(a.method, "Target.targetCreated");
		assert_eq!(b.method, "Target.targetCreated");
	}

	#[tokio::test]
	async fn session_commands_carry_session_id() {
		let (connection, controller) = spawn_connection();
		let session = CdpSession::new(Arc::clone(&connection), "S1".to_string());

		let pending = tokio::spawn(async move { session.send("Page.navigate", json!({"url": "about:blank"})).await });

		controller.wait_for_sent(1).await;
		let sent = controller.take_sent().await;
		assert_eq!(sent[0]["sessionId"], "S1");
		assert_eq!(sent[0]["method"], "Page.navigate");

		controller.inject_response(1, json!({"frameId": "F1"}));
		pending.await.unwrap().unwrap();
	}

	#[tokio::test]
	async fn transport_close_fails_pending_and_closes_subscribers() {
		let (connection, controller) = spawn_connection();
		let mut events = connection.subscribe("watch").await;

		let pending = {
			let connection = Arc::clone(&connection);
			tokio::spawn(async move { connection.send("Target.getTargets", json!({})).await })
		};

		controller.wait_for_sent(1).await;
		controller.close();

		match pending.await.unwrap() {
			Err(CdpError::ConnectionClosed) => {}
			other => panic!("expected closed connection, got {other:?}"),
		}
		assert!(events.recv().await.is_none());
	}
}
