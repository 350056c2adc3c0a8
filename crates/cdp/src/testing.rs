//! In-memory transport for exercising [`crate::Connection`] without a browser.
//!
//! The controller injects responses/events and inspects sent commands; the
//! orchestrator crate's integration tests script whole gate cycles with it.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc};

use crate::error::Result;
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// Builder for a fake transport pair.
#[derive(Default)]
pub struct FakeTransportBuilder {}

impl FakeTransportBuilder {
	pub fn new() -> Self {
		Self {}
	}

	/// Builds transport parts for a [`crate::Connection`] plus a controller
	/// for the test side of the wire.
	pub fn build(self) -> (TransportParts, FakeTransportController) {
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		let sent = Arc::new(Mutex::new(Vec::new()));
		let total_sent = Arc::new(AtomicUsize::new(0));

		let parts = TransportParts {
			sender: Box::new(FakeSender {
				sent: Arc::clone(&sent),
				total_sent: Arc::clone(&total_sent),
			}),
			receiver: Box::new(FakeReceiver { inbound_rx, message_tx }),
			message_rx,
		};

		let controller = FakeTransportController {
			inbound_tx: std::sync::Mutex::new(Some(inbound_tx)),
			sent,
			total_sent,
		};

		(parts, controller)
	}
}

/// Test-side handle: inject frames, inspect sent commands, drop the wire.
pub struct FakeTransportController {
	inbound_tx: std::sync::Mutex<Option<mpsc::UnboundedSender<Value>>>,
	sent: Arc<Mutex<Vec<Value>>>,
	total_sent: Arc<AtomicUsize>,
}

impl FakeTransportController {
	/// Injects a raw frame as if the browser sent it.
	pub fn inject(&self, frame: Value) {
		if let Some(tx) = self.inbound_tx.lock().expect("inbound lock").as_ref() {
			let _ = tx.send(frame);
		}
	}

	/// Injects a successful response for request `id`.
	pub fn inject_response(&self, id: u64, result: Value) {
		self.inject(json!({ "id": id, "result": result }));
	}

	/// Injects a command failure for request `id`.
	pub fn inject_error(&self, id: u64, code: i64, message: &str) {
		self.inject(json!({ "id": id, "error": { "code": code, "message": message } }));
	}

	/// Injects an event, optionally scoped to a session.
	pub fn inject_event(&self, method: &str, params: Value, session_id: Option<&str>) {
		match session_id {
			Some(session_id) => self.inject(json!({ "method": method, "params": params, "sessionId": session_id })),
			None => self.inject(json!({ "method": method, "params": params })),
		}
	}

	/// Simulates the browser going away.
	pub fn close(&self) {
		self.inbound_tx.lock().expect("inbound lock").take();
	}

	/// Takes all sent commands, clearing the buffer.
	pub async fn take_sent(&self) -> Vec<Value> {
		std::mem::take(&mut *self.sent.lock().await)
	}

	/// Total commands sent since the transport was built (not reset by
	/// [`Self::take_sent`]).
	pub fn sent_count(&self) -> usize {
		self.total_sent.load(Ordering::SeqCst)
	}

	/// Waits until at least `count` commands have been sent in total.
	pub async fn wait_for_sent(&self, count: usize) {
		while self.sent_count() < count {
			tokio::time::sleep(Duration::from_millis(2)).await;
		}
	}
}

struct FakeSender {
	sent: Arc<Mutex<Vec<Value>>>,
	total_sent: Arc<AtomicUsize>,
}

impl Transport for FakeSender {
	fn send(&mut self, message: Value) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + '_>> {
		let sent = Arc::clone(&self.sent);
		let total_sent = Arc::clone(&self.total_sent);
		Box::pin(async move {
			sent.lock().await.push(message);
			total_sent.fetch_add(1, Ordering::SeqCst);
			Ok(())
		})
	}
}

struct FakeReceiver {
	inbound_rx: mpsc::UnboundedReceiver<Value>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for FakeReceiver {
	fn run(mut self: Box<Self>) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(frame) = self.inbound_rx.recv().await {
				if self.message_tx.send(frame).is_err() {
					break;
				}
			}
			Ok(())
		})
	}
}
