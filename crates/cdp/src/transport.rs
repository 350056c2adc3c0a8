//! Transport seam between the connection and the wire.
//!
//! The websocket implementation is the production transport; tests swap in
//! [`crate::testing::FakeTransportBuilder`] through the same traits.

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::error::Result;

/// Outbound half of a transport.
pub trait Transport: Send {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Inbound pump; forwards parsed frames until the peer goes away.
pub trait TransportReceiver: Send {
	fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// Pieces handed to [`crate::Connection::new`].
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}

/// Opens a websocket to the browser's debugger URL.
pub async fn connect(ws_url: &str) -> Result<TransportParts> {
	let (stream, _) = connect_async(ws_url).await?;
	let (sink, source) = stream.split();
	let (message_tx, message_rx) = mpsc::unbounded_channel();

	Ok(TransportParts {
		sender: Box::new(WebSocketSender { sink }),
		receiver: Box::new(WebSocketReceiver { source, message_tx }),
		message_rx,
	})
}

struct WebSocketSender {
	sink: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>,
}

impl Transport for WebSocketSender {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			let text = serde_json::to_string(&message)?;
			self.sink.send(WsMessage::Text(text)).await?;
			Ok(())
		})
	}
}

struct WebSocketReceiver {
	source: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for WebSocketReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(frame) = self.source.next().await {
				match frame? {
					WsMessage::Text(text) => match serde_json::from_str::<Value>(&text) {
						Ok(value) => {
							if self.message_tx.send(value).is_err() {
								break;
							}
						}
						Err(error) => {
							debug!(target = "cdp.transport", %error, "dropping unparseable frame");
						}
					},
					WsMessage::Close(_) => break,
					_ => {}
				}
			}
			Ok(())
		})
	}
}
