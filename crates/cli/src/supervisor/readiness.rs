//! Readiness probing of the local control endpoint.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{GateError, Result};

/// `/json/version` response subset.
#[derive(Debug, Deserialize)]
pub struct VersionInfo {
	#[serde(rename = "webSocketDebuggerUrl")]
	pub web_socket_debugger_url: String,
	#[serde(rename = "Browser")]
	pub browser: Option<String>,
}

/// Single probe of the version endpoint on `port`.
pub async fn fetch_version(port: u16) -> Result<VersionInfo> {
	let client = reqwest::Client::builder().timeout(Duration::from_millis(400)).build()?;
	let info = client
		.get(format!("http://127.0.0.1:{port}/json/version"))
		.send()
		.await?
		.error_for_status()?
		.json::<VersionInfo>()
		.await?;
	Ok(info)
}

/// Polls the readiness endpoint until it answers 200 or `retries` run out.
/// Bounded by the attempt budget only; there is no separate wall-clock
/// deadline.
pub async fn await_readiness(port: u16, retries: u32, delay: Duration) -> Result<VersionInfo> {
	for attempt in 0..retries {
		if attempt > 0 {
			tokio::time::sleep(delay).await;
		}
		match fetch_version(port).await {
			Ok(info) => {
				debug!(target = "gate.supervisor", port, attempt, "control endpoint ready");
				return Ok(info);
			}
			Err(error) => {
				debug!(target = "gate.supervisor", port, attempt, %error, "control endpoint not ready");
			}
		}
	}
	Err(GateError::ReadinessTimeout { port, attempts: retries })
}

#[cfg(test)]
mod tests {
	use tokio::io::{AsyncReadExt, AsyncWriteExt};
	use tokio::net::TcpListener;

	use super::*;

	async fn serve_version_once(listener: TcpListener, body: &'static str) {
		let (mut stream, _) = listener.accept().await.unwrap();
		let mut buf = [0u8; 1024];
		let _ = stream.read(&mut buf).await;
		let response = format!(
			"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
			body.len(),
			body
		);
		stream.write_all(response.as_bytes()).await.unwrap();
	}

	#[tokio::test]
	async fn readiness_succeeds_against_live_endpoint() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();
		tokio::spawn(serve_version_once(
			listener,
			r#"{"Browser": "Chrome/126.0.0.0", "webSocketDebuggerUrl": "ws://127.0.0.1:9345/devtools/browser/abc"}"#,
		));

		let info = await_readiness(port, 3, Duration::from_millis(20)).await.unwrap();
		assert_eq!(info.web_socket_debugger_url, "ws://127.0.0.1:9345/devtools/browser/abc");
		assert_eq!(info.browser.as_deref(), Some("Chrome/126.0.0.0"));
	}

	#[tokio::test]
	async fn readiness_times_out_on_dead_port() {
		let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
		let port = listener.local_addr().unwrap().port();
		drop(listener);

		match await_readiness(port, 2, Duration::from_millis(10)).await {
			Err(GateError::ReadinessTimeout { port: reported, attempts }) => {
				assert_eq!(reported, port);
				assert_eq!(attempts, 2);
			}
			other => panic!("expected readiness timeout, got {other:?}"),
		}
	}
}
