//! Per-session request gate.
//!
//! One state machine per session, not per page: `Blocked → Verifying →
//! {Verified | Failed}`. While the gate is closed, the only traffic allowed
//! out is the verification call itself and navigation to the neutral
//! placeholder; everything else is aborted. Cookies are applied strictly
//! after `Verified`, and a cookie failure degrades the session without
//! re-closing the gate.

use std::sync::Arc;
use std::sync::Mutex;

use cdp::{CdpSession, Connection};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{GateError, Result};

mod overlay;

/// Navigation target that is always allowed while the gate is closed.
pub const PLACEHOLDER_URL: &str = "about:blank";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
	Blocked,
	Verifying,
	Verified,
	Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptDecision {
	Continue,
	Abort,
}

/// Pure gate policy for one intercepted request. Fail closed: before
/// `Verified` nothing loads except the checker call and the placeholder.
pub fn decide(state: GateState, url: &str, is_navigation: bool, ip_checker_url: &str) -> InterceptDecision {
	match state {
		GateState::Verified => InterceptDecision::Continue,
		GateState::Blocked | GateState::Verifying => {
			if url == ip_checker_url {
				InterceptDecision::Continue
			} else if is_navigation && url == PLACEHOLDER_URL {
				InterceptDecision::Continue
			} else {
				InterceptDecision::Abort
			}
		}
		GateState::Failed => InterceptDecision::Abort,
	}
}

/// Gate bound to the session's primary page.
pub struct SessionGate {
	connection: Arc<Connection>,
	config: Arc<SessionConfig>,
	primary: CdpSession,
	state: Mutex<GateState>,
}

impl SessionGate {
	pub fn new(connection: Arc<Connection>, config: Arc<SessionConfig>, primary_session_id: String) -> Self {
		let primary = CdpSession::new(Arc::clone(&connection), primary_session_id);
		Self {
			connection,
			config,
			primary,
			state: Mutex::new(GateState::Blocked),
		}
	}

	pub fn state(&self) -> GateState {
		*self.state.lock().expect("gate state lock")
	}

	fn set_state(&self, next: GateState) {
		*self.state.lock().expect("gate state lock") = next;
	}

	pub fn primary_session_id(&self) -> &str {
		self.primary.session_id()
	}

	/// Enables full request interception on the primary page.
	pub async fn bind(&self) -> Result<()> {
		self.primary
			.send(
				"Fetch.enable",
				json!({
					"patterns": [{ "urlPattern": "*" }],
					"handleAuthRequests": self.config.proxy_config.username.is_some(),
				}),
			)
			.await?;
		debug!(target = "gate", session = self.primary.session_id(), "interception enabled");
		Ok(())
	}

	/// Applies the gate policy to one `Fetch.requestPaused` event.
	pub async fn handle_paused_request(&self, session_id: &str, params: &Value) -> Result<()> {
		let request_id = params["requestId"].as_str().unwrap_or_default();
		let url = params["request"]["url"].as_str().unwrap_or_default();
		let is_navigation = params["resourceType"].as_str() == Some("Document");

		match decide(self.state(), url, is_navigation, &self.config.ip_checker_url) {
			InterceptDecision::Continue => {
				self.connection
					.send_to_session(session_id, "Fetch.continueRequest", json!({ "requestId": request_id }))
					.await?;
			}
			InterceptDecision::Abort => {
				debug!(target = "gate", %url, "aborting request while gate is closed");
				self.connection
					.send_to_session(
						session_id,
						"Fetch.failRequest",
						json!({ "requestId": request_id, "errorReason": "Aborted" }),
					)
					.await?;
			}
		}
		Ok(())
	}

	/// Runs the IP-ownership check from page context. Exact match or nothing:
	/// a mismatch means the proxy identity is wrong and is not retried.
	pub async fn run_verification(&self) -> Result<String> {
		self.set_state(GateState::Verifying);
		self.evaluate_advisory(&overlay::blocking_overlay_js()).await;

		let observed = match self.fetch_egress_ip().await {
			Ok(ip) => ip,
			Err(error) => {
				self.set_state(GateState::Failed);
				return Err(error);
			}
		};

		if observed != self.config.proxy_config.expected_ip {
			self.set_state(GateState::Failed);
			return Err(GateError::IpVerificationMismatch {
				expected: self.config.proxy_config.expected_ip.clone(),
				actual: observed,
			});
		}

		self.set_state(GateState::Verified);
		info!(target = "gate", ip = %observed, "egress identity verified");
		self.evaluate_advisory(&overlay::success_overlay_js(&observed)).await;
		Ok(observed)
	}

	async fn fetch_egress_ip(&self) -> Result<String> {
		let result = self
			.primary
			.send(
				"Runtime.evaluate",
				json!({
					"expression": overlay::ip_probe_js(&self.config.ip_checker_url),
					"awaitPromise": true,
					"returnByValue": true,
				}),
			)
			.await
			.map_err(|error| GateError::VerificationUnavailable(error.to_string()))?;

		result["result"]["value"]["data"]["ip"]
			.as_str()
			.map(str::to_string)
			.ok_or_else(|| GateError::VerificationUnavailable("checker response missing data.ip".to_string()))
	}

	/// Clears the cookie store and applies the configured records in order.
	/// Returns whether every record applied; failures degrade the session but
	/// never re-close the gate.
	pub async fn restore_cookies(&self) -> bool {
		if self.state() != GateState::Verified {
			warn!(target = "gate.cookies", state = ?self.state(), "cookie restore refused before verification");
			return false;
		}

		for prelude in ["Network.enable", "Network.clearBrowserCookies"] {
			if let Err(error) = self.primary.send(prelude, json!({})).await {
				warn!(target = "gate.cookies", method = prelude, %error, "cookie restore could not start");
				return false;
			}
		}

		let mut all_applied = true;
		for cookie in &self.config.cookies {
			if let Err(error) = self.primary.send("Network.setCookie", cookie.to_cdp_params()).await {
				warn!(target = "gate.cookies", cookie = %cookie.name, %error, "cookie injection failed; continuing");
				all_applied = false;
			}
		}
		info!(
			target = "gate.cookies",
			total = self.config.cookies.len(),
			complete = all_applied,
			"cookie restore finished"
		);
		all_applied
	}

	/// Releases interception on every given page session. `Fetch.disable`
	/// resumes anything still paused, and once `Verified` the handler lets
	/// everything through anyway, so no page stays stuck.
	pub async fn release(&self, page_session_ids: &[String]) {
		for session_id in page_session_ids {
			if let Err(error) = self.connection.send_to_session(session_id, "Fetch.disable", json!({})).await {
				warn!(target = "gate", %session_id, %error, "failed to release interception");
			}
		}
	}

	/// Overlay updates are advisory: failures are logged, never fatal.
	async fn evaluate_advisory(&self, expression: &str) {
		let result = self
			.primary
			.send("Runtime.evaluate", json!({ "expression": expression, "returnByValue": false }))
			.await;
		if let Err(error) = result {
			warn!(target = "gate", %error, "overlay update failed; continuing");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const CHECKER: &str = "https://ip.example.com/api";

	#[test]
	fn blocked_aborts_foreign_navigation() {
		let decision = decide(GateState::Blocked, "https://chatgpt.com/", true, CHECKER);
		assert_eq!(decision, InterceptDecision::Abort);
	}

	#[test]
	fn blocked_allows_placeholder_navigation() {
		let decision = decide(GateState::Blocked, PLACEHOLDER_URL, true, CHECKER);
		assert_eq!(decision, InterceptDecision::Continue);
	}

	#[test]
	fn verifying_allows_only_the_checker_call() {
		assert_eq!(decide(GateState::Verifying, CHECKER, false, CHECKER), InterceptDecision::Continue);
		assert_eq!(
			decide(GateState::Verifying, "https://cdn.example.com/app.js", false, CHECKER),
			InterceptDecision::Abort
		);
	}

	#[test]
	fn blocked_aborts_subresources_fail_closed() {
		let decision = decide(GateState::Blocked, "https://fonts.example.com/a.woff2", false, CHECKER);
		assert_eq!(decision, InterceptDecision::Abort);
	}

	#[test]
	fn verified_continues_everything() {
		assert_eq!(
			decide(GateState::Verified, "https://chatgpt.com/", true, CHECKER),
			InterceptDecision::Continue
		);
		assert_eq!(
			decide(GateState::Verified, "https://cdn.example.com/app.js", false, CHECKER),
			InterceptDecision::Continue
		);
	}

	#[test]
	fn failed_aborts_even_the_checker() {
		assert_eq!(decide(GateState::Failed, CHECKER, false, CHECKER), InterceptDecision::Abort);
	}

	mod wire {
		use cdp::testing::FakeTransportBuilder;

		use super::*;
		use crate::config::{ProxyConfig, SessionConfig};

		fn gate_on_fake_wire() -> (Arc<SessionGate>, cdp::testing::FakeTransportController) {
			let (parts, controller) = FakeTransportBuilder::new().build();
			let connection = Arc::new(Connection::new(parts));
			let runner = Arc::clone(&connection);
			tokio::spawn(async move { runner.run().await });

			let config = Arc::new(SessionConfig {
				proxy_config: ProxyConfig {
					server: "proxy.example.net:8000".to_string(),
					username: None,
					password: None,
					expected_ip: "198.51.100.7".to_string(),
				},
				cookies: vec![],
				ip_checker_url: CHECKER.to_string(),
				target_url: "https://app.example.com/".to_string(),
			});
			let gate = Arc::new(SessionGate::new(connection, config, "S1".to_string()));
			(gate, controller)
		}

		#[tokio::test]
		async fn cookie_restore_refuses_before_verification() {
			let (gate, controller) = gate_on_fake_wire();
			assert_eq!(gate.state(), GateState::Blocked);
			assert!(!gate.restore_cookies().await);
			assert_eq!(controller.sent_count(), 0);
		}

		#[tokio::test]
		async fn blocked_request_is_failed_on_the_wire() {
			let (gate, controller) = gate_on_fake_wire();

			let verdict = {
				let gate = Arc::clone(&gate);
				tokio::spawn(async move {
					let params = serde_json::json!({
						"requestId": "R1",
						"request": { "url": "https://app.example.com/asset.js" },
						"resourceType": "Script",
					});
					gate.handle_paused_request("S1", &params).await
				})
			};

			controller.wait_for_sent(1).await;
			let sent = controller.take_sent().await;
			assert_eq!(sent[0]["method"], "Fetch.failRequest");
			assert_eq!(sent[0]["params"]["errorReason"], "Aborted");
			assert_eq!(sent[0]["sessionId"], "S1");

			controller.inject_response(1, serde_json::json!({}));
			verdict.await.unwrap().unwrap();
		}

		#[tokio::test]
		async fn bind_skips_auth_handling_without_credentials() {
			let (gate, controller) = gate_on_fake_wire();

			let bound = {
				let gate = Arc::clone(&gate);
				tokio::spawn(async move { gate.bind().await })
			};

			controller.wait_for_sent(1).await;
			let sent = controller.take_sent().await;
			assert_eq!(sent[0]["method"], "Fetch.enable");
			assert_eq!(sent[0]["params"]["handleAuthRequests"], false);
			assert_eq!(sent[0]["params"]["patterns"][0]["urlPattern"], "*");

			controller.inject_response(1, serde_json::json!({}));
			bound.await.unwrap().unwrap();
		}
	}
}
