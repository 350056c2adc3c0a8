//! Session orchestration.
//!
//! Drives one session end to end: establish a control connection, claim the
//! single primary page, bind the gate, verify the egress identity, restore
//! cookies, release interception, and hand the page over to the target
//! application. After handoff the orchestrator keeps supervising lifecycle
//! events (extra pages, auth challenges, the browser emptying out) until the
//! browser disconnects.

use std::sync::Arc;
use std::time::Duration;

use cdp::{CdpEvent, Connection};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{GateError, Result};
use crate::gate::{GateState, PLACEHOLDER_URL, SessionGate};
use crate::lifecycle::{EstablishedSession, SessionLifecycle};
use crate::supervisor::terminate_pid;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
	/// Attempts to find a page target after attach.
	pub page_retries: u32,
	pub page_retry_delay: Duration,
	/// Kill a browser we spawned when orchestration fails. Off by default so
	/// the window stays up for diagnostics.
	pub kill_on_failure: bool,
}

impl Default for OrchestratorSettings {
	fn default() -> Self {
		Self {
			page_retries: 5,
			page_retry_delay: Duration::from_millis(500),
			kill_on_failure: false,
		}
	}
}

pub struct SessionOrchestrator {
	lifecycle: Box<dyn SessionLifecycle>,
	config: Arc<SessionConfig>,
	settings: OrchestratorSettings,
}

impl SessionOrchestrator {
	pub fn new(lifecycle: Box<dyn SessionLifecycle>, config: Arc<SessionConfig>, settings: OrchestratorSettings) -> Self {
		Self {
			lifecycle,
			config,
			settings,
		}
	}

	/// Runs one full session. Returns once the browser disconnects after a
	/// successful handoff, or with the first terminal error.
	pub async fn run(&self) -> Result<()> {
		let session = self.lifecycle.establish().await?;
		match self.coordinate(&session).await {
			Ok(()) => Ok(()),
			Err(failure) => {
				if let Some(handle) = &session.handle {
					if self.settings.kill_on_failure {
						if terminate_pid(handle.pid) {
							info!(target = "gate.orchestrator", pid = handle.pid, "terminated browser after failure");
						}
					} else {
						warn!(
							target = "gate.orchestrator",
							pid = handle.pid,
							port = handle.control_port,
							"leaving browser running for diagnostics"
						);
					}
				}
				Err(failure)
			}
		}
	}

	async fn coordinate(&self, session: &EstablishedSession) -> Result<()> {
		let connection = Arc::clone(&session.connection);

		// Subscribe before discovery so no lifecycle event slips past.
		let events = connection.subscribe("orchestrator").await;
		connection.send("Target.setDiscoverTargets", json!({ "discover": true })).await?;

		let target_id =
			acquire_primary_page(&connection, self.settings.page_retries, self.settings.page_retry_delay).await?;
		let attach = connection
			.send("Target.attachToTarget", json!({ "targetId": target_id, "flatten": true }))
			.await?;
		let session_id = attach["sessionId"]
			.as_str()
			.map(str::to_string)
			.ok_or_else(|| GateError::Config("attach reply missing sessionId".to_string()))?;
		info!(target = "gate.orchestrator", %target_id, session = %session_id, "primary page attached");

		// Viewport is cosmetic; a refusal is not worth failing the session.
		if let Err(err) = connection
			.send_to_session(
				&session_id,
				"Emulation.setDeviceMetricsOverride",
				json!({ "width": 1280, "height": 800, "deviceScaleFactor": 1, "mobile": false }),
			)
			.await
		{
			warn!(target = "gate.orchestrator", %err, "viewport override refused");
		}

		let gate = Arc::new(SessionGate::new(
			Arc::clone(&connection),
			Arc::clone(&self.config),
			session_id.clone(),
		));
		gate.bind().await?;

		let pump = tokio::spawn(pump_events(
			events,
			Arc::clone(&connection),
			Arc::clone(&gate),
			Arc::clone(&self.config),
			target_id.clone(),
		));

		// Park on the placeholder so nothing real loads while the gate holds.
		connection
			.send_to_session(&session_id, "Page.navigate", json!({ "url": PLACEHOLDER_URL }))
			.await?;

		gate.run_verification().await?;

		if !gate.restore_cookies().await {
			warn!(target = "gate.orchestrator", "continuing with a degraded session: not every cookie applied");
		}

		gate.release(std::slice::from_ref(&session_id)).await;
		connection
			.send_to_session(&session_id, "Page.navigate", json!({ "url": self.config.target_url.clone() }))
			.await?;
		info!(target = "gate.orchestrator", url = %self.config.target_url, "session handed off");

		// Keep supervising until the browser goes away.
		let _ = pump.await;
		info!(target = "gate.orchestrator", "browser disconnected; session over");
		Ok(())
	}
}

/// Finds the one page target to claim as the session's primary page. The
/// browser may still be creating its first tab, so this polls.
pub async fn acquire_primary_page(connection: &Connection, retries: u32, delay: Duration) -> Result<String> {
	for attempt in 0..retries {
		if attempt > 0 {
			tokio::time::sleep(delay).await;
		}
		let reply = connection.send("Target.getTargets", json!({})).await?;
		if let Some(target_id) = first_page_target(&reply) {
			debug!(target = "gate.orchestrator", %target_id, attempt, "primary page found");
			return Ok(target_id);
		}
	}
	Err(GateError::PageAcquisition { attempts: retries })
}

fn first_page_target(reply: &Value) -> Option<String> {
	reply["targetInfos"]
		.as_array()?
		.iter()
		.find(|info| info["type"].as_str() == Some("page"))
		.and_then(|info| info["targetId"].as_str())
		.map(str::to_string)
}

fn page_count(reply: &Value) -> usize {
	reply["targetInfos"]
		.as_array()
		.map(|infos| infos.iter().filter(|info| info["type"].as_str() == Some("page")).count())
		.unwrap_or(0)
}

/// Event loop for one session: applies the gate to paused requests, answers
/// proxy auth challenges, enforces the single-primary-page policy, and closes
/// the browser once its last page is gone. Ends when the connection closes.
async fn pump_events(
	mut events: mpsc::UnboundedReceiver<CdpEvent>,
	connection: Arc<Connection>,
	gate: Arc<SessionGate>,
	config: Arc<SessionConfig>,
	primary_target_id: String,
) {
	while let Some(event) = events.recv().await {
		match event.method.as_str() {
			"Fetch.requestPaused" => {
				let Some(session_id) = event.session_id.as_deref() else {
					continue;
				};
				if let Err(err) = gate.handle_paused_request(session_id, &event.params).await {
					// The page may have gone away between pause and verdict.
					debug!(target = "gate.orchestrator", %err, "paused request verdict failed");
				}
			}
			"Fetch.authRequired" => {
				let Some(session_id) = event.session_id.as_deref() else {
					continue;
				};
				answer_auth_challenge(&connection, session_id, &event.params, &config).await;
			}
			"Target.targetCreated" => {
				let info = &event.params["targetInfo"];
				let is_foreign_page =
					info["type"].as_str() == Some("page") && info["targetId"].as_str() != Some(primary_target_id.as_str());
				if is_foreign_page && gate.state() != GateState::Verified {
					let target_id = info["targetId"].as_str().unwrap_or_default();
					info!(target = "gate.orchestrator", %target_id, "closing extra page before handoff");
					if let Err(err) = connection.send("Target.closeTarget", json!({ "targetId": target_id })).await {
						warn!(target = "gate.orchestrator", %err, "could not close extra page");
					}
				}
			}
			"Target.targetDestroyed" => match connection.send("Target.getTargets", json!({})).await {
				Ok(reply) => {
					if page_count(&reply) == 0 {
						info!(target = "gate.orchestrator", "no pages left; closing browser");
						if let Err(err) = connection.send("Browser.close", json!({})).await {
							debug!(target = "gate.orchestrator", %err, "browser close refused");
						}
					}
				}
				Err(err) => {
					debug!(target = "gate.orchestrator", %err, "target census failed after destroy");
				}
			},
			_ => {}
		}
	}
}

async fn answer_auth_challenge(connection: &Connection, session_id: &str, params: &Value, config: &SessionConfig) {
	let request_id = params["requestId"].as_str().unwrap_or_default();
	let response = match (&config.proxy_config.username, &config.proxy_config.password) {
		(Some(username), Some(password)) => json!({
			"response": "ProvideCredentials",
			"username": username,
			"password": password,
		}),
		_ => json!({ "response": "Default" }),
	};
	if let Err(err) = connection
		.send_to_session(
			session_id,
			"Fetch.continueWithAuth",
			json!({ "requestId": request_id, "authChallengeResponse": response }),
		)
		.await
	{
		warn!(target = "gate.orchestrator", %err, "auth challenge answer failed");
	} else {
		debug!(target = "gate.orchestrator", "answered proxy auth challenge");
	}
}

#[cfg(test)]
mod tests {
	use cdp::testing::{FakeTransportBuilder, FakeTransportController};

	use super::*;
	use crate::config::{ProxyConfig, SessionConfig};

	fn spawn_connection() -> (Arc<Connection>, Arc<FakeTransportController>) {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let connection = Arc::new(Connection::new(parts));
		let runner = Arc::clone(&connection);
		tokio::spawn(async move { runner.run().await });
		(connection, Arc::new(controller))
	}

	fn test_config() -> Arc<SessionConfig> {
		Arc::new(SessionConfig {
			proxy_config: ProxyConfig {
				server: "proxy.example.com:8000".to_string(),
				username: Some("user".to_string()),
				password: Some("pass".to_string()),
				expected_ip: "198.51.100.7".to_string(),
			},
			cookies: Vec::new(),
			ip_checker_url: "https://ip.example.com/api".to_string(),
			target_url: "https://chatgpt.com/".to_string(),
		})
	}

	/// Replies `{}` to every command the connection sends, in arrival order.
	fn auto_respond(controller: Arc<FakeTransportController>) -> tokio::task::JoinHandle<()> {
		tokio::spawn(async move {
			let mut answered = 0u64;
			loop {
				controller.wait_for_sent((answered + 1) as usize).await;
				answered += 1;
				controller.inject_response(answered, json!({}));
			}
		})
	}

	#[tokio::test]
	async fn primary_page_acquisition_retries_until_a_page_appears() {
		let (connection, controller) = spawn_connection();

		let pending = {
			let connection = Arc::clone(&connection);
			tokio::spawn(
				async move { acquire_primary_page(&connection, 5, Duration::from_millis(5)).await },
			)
		};

		controller.wait_for_sent(1).await;
		controller.inject_response(1, json!({ "targetInfos": [] }));
		controller.wait_for_sent(2).await;
		controller.inject_response(
			2,
			json!({ "targetInfos": [
				{ "type": "background_page", "targetId": "EXT1" },
				{ "type": "page", "targetId": "PAGE1" },
			] }),
		);

		let target_id = pending.await.unwrap().unwrap();
		assert_eq!(target_id, "PAGE1");
	}

	#[tokio::test]
	async fn primary_page_acquisition_gives_up_after_the_attempt_budget() {
		let (connection, controller) = spawn_connection();

		let pending = {
			let connection = Arc::clone(&connection);
			tokio::spawn(
				async move { acquire_primary_page(&connection, 2, Duration::from_millis(5)).await },
			)
		};

		for id in 1..=2 {
			controller.wait_for_sent(id as usize).await;
			controller.inject_response(id, json!({ "targetInfos": [] }));
		}

		match pending.await.unwrap() {
			Err(GateError::PageAcquisition { attempts: 2 }) => {}
			other => panic!("expected page acquisition failure, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn extra_pages_are_closed_before_handoff() {
		let (connection, controller) = spawn_connection();
		let events = connection.subscribe("orchestrator").await;
		let gate = Arc::new(SessionGate::new(Arc::clone(&connection), test_config(), "S1".to_string()));

		let responder = auto_respond(Arc::clone(&controller));
		let pump = tokio::spawn(pump_events(
			events,
			Arc::clone(&connection),
			gate,
			test_config(),
			"PAGE1".to_string(),
		));

		controller.inject_event(
			"Target.targetCreated",
			json!({ "targetInfo": { "type": "page", "targetId": "PAGE2" } }),
			None,
		);
		// The primary page and non-page targets are left alone.
		controller.inject_event(
			"Target.targetCreated",
			json!({ "targetInfo": { "type": "page", "targetId": "PAGE1" } }),
			None,
		);
		controller.inject_event(
			"Target.targetCreated",
			json!({ "targetInfo": { "type": "background_page", "targetId": "EXT1" } }),
			None,
		);

		controller.wait_for_sent(1).await;
		let sent = controller.take_sent().await;
		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0]["method"], "Target.closeTarget");
		assert_eq!(sent[0]["params"]["targetId"], "PAGE2");

		controller.close();
		let _ = pump.await;
		responder.abort();
	}

	#[tokio::test]
	async fn empty_browser_is_closed_after_last_page_destroyed() {
		let (connection, controller) = spawn_connection();
		let events = connection.subscribe("orchestrator").await;
		let gate = Arc::new(SessionGate::new(Arc::clone(&connection), test_config(), "S1".to_string()));

		let pump = tokio::spawn(pump_events(
			events,
			Arc::clone(&connection),
			gate,
			test_config(),
			"PAGE1".to_string(),
		));

		controller.inject_event("Target.targetDestroyed", json!({ "targetId": "PAGE1" }), None);

		// The census finds only the extension's background page.
		controller.wait_for_sent(1).await;
		controller.inject_response(1, json!({ "targetInfos": [{ "type": "background_page", "targetId": "EXT1" }] }));

		controller.wait_for_sent(2).await;
		let sent = controller.take_sent().await;
		assert_eq!(sent[0]["method"], "Target.getTargets");
		assert_eq!(sent[1]["method"], "Browser.close");

		controller.inject_response(2, json!({}));
		controller.close();
		let _ = pump.await;
	}

	#[tokio::test]
	async fn auth_challenges_get_the_configured_credentials() {
		let (connection, controller) = spawn_connection();
		let events = connection.subscribe("orchestrator").await;
		let config = test_config();
		let gate = Arc::new(SessionGate::new(Arc::clone(&connection), Arc::clone(&config), "S1".to_string()));

		let pump = tokio::spawn(pump_events(
			events,
			Arc::clone(&connection),
			gate,
			config,
			"PAGE1".to_string(),
		));

		controller.inject_event(
			"Fetch.authRequired",
			json!({ "requestId": "R1", "authChallenge": { "source": "Proxy" } }),
			Some("S1"),
		);

		controller.wait_for_sent(1).await;
		let sent = controller.take_sent().await;
		assert_eq!(sent[0]["method"], "Fetch.continueWithAuth");
		assert_eq!(sent[0]["sessionId"], "S1");
		assert_eq!(sent[0]["params"]["authChallengeResponse"]["response"], "ProvideCredentials");
		assert_eq!(sent[0]["params"]["authChallengeResponse"]["username"], "user");

		controller.inject_response(1, json!({}));
		controller.close();
		let _ = pump.await;
	}
}
