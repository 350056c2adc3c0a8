//! Lifecycle strategy selection.
//!
//! Two ways to obtain a control connection share one interface: spawn-and-own
//! a detached process, or attach to a browser that is already running with
//! remote debugging. Callers pick a strategy; the gate and extension layers
//! are shared either way.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdp::Connection;

use crate::error::Result;
use crate::supervisor::{BrowserProcessHandle, ProcessSupervisor, await_readiness, connect_control};

/// Established control connection plus the process handle when we own one.
pub struct EstablishedSession {
	pub connection: Arc<Connection>,
	/// `None` when attached to a process this program did not spawn.
	pub handle: Option<BrowserProcessHandle>,
}

#[async_trait]
pub trait SessionLifecycle: Send + Sync {
	async fn establish(&self) -> Result<EstablishedSession>;
}

/// Full supervisor flow: kill stale, allocate, spawn, await, connect.
pub struct OwnedLaunch {
	supervisor: ProcessSupervisor,
}

impl OwnedLaunch {
	pub fn new(supervisor: ProcessSupervisor) -> Self {
		Self { supervisor }
	}
}

#[async_trait]
impl SessionLifecycle for OwnedLaunch {
	async fn establish(&self) -> Result<EstablishedSession> {
		let outcome = self.supervisor.launch().await?;
		Ok(EstablishedSession {
			connection: outcome.connection,
			handle: Some(outcome.handle),
		})
	}
}

/// Attach to an already-running instance on a known control port. No stale
/// kill and no spawn; the process belongs to someone else.
pub struct AttachExisting {
	port: u16,
}

impl AttachExisting {
	pub fn new(port: u16) -> Self {
		Self { port }
	}
}

#[async_trait]
impl SessionLifecycle for AttachExisting {
	async fn establish(&self) -> Result<EstablishedSession> {
		let version = await_readiness(self.port, 5, Duration::from_millis(200)).await?;
		let connection = connect_control(&version).await?;
		Ok(EstablishedSession { connection, handle: None })
	}
}
