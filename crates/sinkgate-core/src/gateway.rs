//! Gateway controller
//!
//! Owns the tunnel session and serializes every control operation behind one
//! mutex: `start`, `stop` and rule updates run to completion before the next
//! begins. Background failures surface through `status()` and the event
//! channel rather than an unrelated call stack.

use parking_lot::RwLock;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dns::{EngineHandle, ResolverEngine};
use crate::error::{Error, Result};
use crate::net::{InterfaceSpec, NetworkCollaborator};
use crate::rules::RuleStore;

/// Tunnel session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    /// No session
    Idle,
    /// Session establishment in progress
    Starting,
    /// Resolver serving, routes installed
    Active,
    /// Teardown in progress
    Stopping,
    /// Establishment failed; terminal until the next explicit `start()`
    Failed,
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Stopping => "stopping",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Control-plane notifications, mirrored by `status()`
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// Session established
    Started {
        /// Rule set version the resolver came up with
        version: u64,
        /// Bound listener address
        listen: SocketAddr,
    },
    /// Session torn down
    Stopped,
    /// Establishment gave up after its bounded retries
    StartFailed {
        /// Rendered error
        message: String,
    },
    /// A new rule set version reached the running resolver
    RulesApplied {
        /// Applied version
        version: u64,
    },
}

/// Tuning knobs for session establishment
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listener bind address
    pub listen: SocketAddr,
    /// Deadline for one establishment attempt
    pub start_timeout: Duration,
    /// Attempts before giving up as Failed
    pub max_start_attempts: u32,
    /// Base backoff between attempts, doubled each retry
    pub retry_backoff: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: ([127, 0, 0, 1], 5353).into(),
            start_timeout: Duration::from_secs(10),
            max_start_attempts: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

/// Orchestrates the rule store, resolver engine and network collaborator
pub struct GatewayController {
    store: Arc<RuleStore>,
    engine: Arc<ResolverEngine>,
    network: Arc<dyn NetworkCollaborator>,
    config: GatewayConfig,
    /// Session slot; doubles as the control mutex serializing operations
    session: Mutex<Option<EngineHandle>>,
    state: RwLock<TunnelState>,
    /// Set by `stop()` so an in-flight `start()` skips its remaining retries
    teardown_requested: AtomicBool,
    events: broadcast::Sender<GatewayEvent>,
}

impl GatewayController {
    /// Create a controller; the session starts Idle
    pub fn new(
        store: Arc<RuleStore>,
        engine: Arc<ResolverEngine>,
        network: Arc<dyn NetworkCollaborator>,
        config: GatewayConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            store,
            engine,
            network,
            config,
            session: Mutex::new(None),
            state: RwLock::new(TunnelState::Idle),
            teardown_requested: AtomicBool::new(false),
            events,
        }
    }

    /// Current session state
    pub fn status(&self) -> TunnelState {
        *self.state.read()
    }

    /// Subscribe to control-plane notifications
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    /// The resolver engine this controller drives
    pub fn engine(&self) -> &Arc<ResolverEngine> {
        &self.engine
    }

    fn set_state(&self, state: TunnelState) {
        debug!(%state, "Session state");
        *self.state.write() = state;
    }

    fn emit(&self, event: GatewayEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    /// Bring the session up
    ///
    /// Accepted from Idle and Failed; a no-op when already Active. Each
    /// attempt is bounded by the start deadline; after the configured
    /// attempts the session parks in Failed until the next `start()`.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            debug!("start() ignored, session already active");
            return Ok(());
        }

        self.set_state(TunnelState::Starting);
        let mut last_error: Option<Error> = None;

        for attempt in 1..=self.config.max_start_attempts {
            if attempt > 1 {
                if self.teardown_requested.load(Ordering::SeqCst) {
                    info!("Teardown requested during start, abandoning retries");
                    self.set_state(TunnelState::Stopping);
                    return Err(Error::InvalidState {
                        operation: "start",
                        state: TunnelState::Stopping.to_string(),
                    });
                }
                let backoff = self.config.retry_backoff * 2u32.pow(attempt - 2);
                debug!(attempt, ?backoff, "Retrying start after backoff");
                tokio::time::sleep(backoff).await;
            }

            // The attempt runs on its own task so a deadline overrun does
            // not cancel it mid-installation; whatever it manages to set up
            // is reaped once the task resolves
            let mut running = tokio::spawn({
                let this = self.clone();
                async move { this.try_start().await }
            });

            match tokio::time::timeout(self.config.start_timeout, &mut running).await {
                Ok(Ok(Ok(handle))) => {
                    let version = self.engine.snapshot().version();
                    let listen = handle.local_addr();
                    *session = Some(handle);
                    self.set_state(TunnelState::Active);
                    info!(%listen, version, "Gateway active");
                    self.emit(GatewayEvent::Started { version, listen });
                    return Ok(());
                }
                Ok(Ok(Err(e))) => {
                    warn!(attempt, "Start attempt failed: {e}");
                    last_error = Some(e);
                }
                Ok(Err(e)) => {
                    let e = Error::RouteInstall(format!("start task failed: {e}"));
                    warn!(attempt, "{e}");
                    last_error = Some(e);
                }
                Err(_) => {
                    self.reap_abandoned_attempt(running);
                    let e = Error::StartTimeout {
                        elapsed: self.config.start_timeout,
                    };
                    warn!(attempt, "{e}");
                    last_error = Some(e);
                }
            }
        }

        self.set_state(TunnelState::Failed);
        let err = last_error.unwrap_or(Error::RouteInstall("no start attempts ran".to_string()));
        self.emit(GatewayEvent::StartFailed {
            message: err.to_string(),
        });
        Err(err)
    }

    /// One establishment attempt: snapshot rules, bind, install routes/DNS
    async fn try_start(&self) -> Result<EngineHandle> {
        let snapshot = self.store.active();
        self.engine.apply_snapshot(snapshot);

        let handle = self.engine.serve(self.config.listen).await?;
        let listen = handle.local_addr();
        let spec = InterfaceSpec {
            listen,
            dns_servers: vec![listen.ip()],
        };

        // Collaborator calls may block on syscalls; keep them off the
        // async workers so the start deadline can still fire
        self.run_blocking({
            let network = self.network.clone();
            let spec = spec.clone();
            move || network.install_routes(&spec)
        })
        .await?;

        if let Err(e) = self
            .run_blocking({
                let network = self.network.clone();
                move || network.set_dns_servers(&spec.dns_servers)
            })
            .await
        {
            // Dropping the handle aborts the serving tasks and frees the socket
            if let Err(undo) = self.network.remove_routes() {
                warn!("Failed to roll back routes: {undo}");
            }
            return Err(e);
        }

        Ok(handle)
    }

    /// Tear down whatever a timed-out attempt installs once it resolves
    ///
    /// The abandoned task may still finish successfully after its deadline;
    /// without this the system would be left pointing at a resolver nobody
    /// owns. If a newer start has taken the session slot in the meantime,
    /// only the late engine handle is dropped.
    fn reap_abandoned_attempt(self: &Arc<Self>, running: JoinHandle<Result<EngineHandle>>) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Ok(Ok(handle)) = running.await {
                let session = this.session.lock().await;
                drop(handle);
                if session.is_none() {
                    warn!("Start attempt completed after its deadline, tearing it down");
                    this.cleanup_network();
                }
            }
        });
    }

    /// Best-effort removal of installed DNS servers and routes
    fn cleanup_network(&self) {
        if let Err(e) = self.network.clear_dns_servers() {
            warn!("Failed to clear DNS servers: {e}");
        }
        if let Err(e) = self.network.remove_routes() {
            warn!("Failed to remove routes: {e}");
        }
    }

    async fn run_blocking<F>(&self, call: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        tokio::task::spawn_blocking(call)
            .await
            .map_err(|e| Error::RouteInstall(format!("collaborator task failed: {e}")))?
    }

    /// Tear the session down
    ///
    /// Idempotent when already Idle; issued during an in-flight `start()`
    /// it queues behind the control mutex and tears down once that attempt
    /// completes or times out.
    pub async fn stop(&self) -> Result<()> {
        self.teardown_requested.store(true, Ordering::SeqCst);
        let mut session = self.session.lock().await;
        self.teardown_requested.store(false, Ordering::SeqCst);

        let Some(mut handle) = session.take() else {
            // A failed or timed-out start may have left routes or DNS
            // settings behind; removal is idempotent, so clear them on the
            // way back to Idle
            if self.status() != TunnelState::Idle {
                self.cleanup_network();
                self.set_state(TunnelState::Idle);
            }
            debug!("stop() with no active session");
            return Ok(());
        };

        self.set_state(TunnelState::Stopping);
        handle.shutdown();
        self.cleanup_network();

        self.set_state(TunnelState::Idle);
        info!("Gateway stopped");
        self.emit(GatewayEvent::Stopped);
        Ok(())
    }

    /// Push a committed rule set version into the running resolver
    ///
    /// In-flight queries finish under the snapshot they already hold; only
    /// new queries see the update. Fails with [`Error::InvalidState`] when
    /// no session is active.
    pub async fn apply_rule_update(&self, version: u64) -> Result<()> {
        let session = self.session.lock().await;
        if session.is_none() {
            return Err(Error::InvalidState {
                operation: "apply_rule_update",
                state: self.status().to_string(),
            });
        }

        let snapshot = self.store.active();
        if snapshot.version() != version {
            debug!(
                requested = version,
                actual = snapshot.version(),
                "Active rule set is newer than the requested version"
            );
        }
        let applied = snapshot.version();
        self.engine.apply_snapshot(snapshot);
        info!(version = applied, "Rule update applied");
        self.emit(GatewayEvent::RulesApplied { version: applied });
        Ok(())
    }
}
