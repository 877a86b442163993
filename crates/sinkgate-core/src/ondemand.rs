//! On-demand gateway activation
//!
//! Collapses noisy connectivity events into stable start/stop commands. An
//! event only acts after it has survived the debounce window, so a
//! connect/disconnect/connect flap produces a single start, not three
//! transitions. The state machine itself is synchronous and runs on one
//! control task; network events are processed strictly in arrival order.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::gateway::GatewayController;
use crate::net::{InterfaceType, NetworkState};

/// Evaluator link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No connectivity
    Disconnected,
    /// Connected on a trusted interface
    ConnectedTrusted,
    /// Connected on an untrusted interface
    ConnectedUntrusted,
}

/// Command the evaluator issues to the gateway controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayCommand {
    /// Bring the resolver/tunnel up
    Start,
    /// Tear it down
    Stop,
}

/// Debounced connectivity state machine
///
/// Pure and synchronous: [`observe`](Self::observe) records an event,
/// [`poll`](Self::poll) resolves it once the debounce deadline has passed.
/// [`drive`] wires it to a live event stream.
#[derive(Debug)]
pub struct OnDemandEvaluator {
    current: LinkState,
    pending: Option<(LinkState, Instant)>,
    debounce: Duration,
    trusted: Vec<InterfaceType>,
}

impl OnDemandEvaluator {
    /// Create an evaluator starting from `Disconnected`
    pub fn new(debounce: Duration, trusted: Vec<InterfaceType>) -> Self {
        Self {
            current: LinkState::Disconnected,
            pending: None,
            debounce,
            trusted,
        }
    }

    /// Current settled link state
    pub fn state(&self) -> LinkState {
        self.current
    }

    fn classify(&self, state: NetworkState) -> LinkState {
        if !state.connected {
            LinkState::Disconnected
        } else if self.trusted.contains(&state.interface) {
            LinkState::ConnectedTrusted
        } else {
            LinkState::ConnectedUntrusted
        }
    }

    /// Record a network event
    ///
    /// The verdict is deferred by the debounce window; a newer event
    /// replaces the pending one and restarts the window.
    pub fn observe(&mut self, state: NetworkState, now: Instant) {
        let target = self.classify(state);
        debug!(?target, "Network event observed");
        self.pending = Some((target, now + self.debounce));
    }

    /// Deadline at which `poll` will have a verdict, if an event is pending
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|(_, deadline)| deadline)
    }

    /// Resolve the pending event once its debounce window has elapsed
    pub fn poll(&mut self, now: Instant) -> Option<GatewayCommand> {
        let (target, deadline) = self.pending?;
        if now < deadline {
            return None;
        }
        self.pending = None;

        let was_connected = self.current != LinkState::Disconnected;
        self.current = target;

        match (was_connected, target) {
            (false, LinkState::ConnectedTrusted | LinkState::ConnectedUntrusted) => {
                info!(state = ?target, "Connectivity settled, starting gateway");
                Some(GatewayCommand::Start)
            }
            (true, LinkState::Disconnected) => {
                info!("Connectivity lost, stopping gateway");
                Some(GatewayCommand::Stop)
            }
            // Trust-class changes while connected keep the session running
            _ => None,
        }
    }
}

/// Drive the evaluator from a platform event stream
///
/// Runs until the stream closes. Gateway failures during these background
/// transitions are logged and surface through the controller's event
/// channel and `status()`, never through this task.
pub async fn drive(
    mut evaluator: OnDemandEvaluator,
    mut events: mpsc::Receiver<NetworkState>,
    gateway: Arc<GatewayController>,
) {
    loop {
        let deadline = evaluator.deadline().map(tokio::time::Instant::from_std);

        tokio::select! {
            event = events.recv() => match event {
                Some(state) => evaluator.observe(state, Instant::now()),
                None => break,
            },
            () = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            } => {
                match evaluator.poll(Instant::now()) {
                    Some(GatewayCommand::Start) => {
                        if let Err(e) = gateway.start().await {
                            warn!("On-demand start failed: {e}");
                        }
                    }
                    Some(GatewayCommand::Stop) => {
                        if let Err(e) = gateway.stop().await {
                            warn!("On-demand stop failed: {e}");
                        }
                    }
                    None => {}
                }
            }
        }
    }
    debug!("Network event stream closed, on-demand driver exiting");
}
