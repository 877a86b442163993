//! Resolver engine
//!
//! The hot path of the gateway: a UDP listener that decides per query
//! whether to sinkhole or forward. Every query is handled on its own task;
//! the only shared state is the copy-on-write rule snapshot, the in-flight
//! tracker and the sockets themselves.

use parking_lot::RwLock;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dns::message;
use crate::dns::pending::PendingQueries;
use crate::error::{Error, Result};
use crate::rules::{RuleAction, RuleSet};

/// Maximum datagram we accept; large enough for EDNS payloads
const MAX_DATAGRAM: usize = 4096;

/// How often the sweeper retires timed-out upstream queries
const SWEEP_INTERVAL: Duration = Duration::from_millis(250);

/// Outcome of matching a query name against the active rule set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Answer with a synthetic NXDOMAIN, never contact upstream
    Block,
    /// Relay the query to the upstream resolver verbatim
    Forward,
}

/// Upstream resolver settings
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Upstream resolver address
    pub addr: SocketAddr,
    /// Deadline for an upstream answer
    pub timeout: Duration,
}

/// Counters for the serving loops
#[derive(Debug, Default)]
pub struct EngineStats {
    queries: AtomicU64,
    blocked: AtomicU64,
    forwarded: AtomicU64,
    timeouts: AtomicU64,
}

impl EngineStats {
    /// Total queries parsed
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    /// Queries answered with NXDOMAIN
    pub fn blocked(&self) -> u64 {
        self.blocked.load(Ordering::Relaxed)
    }

    /// Queries relayed upstream
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Forwards retired with SERVFAIL after the upstream deadline
    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }
}

/// DNS-intercepting resolver with copy-on-write rule snapshots
pub struct ResolverEngine {
    snapshot: RwLock<Arc<RuleSet>>,
    pending: PendingQueries,
    upstream: UpstreamConfig,
    stats: EngineStats,
}

impl ResolverEngine {
    /// Create an engine with an empty rule snapshot
    pub fn new(upstream: UpstreamConfig) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(RuleSet::empty())),
            pending: PendingQueries::new(upstream.timeout),
            upstream,
            stats: EngineStats::default(),
        }
    }

    /// Swap the rule snapshot
    ///
    /// Queries already dispatched keep the `Arc` they cloned and finish
    /// under the old version; only new queries see the update.
    pub fn apply_snapshot(&self, set: Arc<RuleSet>) {
        debug!(version = set.version(), rules = set.len(), "Applied rule snapshot");
        *self.snapshot.write() = set;
    }

    /// Current rule snapshot
    pub fn snapshot(&self) -> Arc<RuleSet> {
        self.snapshot.read().clone()
    }

    /// Serving counters
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Decide for a single query name against the current snapshot
    pub fn decide(&self, name: &str) -> Decision {
        Self::decide_with(&self.snapshot(), name)
    }

    fn decide_with(set: &RuleSet, name: &str) -> Decision {
        match set.decide(name) {
            Some(rule) if rule.action == RuleAction::Block => Decision::Block,
            // Allow rules and unmatched names both forward
            _ => Decision::Forward,
        }
    }

    /// Bind the listener and upstream sockets and spawn the serving tasks
    pub async fn serve(self: &Arc<Self>, listen: SocketAddr) -> Result<EngineHandle> {
        let socket = UdpSocket::bind(listen).await.map_err(|e| Error::Bind {
            addr: listen.to_string(),
            message: e.to_string(),
        })?;
        let local = socket.local_addr()?;
        let socket = Arc::new(socket);

        let bind_any: SocketAddr = if self.upstream.addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let upstream_socket = UdpSocket::bind(bind_any).await?;
        upstream_socket.connect(self.upstream.addr).await?;
        let upstream_socket = Arc::new(upstream_socket);

        info!(
            listen = %local,
            upstream = %self.upstream.addr,
            "Resolver engine listening"
        );

        let tasks = vec![
            tokio::spawn(Self::client_loop(
                self.clone(),
                socket.clone(),
                upstream_socket.clone(),
            )),
            tokio::spawn(Self::upstream_loop(
                self.clone(),
                socket.clone(),
                upstream_socket,
            )),
            tokio::spawn(Self::sweep_loop(self.clone(), socket)),
        ];

        Ok(EngineHandle { local, tasks })
    }

    async fn client_loop(
        engine: Arc<Self>,
        socket: Arc<UdpSocket>,
        upstream_socket: Arc<UdpSocket>,
    ) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, peer) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    debug!("Listener receive error: {e}");
                    continue;
                }
            };

            let query = buf[..len].to_vec();
            let engine = engine.clone();
            let socket = socket.clone();
            let upstream_socket = upstream_socket.clone();
            tokio::spawn(async move {
                engine.handle_query(query, peer, socket, upstream_socket).await;
            });
        }
    }

    async fn handle_query(
        self: Arc<Self>,
        mut query: Vec<u8>,
        peer: SocketAddr,
        socket: Arc<UdpSocket>,
        upstream_socket: Arc<UdpSocket>,
    ) {
        let question = match message::parse_question(&query) {
            Ok(question) => question,
            Err(e) => {
                debug!(%peer, "Dropping malformed query: {e}");
                return;
            }
        };
        self.stats.queries.fetch_add(1, Ordering::Relaxed);

        let snapshot = self.snapshot();
        match Self::decide_with(&snapshot, &question.name) {
            Decision::Block => {
                self.stats.blocked.fetch_add(1, Ordering::Relaxed);
                debug!(
                    name = %question.name,
                    version = snapshot.version(),
                    "Sinkholing query"
                );
                match message::nxdomain_response(&query) {
                    Ok(reply) => {
                        if let Err(e) = socket.send_to(&reply, peer).await {
                            debug!(%peer, "Failed to send NXDOMAIN: {e}");
                        }
                    }
                    Err(e) => debug!(%peer, "Failed to build NXDOMAIN: {e}"),
                }
            }
            Decision::Forward => {
                let Some(upstream_id) = self.pending.insert(peer, question.id, query.clone())
                else {
                    warn!("Pending query table saturated, answering SERVFAIL");
                    self.answer_servfail(&socket, &query, peer).await;
                    return;
                };

                self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
                message::set_transaction_id(&mut query, upstream_id);
                if let Err(e) = upstream_socket.send(&query).await {
                    warn!("Upstream send failed: {e}");
                    if let Some(entry) = self.pending.take(upstream_id) {
                        self.answer_servfail(&socket, &entry.query, entry.client).await;
                    }
                }
            }
        }
    }

    async fn upstream_loop(
        engine: Arc<Self>,
        socket: Arc<UdpSocket>,
        upstream_socket: Arc<UdpSocket>,
    ) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let len = match upstream_socket.recv(&mut buf).await {
                Ok(len) => len,
                Err(e) => {
                    debug!("Upstream receive error: {e}");
                    continue;
                }
            };

            let Some(id) = message::transaction_id(&buf[..len]) else {
                continue;
            };
            let Some(entry) = engine.pending.take(id) else {
                debug!("Unmatched upstream response, id {id:#06x}");
                continue;
            };

            // Relay the answer verbatim, restoring the client's id
            let mut reply = buf[..len].to_vec();
            message::set_transaction_id(&mut reply, entry.original_id);
            if let Err(e) = socket.send_to(&reply, entry.client).await {
                debug!(client = %entry.client, "Failed to relay answer: {e}");
            }
        }
    }

    async fn sweep_loop(engine: Arc<Self>, socket: Arc<UdpSocket>) {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            for entry in engine.pending.expire() {
                engine.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                let err = Error::UpstreamTimeout {
                    elapsed: engine.pending.timeout(),
                };
                // A timeout is a forward failure, never a block
                warn!(client = %entry.client, "{err}");
                engine.answer_servfail(&socket, &entry.query, entry.client).await;
            }
        }
    }

    async fn answer_servfail(&self, socket: &UdpSocket, query: &[u8], client: SocketAddr) {
        match message::servfail_response(query) {
            Ok(reply) => {
                if let Err(e) = socket.send_to(&reply, client).await {
                    debug!(%client, "Failed to send SERVFAIL: {e}");
                }
            }
            Err(e) => debug!(%client, "Failed to build SERVFAIL: {e}"),
        }
    }
}

/// Handle to a running engine's serving tasks
///
/// Dropping the handle aborts the tasks and releases the sockets.
pub struct EngineHandle {
    local: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineHandle {
    /// Address the listener actually bound (relevant with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Abort the serving tasks
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{DomainRule, RuleStore};

    fn upstream() -> UpstreamConfig {
        UpstreamConfig {
            addr: "127.0.0.1:53".parse().unwrap(),
            timeout: Duration::from_secs(3),
        }
    }

    fn snapshot(patterns: &[(&str, RuleAction)]) -> Arc<RuleSet> {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::open(dir.path().join("rules.json")).unwrap();
        let rules = patterns
            .iter()
            .map(|(p, a)| DomainRule::parse(p, *a).unwrap())
            .collect();
        store.commit(rules).unwrap();
        store.active()
    }

    #[test]
    fn test_decide_empty_snapshot_forwards() {
        let engine = ResolverEngine::new(upstream());
        assert_eq!(engine.decide("anything.example.com"), Decision::Forward);
    }

    #[test]
    fn test_decide_block_and_allow() {
        let engine = ResolverEngine::new(upstream());
        engine.apply_snapshot(snapshot(&[
            ("*.example.com", RuleAction::Block),
            ("mail.example.com", RuleAction::Allow),
        ]));

        assert_eq!(engine.decide("api.example.com"), Decision::Block);
        assert_eq!(engine.decide("mail.example.com"), Decision::Forward);
        assert_eq!(engine.decide("unrelated.org"), Decision::Forward);
    }

    #[test]
    fn test_apply_snapshot_swaps_version() {
        let engine = ResolverEngine::new(upstream());
        assert_eq!(engine.snapshot().version(), 0);

        engine.apply_snapshot(snapshot(&[("ads.example.com", RuleAction::Block)]));
        assert_eq!(engine.decide("ads.example.com"), Decision::Block);

        // Old snapshot held by a reader stays valid after the swap
        let old = engine.snapshot();
        engine.apply_snapshot(Arc::new(RuleSet::empty()));
        assert_eq!(engine.decide("ads.example.com"), Decision::Forward);
        assert!(old.decide("ads.example.com").is_some());
    }
}
