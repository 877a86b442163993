//! In-flight upstream query tracking
//!
//! Forwarded queries are rewritten to a fresh transaction id before they go
//! upstream, because many clients share one upstream socket. This tracker
//! remembers, per rewritten id, where the answer has to go back to and how
//! to restore it, and retires entries that outlive the upstream deadline.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A query waiting for its upstream answer
#[derive(Debug, Clone)]
pub struct PendingQuery {
    /// Client the answer goes back to
    pub client: SocketAddr,
    /// Transaction id the client used
    pub original_id: u16,
    /// Original query bytes, kept so a timeout can be answered with SERVFAIL
    pub query: Vec<u8>,
    created: Instant,
}

/// Thread-safe map of rewritten transaction id to pending query
pub struct PendingQueries {
    entries: DashMap<u16, PendingQuery>,
    timeout: Duration,
}

impl PendingQueries {
    /// Create a tracker with the given upstream deadline
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            timeout,
        }
    }

    /// Track a forwarded query under a freshly allocated transaction id
    ///
    /// Returns `None` when no free id could be found, which only happens
    /// when the 16-bit id space is effectively saturated.
    pub fn insert(&self, client: SocketAddr, original_id: u16, query: Vec<u8>) -> Option<u16> {
        for _ in 0..32 {
            let id = rand::random::<u16>();
            match self.entries.entry(id) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    slot.insert(PendingQuery {
                        client,
                        original_id,
                        query,
                        created: Instant::now(),
                    });
                    return Some(id);
                }
            }
        }
        None
    }

    /// Claim the entry for an upstream response id
    pub fn take(&self, id: u16) -> Option<PendingQuery> {
        self.entries.remove(&id).map(|(_, entry)| entry)
    }

    /// Remove and return every entry that has outlived the deadline
    pub fn expire(&self) -> Vec<PendingQuery> {
        let now = Instant::now();
        let expired: Vec<u16> = self
            .entries
            .iter()
            .filter(|e| now.duration_since(e.created) >= self.timeout)
            .map(|e| *e.key())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| self.entries.remove(&id).map(|(_, entry)| entry))
            .collect()
    }

    /// Upstream deadline entries are held for
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of queries in flight
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is in flight
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.entries.clear();
    }
}
