//! Versioned rule storage
//!
//! A commit validates the incoming rules, persists the new version to durable
//! storage (write-ahead: temp file + rename) and only then swaps the active
//! pointer. Readers clone an `Arc` and always observe a complete version;
//! snapshots held by in-flight queries stay valid until dropped.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::rules::matcher::DomainMatcher;
use crate::rules::pattern::{normalize_name, DomainRule};

/// Immutable, versioned collection of domain rules
///
/// Carries a prebuilt suffix-trie matcher so lookups never scan the rule list.
#[derive(Debug)]
pub struct RuleSet {
    version: u64,
    rules: Vec<DomainRule>,
    matcher: DomainMatcher,
}

impl RuleSet {
    /// The empty rule set at version 0
    pub fn empty() -> Self {
        Self::with_version(0, Vec::new())
    }

    fn with_version(version: u64, rules: Vec<DomainRule>) -> Self {
        let matcher = DomainMatcher::build(&rules);
        Self {
            version,
            rules,
            matcher,
        }
    }

    /// Monotonic version of this rule set
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Ordered rule sequence
    pub fn rules(&self) -> &[DomainRule] {
        &self.rules
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set holds no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The winning rule for a query name, if any
    ///
    /// The name is normalized before matching.
    pub fn decide(&self, name: &str) -> Option<&DomainRule> {
        let name = normalize_name(name);
        self.matcher.lookup(&name).map(|m| &self.rules[m.index])
    }

    /// Whether a normalized pattern is present in this set
    pub fn contains(&self, pattern: &str) -> bool {
        self.rules.iter().any(|r| r.pattern == pattern)
    }
}

/// On-disk layout: ordered records plus the version counter
#[derive(Debug, Serialize, Deserialize)]
struct PersistedRules {
    version: u64,
    rules: Vec<DomainRule>,
}

/// Durable, copy-on-write rule store
///
/// Commits are serialized behind a writer mutex; `active()` never blocks on
/// a writer because the pointer swap is atomic.
pub struct RuleStore {
    path: PathBuf,
    active: RwLock<Arc<RuleSet>>,
    writer: Mutex<()>,
}

impl RuleStore {
    /// Open a store, loading the persisted rule set when the file exists
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let initial = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let persisted: PersistedRules = serde_json::from_str(&content)?;
            info!(
                version = persisted.version,
                rules = persisted.rules.len(),
                "Loaded rule set from {}",
                path.display()
            );
            RuleSet::with_version(persisted.version, persisted.rules)
        } else {
            debug!("No rule file at {}, starting empty", path.display());
            RuleSet::empty()
        };

        Ok(Self {
            path,
            active: RwLock::new(Arc::new(initial)),
            writer: Mutex::new(()),
        })
    }

    /// Snapshot of the active rule set
    pub fn active(&self) -> Arc<RuleSet> {
        self.active.read().clone()
    }

    /// Version of the active rule set
    pub fn version(&self) -> u64 {
        self.active.read().version()
    }

    /// Commit a full replacement rule sequence as the next version
    ///
    /// Fails with [`Error::InvalidRule`] on a duplicate normalized pattern
    /// and with [`Error::Persistence`] when the storage write fails; in both
    /// cases the previously active set stays in place, untouched.
    pub fn commit(&self, rules: Vec<DomainRule>) -> Result<u64> {
        let _writer = self.writer.lock();
        self.commit_locked(rules)
    }

    /// Derive the next version from the current one, atomically
    ///
    /// The writer lock is held across the read and the commit, so two
    /// concurrent updates can never base themselves on the same version and
    /// silently drop each other's rules. An error from `mutate` aborts the
    /// update with the active set untouched.
    pub fn update<F>(&self, mutate: F) -> Result<u64>
    where
        F: FnOnce(&RuleSet) -> Result<Vec<DomainRule>>,
    {
        let _writer = self.writer.lock();
        let current = self.active.read().clone();
        let rules = mutate(&current)?;
        self.commit_locked(rules)
    }

    fn commit_locked(&self, rules: Vec<DomainRule>) -> Result<u64> {
        let mut seen = HashSet::with_capacity(rules.len());
        for rule in &rules {
            if !seen.insert(rule.pattern.as_str()) {
                return Err(Error::invalid_rule(&rule.pattern, "duplicate pattern"));
            }
        }

        let next = self.active.read().version() + 1;
        let set = Arc::new(RuleSet::with_version(next, rules));

        // Write-ahead: storage must succeed before the pointer advances
        self.persist(&set)?;
        *self.active.write() = set.clone();

        debug!(version = next, rules = set.len(), "Committed rule set");
        Ok(next)
    }

    fn persist(&self, set: &RuleSet) -> Result<()> {
        let record = PersistedRules {
            version: set.version(),
            rules: set.rules().to_vec(),
        };
        let json = serde_json::to_string_pretty(&record)?;

        // Atomic replace-on-write: a crash mid-write leaves the old file intact
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| Error::persistence(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            Error::persistence(format!("rename {} -> {}: {e}", tmp.display(), self.path.display()))
        })?;

        Ok(())
    }
}
