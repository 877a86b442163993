//! Longest-suffix domain matching
//!
//! A trie keyed by reversed DNS labels, built once per committed rule set.
//! Lookup cost scales with the label count of the query name, not the number
//! of rules, so rule sets with thousands of entries stay off the hot path.
//!
//! Precedence: an exact pattern beats any wildcard; among wildcard hits the
//! longest matched suffix wins; a duplicate pattern (which commits reject)
//! would resolve to the most recently added rule.

use std::collections::HashMap;

use crate::rules::pattern::{DomainRule, RuleAction};

/// A winning rule reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMatch {
    /// Action of the matched rule
    pub action: RuleAction,
    /// Index of the rule in the rule set's ordered sequence
    pub index: usize,
}

#[derive(Debug, Default)]
struct Node {
    children: HashMap<String, Node>,
    /// Rule whose exact pattern ends at this node
    exact: Option<RuleMatch>,
    /// Wildcard rule covering this suffix and everything below it
    wildcard: Option<RuleMatch>,
}

/// Suffix trie over a fixed set of domain rules
#[derive(Debug, Default)]
pub struct DomainMatcher {
    root: Node,
}

impl DomainMatcher {
    /// Build a matcher from an ordered rule sequence
    pub fn build(rules: &[DomainRule]) -> Self {
        let mut root = Node::default();

        for (index, rule) in rules.iter().enumerate() {
            let mut node = &mut root;
            for label in rule.host().rsplit('.') {
                node = node.children.entry(label.to_string()).or_default();
            }

            let slot = if rule.is_wildcard() {
                &mut node.wildcard
            } else {
                &mut node.exact
            };
            let candidate = RuleMatch {
                action: rule.action,
                index,
            };
            // Later rules win on (rejected-at-commit) duplicates
            match slot {
                Some(existing) if existing.index >= index => {}
                _ => *slot = Some(candidate),
            }
        }

        Self { root }
    }

    /// Find the winning rule for an already-normalized hostname
    ///
    /// A wildcard `*.example.com` covers `example.com` itself as well as
    /// every name below it.
    pub fn lookup(&self, name: &str) -> Option<RuleMatch> {
        if name.is_empty() {
            return None;
        }

        let mut node = &self.root;
        let mut best_wildcard = None;

        for label in name.rsplit('.') {
            match node.children.get(label) {
                Some(next) => {
                    node = next;
                    if next.wildcard.is_some() {
                        // Deeper node means a longer matched suffix
                        best_wildcard = next.wildcard;
                    }
                }
                None => return best_wildcard,
            }
        }

        // All labels consumed: an exact terminal here wins over any wildcard
        node.exact.or(best_wildcard)
    }

    /// Number of nodes in the trie, root excluded (diagnostics only)
    pub fn node_count(&self) -> usize {
        fn count(node: &Node) -> usize {
            node.children.values().map(|c| 1 + count(c)).sum()
        }
        count(&self.root)
    }
}
