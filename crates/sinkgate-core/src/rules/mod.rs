//! Rule storage and matching
//!
//! Versioned, copy-on-write rule sets with longest-suffix domain matching.

mod matcher;
mod pattern;
mod store;

pub use matcher::{DomainMatcher, RuleMatch};
pub use pattern::{normalize_name, normalize_pattern, DomainRule, RuleAction};
pub use store::{RuleSet, RuleStore};
