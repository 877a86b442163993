//! DNS interception and forwarding
//!
//! Wire-format handling, the in-flight upstream tracker and the resolver
//! engine itself.

mod engine;
pub mod message;
mod pending;

pub use engine::{Decision, EngineHandle, EngineStats, ResolverEngine, UpstreamConfig};
pub use message::Question;
pub use pending::{PendingQueries, PendingQuery};
