//! Cache engine for shaft.
//!
//! Mediates between the fetch client and the durable store: decides whether
//! a requested resource is served from the store or fetched, guarantees at
//! most one outstanding fetch per key, and applies staleness and eviction
//! policy.

pub mod engine;
mod inflight;

pub use engine::{CacheEngine, EngineOptions, ResolveError, ResolveOptions};
pub use shaft_core::RevalidatePolicy;
