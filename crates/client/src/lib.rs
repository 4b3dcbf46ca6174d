//! TLS fetch client for shaft.
//!
//! This crate provides the outbound retrieval side of the engine: a
//! reqwest-based HTTPS client with certificate validation, per-call
//! timeouts, and bounded retry with exponential backoff. It holds no cache
//! state of its own.

pub mod fetch;

pub use fetch::{FetchClient, FetchConfig, FetchError, Fetched, Fetcher, RetryPolicy};
