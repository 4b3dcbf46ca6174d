//! Core types and shared functionality for shaft.
//!
//! This crate provides:
//! - The durable resource store (SQLite backend plus an in-memory
//!   implementation for tests)
//! - The resource normalizer (canonicalization + content hashing)
//! - Unified error types
//! - Configuration structures

pub mod config;
pub mod error;
pub mod normalize;
pub mod store;

pub use config::{AppConfig, RevalidatePolicy};
pub use error::{NormalizeError, StoreError};
pub use normalize::{Normalized, normalize};
pub use store::{MemoryStore, ResourceRecord, SqliteStore, Store};
