//! Adapters that live inside the domain crate for convenience.
//!
//! The in-memory repository backs tests, local demos and the `memory`
//! storage provider. Durable adapters (SQLite, Postgres) live in separate
//! crates.

pub mod memory_repo;
