// SPDX-FileCopyrightText: 2026 Loam Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scoped long-term memory store for the Loam agent framework.
//!
//! One [`MemoryStore`] contract — structural filters (scope, type,
//! topics, reusability threshold) plus optional similarity ranking —
//! with three interchangeable backends. Call sites depend on the trait
//! and never branch on backend identity.
//!
//! ## Architecture
//!
//! - **Types**: `Memory`, `MemoryScope`, `MemoryType`, `MemoryQuery`,
//!   deterministic record identity, cosine similarity
//! - **InMemoryMemoryStore**: hash-map backend, no durability
//! - **DiskMemoryStore**: one directory per record (content file +
//!   vector file), brute-force vector scan, crash-safe saves
//! - **SearchEngineMemoryStore**: filters and kNN ranking delegated to
//!   an Elasticsearch-compatible engine with synchronous refresh

pub mod disk;
pub mod in_memory;
pub mod search;
pub mod store;
pub mod types;

pub use disk::DiskMemoryStore;
pub use in_memory::InMemoryMemoryStore;
pub use search::SearchEngineMemoryStore;
pub use store::MemoryStore;
pub use types::*;
