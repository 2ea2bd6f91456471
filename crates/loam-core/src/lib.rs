// SPDX-FileCopyrightText: 2026 Loam Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Loam persistence layer.
//!
//! This crate provides the error type, domain types (messages, session
//! summaries, ordering keys), and the trait definitions that the session
//! and memory stores build on. Higher layers depend on this crate only,
//! never on a specific storage backend.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::LoamError;
pub use traits::Embedder;
pub use types::{
    LogicalClock, Message, MessageKey, MessageKind, MessagePayload, SessionSummary,
};
