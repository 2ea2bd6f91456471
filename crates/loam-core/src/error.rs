// SPDX-FileCopyrightText: 2026 Loam Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Loam persistence layer.

use thiserror::Error;

/// The primary error type used across all Loam stores and core operations.
#[derive(Debug, Error)]
pub enum LoamError {
    /// Configuration errors (missing/unwritable target directory, invalid
    /// settings). Raised at construction time and never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (file I/O failure, disk full). The in-memory
    /// index is left unchanged; the caller decides whether to retry.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An unparseable stored record. Fatal for the store instance that
    /// found it; there is no automatic repair.
    #[error("corrupt record in {path}: {message}")]
    Corruption { path: String, message: String },

    /// Search-engine backend errors (request failure, non-success status).
    /// Surfaced unmodified; this layer applies no retries.
    #[error("engine error: {message}")]
    Engine {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Embedding provider failure, propagated as a store failure.
    #[error("embedding error: {message}")]
    Embedding {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Writing messages against a session that was never created.
    #[error("unknown session: {session_id}")]
    SessionUnknown { session_id: String },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LoamError {
    /// Wrap an I/O error as a storage failure.
    pub fn storage(source: std::io::Error) -> Self {
        LoamError::Storage {
            source: Box::new(source),
        }
    }
}
