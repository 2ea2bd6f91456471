// SPDX-FileCopyrightText: 2026 Loam Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider trait for vector embedding generation.

use async_trait::async_trait;

use crate::error::LoamError;

/// Provider that turns text into a fixed-length embedding vector.
///
/// From the store's perspective this is a pure function: the same text
/// yields the same vector for the lifetime of the provider, and provider
/// failures propagate as store failures.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds the given text into a fixed-length vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LoamError>;
}
