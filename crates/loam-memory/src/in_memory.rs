// SPDX-FileCopyrightText: 2026 Loam Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory backend: filter/rank correctness with no durability.
//!
//! The reference implementation of the [`MemoryStore`] contract, used in
//! tests and for ephemeral agents that never restart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use loam_core::{Embedder, LoamError};

use crate::store::{MemoryStore, rank_and_truncate, stamp_for_save};
use crate::types::{Memory, MemoryQuery};

/// Volatile memory store backed by a hash map.
pub struct InMemoryMemoryStore {
    embedder: Arc<dyn Embedder>,
    records: RwLock<HashMap<String, Memory>>,
}

impl InMemoryMemoryStore {
    /// Creates an empty store using the given embedding provider.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored records. Test/introspection hook.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn find(&self, query: &MemoryQuery) -> Result<Vec<Memory>, LoamError> {
        let survivors: Vec<Memory> = {
            let records = self.records.read().await;
            records
                .values()
                .filter(|m| query.matches(m))
                .cloned()
                .collect()
        };
        let query_vector = if query.query.is_empty() {
            None
        } else {
            Some(self.embedder.embed(&query.query).await?)
        };
        Ok(rank_and_truncate(
            survivors,
            query_vector.as_deref(),
            query.count,
        ))
    }

    async fn save(&self, memory: Memory) -> Result<Memory, LoamError> {
        let id = memory.record_id();
        let embedding = self.embedder.embed(&memory.content).await?;
        let mut records = self.records.write().await;
        let existing_created_at = records.get(&id).and_then(|m| m.created_at);
        let stored = stamp_for_save(memory, existing_created_at, embedding);
        records.insert(id, stored.clone());
        Ok(stored)
    }
}
