// SPDX-FileCopyrightText: 2026 Loam Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The memory store contract shared by every backend.

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use loam_core::LoamError;

use crate::types::{Memory, MemoryQuery, cosine_similarity};

/// Scoped, filterable, optionally similarity-ranked store of memory
/// records.
///
/// All backends implement this one trait and must behave identically for
/// the same inputs; call sites never branch on backend identity.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Returns up to `query.count` records matching the structural
    /// filters, ranked by similarity to the query text (when non-empty)
    /// or by recency. Fewer matches than `count` is not an error.
    async fn find(&self, query: &MemoryQuery) -> Result<Vec<Memory>, LoamError>;

    /// Upserts a record by its deterministic identity: preserves the
    /// original `created_at` when the record pre-exists, always sets
    /// `updated_at` to now, and always recomputes the embedding from the
    /// current content. Returns the record as stored.
    async fn save(&self, memory: Memory) -> Result<Memory, LoamError>;
}

/// Applies the upsert timestamp/embedding rules before a record is
/// persisted. `existing_created_at` comes from the pre-existing record,
/// if any.
pub(crate) fn stamp_for_save(
    mut memory: Memory,
    existing_created_at: Option<DateTime<Utc>>,
    embedding: Vec<f32>,
) -> Memory {
    let now = Utc::now();
    memory.created_at = existing_created_at.or(memory.created_at).or(Some(now));
    memory.updated_at = Some(now);
    memory.embedding = embedding;
    memory
}

/// Ranks filter survivors and truncates to `count`.
///
/// With a query vector: descending cosine similarity to each stored
/// vector (absent/zero vectors score 0). Without: descending
/// `updated_at`, records with no timestamp last.
pub(crate) fn rank_and_truncate(
    mut survivors: Vec<Memory>,
    query_vector: Option<&[f32]>,
    count: usize,
) -> Vec<Memory> {
    match query_vector {
        Some(query) => {
            survivors.sort_by(|a, b| {
                let sa = cosine_similarity(query, &a.embedding);
                let sb = cosine_similarity(query, &b.embedding);
                sb.partial_cmp(&sa).unwrap_or(Ordering::Equal)
            });
        }
        None => {
            survivors.sort_by(|a, b| match (&a.updated_at, &b.updated_at) {
                (Some(x), Some(y)) => y.cmp(x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            });
        }
    }
    survivors.truncate(count);
    survivors
}
