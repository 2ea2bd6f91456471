// SPDX-FileCopyrightText: 2026 Loam Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory domain types for the scoped long-term memory store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Whether a memory belongs to the agent globally or to one external
/// entity (a user, a session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    /// Applies to the agent regardless of who it is talking to.
    Agent,
    /// Tied to a specific external entity identified by `scope_id`.
    Entity,
}

impl MemoryScope {
    /// Stable string form, used for hashing and engine documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryScope::Agent => "agent",
            MemoryScope::Entity => "entity",
        }
    }
}

/// The kind of knowledge a memory captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// Facts about the world or the entity.
    Semantic,
    /// How to accomplish something.
    Procedural,
    /// What happened in a particular interaction.
    Episodic,
}

impl MemoryType {
    /// Stable string form, used for engine documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Semantic => "semantic",
            MemoryType::Procedural => "procedural",
            MemoryType::Episodic => "episodic",
        }
    }
}

/// A long-lived memory record extracted from conversations.
///
/// Identity is derived from `(agent_name, scope, scope_id, name)` — see
/// [`Memory::record_id`] — so repeated extraction of the same named
/// memory updates in place rather than duplicating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    /// Agent this memory belongs to.
    pub agent_name: String,
    /// Global or entity-scoped.
    pub scope: MemoryScope,
    /// Entity identifier; ignored for agent-scoped matching.
    pub scope_id: String,
    /// Semantic, procedural, or episodic.
    pub memory_type: MemoryType,
    /// Stable name of this memory within its scope.
    pub name: String,
    /// The memory content itself; the embedding is always computed
    /// from this text.
    pub content: String,
    /// Topics/keywords attached to this memory.
    #[serde(default)]
    pub topics: Vec<String>,
    /// 0–10 rating of how broadly this memory applies beyond its
    /// originating context.
    pub reusability_score: u8,
    /// Set on first save and preserved across upserts.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Refreshed on every save.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Embedding of `content`. Persisted next to the content (never in
    /// the same JSON document) so the two cannot silently diverge.
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

impl Memory {
    /// Deterministic record identity: SHA-256 over the identity fields
    /// with length-prefixed framing, hex-encoded.
    ///
    /// The framing keeps distinct field tuples from colliding (e.g.
    /// `("ab", "c")` vs `("a", "bc")`). Stable across saves by
    /// construction — content, topics, and timestamps do not participate.
    pub fn record_id(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.agent_name.as_str(),
            self.scope.as_str(),
            self.scope_id.as_str(),
            self.name.as_str(),
        ] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// A structural + semantic memory query. One shape for every backend.
#[derive(Debug, Clone)]
pub struct MemoryQuery {
    /// Scope to match. `Agent` matches on scope alone; `Entity` matches
    /// scope and `scope_id`.
    pub scope: MemoryScope,
    /// Entity identifier, consulted only for entity-scoped queries.
    pub scope_id: String,
    /// Match-any type filter; empty means no filter.
    pub memory_types: Vec<MemoryType>,
    /// Match-any topic filter (OR, not AND); empty means no filter.
    pub topics: Vec<String>,
    /// Free-text query. Non-empty ranks survivors by cosine similarity
    /// to its embedding; empty ranks by recency.
    pub query: String,
    /// Minimum reusability score (`>=`); 0 disables the filter.
    pub min_reusability_score: u8,
    /// Maximum number of records to return.
    pub count: usize,
}

impl MemoryQuery {
    /// Structural filter shared by the scanning backends. The engine
    /// backend expresses the same conditions as boolean filters.
    pub fn matches(&self, memory: &Memory) -> bool {
        if memory.scope != self.scope {
            return false;
        }
        if self.scope == MemoryScope::Entity && memory.scope_id != self.scope_id {
            return false;
        }
        if !self.memory_types.is_empty() && !self.memory_types.contains(&memory.memory_type) {
            return false;
        }
        if !self.topics.is_empty()
            && !memory.topics.iter().any(|t| self.topics.contains(t))
        {
            return false;
        }
        if self.min_reusability_score > 0
            && memory.reusability_score < self.min_reusability_score
        {
            return false;
        }
        true
    }
}

/// Cosine similarity `dot(a,b) / (‖a‖·‖b‖)`.
///
/// Defined as 0.0 when either vector is empty, the lengths differ, or
/// either norm is zero — never a division by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
