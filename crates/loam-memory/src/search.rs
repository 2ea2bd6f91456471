// SPDX-FileCopyrightText: 2026 Loam Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Search-engine backend: filters and ranking delegated to an
//! Elasticsearch-compatible engine.
//!
//! Structural filters become `bool.filter` clauses, similarity ranking
//! uses the engine's native kNN search, and upserts request
//! `refresh=wait_for` so a save is immediately observable by a following
//! find (read-your-writes). Engine failures surface unmodified — retry
//! policy belongs to the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use loam_core::{Embedder, LoamError};

use crate::store::{MemoryStore, stamp_for_save};
use crate::types::{Memory, MemoryQuery, MemoryScope};

/// Extra candidates requested from the kNN stage beyond `count`, so a
/// post-filter cannot starve the page.
const KNN_CANDIDATE_FACTOR: usize = 10;
const KNN_CANDIDATE_FLOOR: usize = 100;

/// Memory store backed by a managed search/vector engine.
pub struct SearchEngineMemoryStore {
    client: reqwest::Client,
    base_url: String,
    index: String,
    embedder: Arc<dyn Embedder>,
}

impl SearchEngineMemoryStore {
    /// Creates a store against `endpoint` (e.g. `http://localhost:9200`)
    /// using the named index.
    pub fn new(
        endpoint: impl Into<String>,
        index: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, LoamError> {
        let base_url = endpoint.into().trim_end_matches('/').to_string();
        let index = index.into();
        if base_url.is_empty() {
            return Err(LoamError::Config("search engine endpoint is empty".into()));
        }
        if index.is_empty() {
            return Err(LoamError::Config("search engine index name is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LoamError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            index,
            embedder,
        })
    }

    fn doc_url(&self, id: &str) -> String {
        format!("{}/{}/_doc/{id}", self.base_url, self.index)
    }

    fn search_url(&self) -> String {
        format!("{}/{}/_search", self.base_url, self.index)
    }

    /// Fetches the stored `created_at` for an existing document, `None`
    /// for a new one.
    async fn existing_created_at(
        &self,
        id: &str,
    ) -> Result<Option<chrono::DateTime<chrono::Utc>>, LoamError> {
        let response = self
            .client
            .get(self.doc_url(id))
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Value = check_status(response).await?.json().await.map_err(transport_error)?;
        Ok(body
            .get("_source")
            .and_then(|source| source.get("created_at"))
            .and_then(|v| serde_json::from_value(v.clone()).ok()))
    }
}

#[async_trait]
impl MemoryStore for SearchEngineMemoryStore {
    async fn find(&self, query: &MemoryQuery) -> Result<Vec<Memory>, LoamError> {
        let filters = filter_clauses(query);
        let body = if query.query.is_empty() {
            json!({
                "query": { "bool": { "filter": filters } },
                "sort": [
                    { "updated_at": { "order": "desc", "missing": "_last" } }
                ],
                "size": query.count,
            })
        } else {
            let query_vector = self.embedder.embed(&query.query).await?;
            json!({
                "knn": {
                    "field": "embedding",
                    "query_vector": query_vector,
                    "k": query.count,
                    "num_candidates": (query.count * KNN_CANDIDATE_FACTOR)
                        .max(KNN_CANDIDATE_FLOOR),
                    "filter": { "bool": { "filter": filters } },
                },
                "size": query.count,
            })
        };

        debug!(index = %self.index, semantic = !query.query.is_empty(), "memory search");
        let response = self
            .client
            .post(self.search_url())
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let body: Value = check_status(response).await?.json().await.map_err(transport_error)?;

        let hits = body
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        hits.iter()
            .filter_map(|hit| hit.get("_source"))
            .map(memory_from_source)
            .collect()
    }

    async fn save(&self, memory: Memory) -> Result<Memory, LoamError> {
        let id = memory.record_id();
        let existing_created_at = self.existing_created_at(&id).await?;
        let embedding = self.embedder.embed(&memory.content).await?;
        let stored = stamp_for_save(memory, existing_created_at, embedding);

        // Content and vector travel in one document; synchronous refresh
        // makes the upsert visible to the very next search.
        let doc = document(&stored)?;
        let response = self
            .client
            .put(self.doc_url(&id))
            .query(&[("refresh", "wait_for")])
            .json(&doc)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        Ok(stored)
    }
}

/// Translates the structural filters into engine boolean clauses.
///
/// Agent scope filters on scope alone; entity scope also pins the scope
/// id. Type and topic lists are match-any `terms` clauses; the
/// reusability threshold is an inclusive `range`, omitted when 0.
fn filter_clauses(query: &MemoryQuery) -> Vec<Value> {
    let mut filters = vec![json!({ "term": { "scope": query.scope.as_str() } })];
    if query.scope == MemoryScope::Entity {
        filters.push(json!({ "term": { "scope_id": query.scope_id } }));
    }
    if !query.memory_types.is_empty() {
        let types: Vec<&str> = query.memory_types.iter().map(|t| t.as_str()).collect();
        filters.push(json!({ "terms": { "memory_type": types } }));
    }
    if !query.topics.is_empty() {
        filters.push(json!({ "terms": { "topics": query.topics } }));
    }
    if query.min_reusability_score > 0 {
        filters.push(json!({
            "range": { "reusability_score": { "gte": query.min_reusability_score } }
        }));
    }
    filters
}

/// Builds the engine document for a record, embedding included.
fn document(memory: &Memory) -> Result<Value, LoamError> {
    // `Memory` skips the embedding in serde; the engine document carries
    // it explicitly so content and vector stay in one write.
    let mut doc = serde_json::to_value(memory)
        .map_err(|e| LoamError::Internal(format!("memory serialization failed: {e}")))?;
    doc["embedding"] = json!(memory.embedding);
    Ok(doc)
}

/// Rebuilds a record from an engine `_source`, restoring the vector.
fn memory_from_source(source: &Value) -> Result<Memory, LoamError> {
    let mut memory: Memory =
        serde_json::from_value(source.clone()).map_err(|e| LoamError::Engine {
            message: format!("undecodable search hit: {e}"),
            source: Some(Box::new(e)),
        })?;
    if let Some(embedding) = source.get("embedding") {
        memory.embedding = serde_json::from_value(embedding.clone()).unwrap_or_default();
    }
    Ok(memory)
}

fn transport_error(e: reqwest::Error) -> LoamError {
    LoamError::Engine {
        message: format!("engine request failed: {e}"),
        source: Some(Box::new(e)),
    }
}

/// Maps a non-success engine response to an error with the body attached.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LoamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LoamError::Engine {
        message: format!("engine returned {status}: {body}"),
        source: None,
    })
}
