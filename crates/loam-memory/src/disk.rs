// SPDX-FileCopyrightText: 2026 Loam Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Disk backend: one directory per record, brute-force vector scan.
//!
//! Layout: `<root>/<record_id>/memory.json` (the record) and
//! `<root>/<record_id>/embedding.json` (its vector). A save writes both
//! files durably before registering the record in the in-memory catalog,
//! so a crash mid-save can never leave a half-registered record; startup
//! rebuilds the catalog by scanning the root directory.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use loam_core::{Embedder, LoamError};

use crate::store::{MemoryStore, rank_and_truncate, stamp_for_save};
use crate::types::{Memory, MemoryQuery};

const MEMORY_FILE: &str = "memory.json";
const EMBEDDING_FILE: &str = "embedding.json";

/// Durable memory store over a plain directory tree.
///
/// Writes are serialized through one lock (saves are far rarer than
/// reads); reads run against a point-in-time snapshot of the catalog and
/// never block behind a save.
pub struct DiskMemoryStore {
    root: PathBuf,
    embedder: Arc<dyn Embedder>,
    catalog: RwLock<HashMap<String, Memory>>,
    write_lock: Mutex<()>,
}

impl DiskMemoryStore {
    /// Opens the store rooted at `root`, rebuilding the catalog from a
    /// directory scan.
    ///
    /// Fails fast with a configuration error when the root cannot be
    /// created; an unparseable stored record is a corruption error.
    pub async fn open(
        root: impl Into<PathBuf>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, LoamError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            LoamError::Config(format!(
                "memory root {} is not writable: {e}",
                root.display()
            ))
        })?;

        let mut catalog = HashMap::new();
        let mut entries = tokio::fs::read_dir(&root)
            .await
            .map_err(LoamError::storage)?;
        while let Some(entry) = entries.next_entry().await.map_err(LoamError::storage)? {
            let file_type = entry.file_type().await.map_err(LoamError::storage)?;
            if !file_type.is_dir() {
                continue;
            }
            let dir = entry.path();
            match load_record(&dir).await? {
                Some(memory) => {
                    catalog.insert(memory.record_id(), memory);
                }
                None => {
                    // A directory missing either file is a save that never
                    // completed; the record was never registered.
                    warn!(dir = %dir.display(), "skipping incomplete memory record");
                }
            }
        }
        debug!(root = %root.display(), records = catalog.len(), "opened disk memory store");

        Ok(Self {
            root,
            embedder,
            catalog: RwLock::new(catalog),
            write_lock: Mutex::new(()),
        })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of registered records. Test/introspection hook.
    pub async fn len(&self) -> usize {
        self.catalog.read().await.len()
    }
}

#[async_trait]
impl MemoryStore for DiskMemoryStore {
    async fn find(&self, query: &MemoryQuery) -> Result<Vec<Memory>, LoamError> {
        let survivors: Vec<Memory> = {
            let catalog = self.catalog.read().await;
            catalog
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
        let _serialized = self.write_lock.lock().await;

        let id = memory.record_id();
        let embedding = self.embedder.embed(&memory.content).await?;
        let existing_created_at = {
            let catalog = self.catalog.read().await;
            catalog.get(&id).and_then(|m| m.created_at)
        };
        let stored = stamp_for_save(memory, existing_created_at, embedding);

        // Both files land durably before the catalog learns about the
        // record; content and vector are written in the same save and can
        // never diverge.
        let dir = self.root.join(&id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(LoamError::storage)?;
        write_file_durably(&dir.join(EMBEDDING_FILE), &serialize(&stored.embedding)?).await?;
        write_file_durably(&dir.join(MEMORY_FILE), &serialize(&stored)?).await?;

        self.catalog.write().await.insert(id, stored.clone());
        Ok(stored)
    }
}

fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, LoamError> {
    serde_json::to_vec_pretty(value)
        .map_err(|e| LoamError::Internal(format!("memory serialization failed: {e}")))
}

/// Reads one record directory; `None` when either file is missing.
async fn load_record(dir: &Path) -> Result<Option<Memory>, LoamError> {
    let memory_path = dir.join(MEMORY_FILE);
    let embedding_path = dir.join(EMBEDDING_FILE);

    let memory_raw = match tokio::fs::read_to_string(&memory_path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(LoamError::storage(e)),
    };
    let embedding_raw = match tokio::fs::read_to_string(&embedding_path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(LoamError::storage(e)),
    };

    let mut memory: Memory =
        serde_json::from_str(&memory_raw).map_err(|e| LoamError::Corruption {
            path: memory_path.display().to_string(),
            message: e.to_string(),
        })?;
    memory.embedding =
        serde_json::from_str(&embedding_raw).map_err(|e| LoamError::Corruption {
            path: embedding_path.display().to_string(),
            message: e.to_string(),
        })?;
    Ok(Some(memory))
}

/// Temp file, write, sync, rename — the record is either fully present
/// or absent.
async fn write_file_durably(path: &Path, body: &[u8]) -> Result<(), LoamError> {
    let tmp = path.with_extension("json.tmp");
    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(LoamError::storage)?;
    file.write_all(body).await.map_err(LoamError::storage)?;
    file.sync_data().await.map_err(LoamError::storage)?;
    drop(file);
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(LoamError::storage)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::types::{MemoryScope, MemoryType};
    use tempfile::tempdir;

    /// Deterministic embedder: maps known phrases to fixed vectors.
    struct TableEmbedder;

    #[async_trait]
    impl Embedder for TableEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, LoamError> {
            Ok(match text {
                t if t.contains("tea") => vec![1.0, 0.0],
                t if t.contains("coffee") => vec![0.0, 1.0],
                _ => vec![0.5, 0.5],
            })
        }
    }

    fn memory(name: &str, content: &str) -> Memory {
        Memory {
            agent_name: "helper".into(),
            scope: MemoryScope::Agent,
            scope_id: String::new(),
            memory_type: MemoryType::Semantic,
            name: name.into(),
            content: content.into(),
            topics: vec!["drinks".into()],
            reusability_score: 5,
            created_at: None,
            updated_at: None,
            embedding: Vec::new(),
        }
    }

    fn query() -> MemoryQuery {
        MemoryQuery {
            scope: MemoryScope::Agent,
            scope_id: String::new(),
            memory_types: Vec::new(),
            topics: Vec::new(),
            query: String::new(),
            min_reusability_score: 0,
            count: 10,
        }
    }

    #[tokio::test]
    async fn save_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let store = DiskMemoryStore::open(dir.path(), Arc::new(TableEmbedder))
            .await
            .unwrap();
        store.save(memory("tea", "likes green tea")).await.unwrap();
        drop(store);

        let reopened = DiskMemoryStore::open(dir.path(), Arc::new(TableEmbedder))
            .await
            .unwrap();
        let found = reopened.find(&query()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "tea");
        assert_eq!(found[0].embedding, vec![1.0, 0.0], "vector reloaded with content");
    }

    #[tokio::test]
    async fn incomplete_record_directory_is_skipped_on_open() {
        let dir = tempdir().unwrap();
        // A directory with only the embedding file: a save that died
        // between the two writes.
        let partial = dir.path().join("deadbeef");
        std::fs::create_dir_all(&partial).unwrap();
        std::fs::write(partial.join(EMBEDDING_FILE), "[1.0,0.0]").unwrap();

        let store = DiskMemoryStore::open(dir.path(), Arc::new(TableEmbedder))
            .await
            .unwrap();
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn corrupt_record_is_fatal_on_open() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("cafe");
        std::fs::create_dir_all(&bad).unwrap();
        std::fs::write(bad.join(MEMORY_FILE), "not json").unwrap();
        std::fs::write(bad.join(EMBEDDING_FILE), "[1.0]").unwrap();

        let result = DiskMemoryStore::open(dir.path(), Arc::new(TableEmbedder)).await;
        assert!(matches!(result, Err(LoamError::Corruption { .. })));
    }

    #[tokio::test]
    async fn upsert_updates_in_place_on_disk() {
        let dir = tempdir().unwrap();
        let store = DiskMemoryStore::open(dir.path(), Arc::new(TableEmbedder))
            .await
            .unwrap();

        let first = store.save(memory("drink", "likes green tea")).await.unwrap();
        let second = store
            .save(memory("drink", "switched to coffee"))
            .await
            .unwrap();
        assert_eq!(store.len().await, 1, "same identity, one record");
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.embedding, vec![0.0, 1.0], "embedding recomputed");

        // Only one record directory on disk.
        let dirs = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(dirs, 1);
    }
}
