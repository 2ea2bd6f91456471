// SPDX-FileCopyrightText: 2026 Loam Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Loam persistence layer.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level Loam configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoamConfig {
    /// Session storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Memory store settings.
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Session storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Root directory holding one subdirectory per session.
    #[serde(default = "default_session_root")]
    pub root_dir: PathBuf,

    /// Maximum number of simultaneously open session handles.
    #[serde(default = "default_max_open_sessions")]
    pub max_open_sessions: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_session_root(),
            max_open_sessions: default_max_open_sessions(),
        }
    }
}

/// Which memory store backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBackend {
    /// Volatile in-memory store.
    Memory,
    /// Directory-per-record disk store with brute-force vector scan.
    Disk,
    /// Elasticsearch-compatible search/vector engine.
    Search,
}

/// Memory store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Backend selection.
    #[serde(default = "default_memory_backend")]
    pub backend: MemoryBackend,

    /// Root directory for the disk backend.
    #[serde(default = "default_memory_root")]
    pub root_dir: PathBuf,

    /// Search-engine settings, used only by the `search` backend.
    #[serde(default)]
    pub search: SearchConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            root_dir: default_memory_root(),
            search: SearchConfig::default(),
        }
    }
}

/// Search-engine backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    /// Engine base URL.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Index holding memory documents.
    #[serde(default = "default_search_index")]
    pub index: String,

    /// Embedding dimensionality the index was created with.
    #[serde(default = "default_vector_dim")]
    pub vector_dim: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            index: default_search_index(),
            vector_dim: default_vector_dim(),
        }
    }
}

fn data_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loam")
}

fn default_session_root() -> PathBuf {
    data_root().join("sessions")
}

fn default_max_open_sessions() -> usize {
    64
}

fn default_memory_backend() -> MemoryBackend {
    MemoryBackend::Disk
}

fn default_memory_root() -> PathBuf {
    data_root().join("memories")
}

fn default_search_endpoint() -> String {
    "http://localhost:9200".to_string()
}

fn default_search_index() -> String {
    "loam-memories".to_string()
}

fn default_vector_dim() -> usize {
    384
}
