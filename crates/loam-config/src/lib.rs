// SPDX-FileCopyrightText: 2026 Loam Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Loam persistence layer.
//!
//! Provides TOML configuration parsing with strict validation
//! (`deny_unknown_fields`), XDG file hierarchy lookup, and environment
//! variable overrides.
//!
//! # Usage
//!
//! ```no_run
//! use loam_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("session root: {}", config.storage.root_dir.display());
//! ```

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

pub mod loader;
pub mod model;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{LoamConfig, MemoryBackend, MemoryConfig, SearchConfig, StorageConfig};

use loam_core::LoamError;

/// Load configuration from the XDG hierarchy and validate it.
///
/// Figment parse errors and post-deserialization validation failures
/// both surface as configuration errors: fatal at startup, never
/// retried.
pub fn load_and_validate() -> Result<LoamConfig, LoamError> {
    let config = loader::load_config().map_err(|e| LoamError::Config(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<LoamConfig, LoamError> {
    let config =
        loader::load_config_from_str(toml_content).map_err(|e| LoamError::Config(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Post-deserialization checks that serde cannot express.
pub fn validate_config(config: &LoamConfig) -> Result<(), LoamError> {
    if config.storage.max_open_sessions == 0 {
        return Err(LoamError::Config(
            "storage.max_open_sessions must be at least 1".into(),
        ));
    }
    if config.memory.backend == MemoryBackend::Search {
        if config.memory.search.endpoint.is_empty() {
            return Err(LoamError::Config(
                "memory.search.endpoint is required for the search backend".into(),
            ));
        }
        if config.memory.search.index.is_empty() {
            return Err(LoamError::Config(
                "memory.search.index is required for the search backend".into(),
            ));
        }
        if config.memory.search.vector_dim == 0 {
            return Err(LoamError::Config(
                "memory.search.vector_dim must be at least 1".into(),
            ));
        }
    }
    Ok(())
}
