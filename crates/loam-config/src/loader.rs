// SPDX-FileCopyrightText: 2026 Loam Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports the XDG hierarchy: `./loam.toml` >
//! `~/.config/loam/loam.toml` > `/etc/loam/loam.toml` with environment
//! variable overrides via the `LOAM_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::LoamConfig;

/// Load configuration from the standard XDG hierarchy with env var
/// overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/loam/loam.toml` (system-wide)
/// 3. `~/.config/loam/loam.toml` (user XDG config)
/// 4. `./loam.toml` (local directory)
/// 5. `LOAM_*` environment variables
pub fn load_config() -> Result<LoamConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LoamConfig::default()))
        .merge(Toml::file("/etc/loam/loam.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("loam/loam.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("loam.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<LoamConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LoamConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<LoamConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LoamConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` to avoid ambiguity
/// with underscore-containing key names: `LOAM_STORAGE_MAX_OPEN_SESSIONS`
/// must map to `storage.max_open_sessions`, not `storage.max.open.sessions`.
fn env_provider() -> Env {
    Env::prefixed("LOAM_").map(|key| {
        let mapped = key
            .as_str()
            .replacen("storage_", "storage.", 1)
            .replacen("memory_search_", "memory.search.", 1)
            .replacen("memory_", "memory.", 1);
        mapped.into()
    })
}
