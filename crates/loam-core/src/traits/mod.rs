// SPDX-FileCopyrightText: 2026 Loam Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions for Loam's external collaborators.

pub mod embedding;

pub use embedding::Embedder;
