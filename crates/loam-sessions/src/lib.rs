// SPDX-FileCopyrightText: 2026 Loam Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session persistence for the Loam agent framework.
//!
//! Provides the per-session append-only message log (one JSONL file per
//! session, fully materialized at open time), bidirectional cursor
//! pagination with independent oldest/newest edges, a bounded
//! recency-ordered cache of open session handles, and the caller-facing
//! session facade (paginated listing, deletion).
//!
//! ## Architecture
//!
//! - **cursor**: generic two-edge cursor pagination over an ordered index
//! - **MessageLog**: durable append-only JSONL log with crash-safe
//!   line-oriented recovery
//! - **SessionIndex**: bounded cache of open handles plus durable
//!   per-session summaries
//! - **SessionFacade**: sessions listing ordered by `updated_at`,
//!   reusing the cursor machinery

pub mod cursor;
pub mod facade;
pub mod index;
pub mod log;

pub use cursor::{Cursor, Direction, Page, paginate};
pub use facade::{SessionFacade, SessionKey, SessionPage};
pub use index::{SessionHandle, SessionIndex};
pub use log::{MessageFilter, MessageLog, MessagePage};
