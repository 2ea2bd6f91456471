// SPDX-FileCopyrightText: 2026 Loam Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caller-facing session surface: cursor-paginated session listing and
//! session deletion, composed over the [`SessionIndex`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use loam_core::{LoamError, SessionSummary};

use crate::cursor::{Cursor, Direction, Page, paginate};
use crate::index::SessionIndex;

/// Ordering key of the sessions listing: `(updated_at, session_id)`.
///
/// The derived `Ord` sorts by update time and tie-breaks on the session
/// id, mirroring the per-message ordering key so the listing reuses the
/// same cursor machinery.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub updated_at_us: i64,
    pub session_id: String,
}

impl SessionKey {
    fn of(summary: &SessionSummary) -> Self {
        Self {
            updated_at_us: summary.updated_at.timestamp_micros(),
            session_id: summary.session_id.clone(),
        }
    }
}

/// One page of session summaries plus the cursor to resume from.
pub type SessionPage = Page<SessionKey, SessionSummary>;

/// Session listing and deletion for the orchestration layer.
#[derive(Debug, Clone)]
pub struct SessionFacade {
    index: Arc<SessionIndex>,
}

impl SessionFacade {
    /// Wraps an existing session index.
    pub fn new(index: Arc<SessionIndex>) -> Self {
        Self { index }
    }

    /// The underlying index, for message-level operations.
    pub fn index(&self) -> &Arc<SessionIndex> {
        &self.index
    }

    /// Cursor-paginated listing of sessions ordered by `updated_at`,
    /// tie-broken by session id.
    ///
    /// `Older` from a null cursor yields the most recently updated
    /// sessions first (returned in ascending order, like every page).
    /// Sessions that never saved a summary do not appear.
    pub async fn sessions(
        &self,
        count: usize,
        cursor: &Cursor<SessionKey>,
        direction: Direction,
    ) -> Result<SessionPage, LoamError> {
        let summaries = self.index.list_summaries().await?;
        let ordered: BTreeMap<SessionKey, SessionSummary> = summaries
            .into_iter()
            .map(|s| (SessionKey::of(&s), s))
            .collect();
        Ok(paginate(&ordered, count, |_| true, cursor, direction))
    }

    /// Deletes a session and all of its durable state. Idempotent.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), LoamError> {
        self.index.delete_session(session_id).await
    }
}
