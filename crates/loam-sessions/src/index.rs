// SPDX-FileCopyrightText: 2026 Loam Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded cache of open session handles backed by durable per-session
//! state.
//!
//! The index maps session id to a cache slot holding the durable summary
//! and a lazily-opened message log handle. At most `capacity` slots are
//! retained; evicting one drops only the in-memory structures — the log
//! and summary are already durable, and a later access transparently
//! reopens them from disk.
//!
//! One coarse `RwLock` guards cache bookkeeping (lookup, insert, evict).
//! It never protects log content: each open log has its own per-session
//! `RwLock`, so independent sessions never contend.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Duration, Utc};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

use loam_core::{LoamError, Message, MessageKey, SessionSummary};

use crate::cursor::{Cursor, Direction, Page};
use crate::log::{MessageFilter, MessageLog, MessagePage};

const MESSAGES_FILE: &str = "messages.jsonl";
const SUMMARY_FILE: &str = "summary.json";

/// An open message log for one session.
///
/// Holds the per-session read/write lock: readers run concurrently, a
/// writer excludes all readers and other writers. Cloned `Arc`s stay
/// valid after the cache evicts the slot.
#[derive(Debug)]
pub struct SessionHandle {
    session_id: String,
    log: RwLock<MessageLog>,
}

impl SessionHandle {
    async fn open(session_id: &str, dir: &Path) -> Result<Self, LoamError> {
        let log = MessageLog::open(dir.join(MESSAGES_FILE)).await?;
        Ok(Self {
            session_id: session_id.to_string(),
            log: RwLock::new(log),
        })
    }

    /// Session this handle belongs to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Durably appends a batch of messages. See [`MessageLog::append`].
    pub async fn append(&self, messages: &[Message]) -> Result<(), LoamError> {
        self.log.write().await.append(messages).await
    }

    /// Cursor-paginated read. See [`MessageLog::read`].
    pub async fn read(
        &self,
        count: usize,
        filter: Option<&MessageFilter>,
        cursor: &Cursor<MessageKey>,
        direction: Direction,
    ) -> MessagePage {
        self.log.read().await.read(count, filter, cursor, direction)
    }

    /// Number of messages currently materialized.
    pub async fn len(&self) -> usize {
        self.log.read().await.len()
    }

    /// Whether the log holds no messages.
    pub async fn is_empty(&self) -> bool {
        self.log.read().await.is_empty()
    }
}

/// One cache slot: durable summary plus lazily-opened log handle.
#[derive(Debug)]
struct Slot {
    last_used: AtomicU64,
    log: Option<Arc<SessionHandle>>,
    summary: Option<SessionSummary>,
}

impl Slot {
    fn new(tick: u64) -> Self {
        Self {
            last_used: AtomicU64::new(tick),
            log: None,
            summary: None,
        }
    }

    fn touch(&self, tick: u64) {
        self.last_used.store(tick, Ordering::Relaxed);
    }
}

/// Bounded index of session state under one root directory.
///
/// Disk layout: `<root>/<session_id>/messages.jsonl` plus
/// `<root>/<session_id>/summary.json`.
#[derive(Debug)]
pub struct SessionIndex {
    root: PathBuf,
    capacity: usize,
    tick: AtomicU64,
    slots: RwLock<HashMap<String, Slot>>,
}

impl SessionIndex {
    /// Creates an index rooted at `root`, caching at most `capacity`
    /// sessions.
    ///
    /// Fails fast with a configuration error if the root directory
    /// cannot be created.
    pub fn new(root: impl Into<PathBuf>, capacity: usize) -> Result<Self, LoamError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            LoamError::Config(format!(
                "session root {} is not writable: {e}",
                root.display()
            ))
        })?;
        if capacity == 0 {
            return Err(LoamError::Config(
                "session cache capacity must be at least 1".into(),
            ));
        }
        info!(root = %root.display(), capacity, "session index initialized");
        Ok(Self {
            root,
            capacity,
            tick: AtomicU64::new(0),
            slots: RwLock::new(HashMap::new()),
        })
    }

    /// Root directory of the index.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed)
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id)
    }

    /// Returns the open log for `session_id`, creating the session on
    /// first use.
    ///
    /// This is the explicit create path; [`SessionIndex::append`] refuses
    /// sessions that were never opened.
    pub async fn get_or_open_log(
        &self,
        session_id: &str,
    ) -> Result<Arc<SessionHandle>, LoamError> {
        validate_session_id(session_id)?;
        self.open_log(session_id, true).await
    }

    /// Durably appends messages to an existing session.
    ///
    /// The session must have been created via [`get_or_open_log`]
    /// (possibly in an earlier process); appending to an unknown session
    /// is a usage error.
    ///
    /// [`get_or_open_log`]: SessionIndex::get_or_open_log
    pub async fn append(
        &self,
        session_id: &str,
        messages: &[Message],
    ) -> Result<(), LoamError> {
        validate_session_id(session_id)?;
        let handle = self.open_log(session_id, false).await?;
        handle.append(messages).await
    }

    /// Cursor-paginated read of a session's messages.
    ///
    /// An unknown session is a legitimate miss: the page is empty and the
    /// cursor comes back unchanged.
    pub async fn read(
        &self,
        session_id: &str,
        count: usize,
        filter: Option<&MessageFilter>,
        cursor: &Cursor<MessageKey>,
        direction: Direction,
    ) -> Result<MessagePage, LoamError> {
        validate_session_id(session_id)?;
        match self.open_log(session_id, false).await {
            Ok(handle) => Ok(handle.read(count, filter, cursor, direction).await),
            Err(LoamError::SessionUnknown { .. }) => Ok(Page {
                items: Vec::new(),
                cursor: cursor.clone(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Opens (or reuses) the log handle for a session.
    ///
    /// The cache lookup runs in a shared section. tokio's `RwLock` has no
    /// in-place upgrade, so on a miss the shared section is released and
    /// an exclusive one acquired, with a re-check for a racing opener.
    async fn open_log(
        &self,
        session_id: &str,
        create: bool,
    ) -> Result<Arc<SessionHandle>, LoamError> {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(session_id) {
                if let Some(handle) = &slot.log {
                    slot.touch(self.next_tick());
                    return Ok(handle.clone());
                }
            }
        }

        let mut slots = self.slots.write().await;
        if let Some(slot) = slots.get(session_id) {
            if let Some(handle) = &slot.log {
                slot.touch(self.next_tick());
                return Ok(handle.clone());
            }
        }

        let dir = self.session_dir(session_id);
        if create {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(LoamError::storage)?;
        } else if !dir_exists(&dir).await? {
            return Err(LoamError::SessionUnknown {
                session_id: session_id.to_string(),
            });
        }

        let handle = Arc::new(SessionHandle::open(session_id, &dir).await?);
        let tick = self.next_tick();
        let slot = slots
            .entry(session_id.to_string())
            .or_insert_with(|| Slot::new(tick));
        slot.log = Some(handle.clone());
        slot.touch(tick);
        self.evict_over_capacity(&mut slots);
        Ok(handle)
    }

    /// Upserts the durable summary for a session.
    ///
    /// `updated_at` strictly increases across saves: when the wall clock
    /// has not advanced past the stored summary, the new timestamp is
    /// clamped to one microsecond later. Returns the record as stored.
    pub async fn save_summary(
        &self,
        summary: SessionSummary,
    ) -> Result<SessionSummary, LoamError> {
        validate_session_id(&summary.session_id)?;
        let previous = self.summary(&summary.session_id).await?;

        let mut stored = summary;
        let now = Utc::now();
        stored.updated_at = match previous {
            Some(prev) if now <= prev.updated_at => prev.updated_at + Duration::microseconds(1),
            _ => now,
        };

        let dir = self.session_dir(&stored.session_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(LoamError::storage)?;
        write_json_durably(&dir.join(SUMMARY_FILE), &stored).await?;

        let mut slots = self.slots.write().await;
        let tick = self.next_tick();
        let slot = slots
            .entry(stored.session_id.clone())
            .or_insert_with(|| Slot::new(tick));
        slot.summary = Some(stored.clone());
        slot.touch(tick);
        self.evict_over_capacity(&mut slots);
        Ok(stored)
    }

    /// Returns the summary for a session, reconstructing it from the
    /// durable record on a cache miss. An unknown session is `None`.
    pub async fn summary(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionSummary>, LoamError> {
        validate_session_id(session_id)?;
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(session_id) {
                if let Some(summary) = &slot.summary {
                    slot.touch(self.next_tick());
                    return Ok(Some(summary.clone()));
                }
            }
        }

        let Some(summary) = self.load_summary(session_id).await? else {
            return Ok(None);
        };

        let mut slots = self.slots.write().await;
        let tick = self.next_tick();
        let slot = slots
            .entry(session_id.to_string())
            .or_insert_with(|| Slot::new(tick));
        slot.summary = Some(summary.clone());
        slot.touch(tick);
        self.evict_over_capacity(&mut slots);
        Ok(Some(summary))
    }

    /// Reads a summary straight from disk, bypassing the cache.
    async fn load_summary(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionSummary>, LoamError> {
        let path = self.session_dir(session_id).join(SUMMARY_FILE);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LoamError::storage(e)),
        };
        let summary: SessionSummary =
            serde_json::from_str(&contents).map_err(|e| LoamError::Corruption {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(Some(summary))
    }

    /// Removes a session entirely: cached handle, messages, and summary.
    /// Idempotent — deleting an unknown session is a no-op.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), LoamError> {
        validate_session_id(session_id)?;
        {
            let mut slots = self.slots.write().await;
            slots.remove(session_id);
        }
        match tokio::fs::remove_dir_all(self.session_dir(session_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LoamError::storage(e)),
        }
    }

    /// Lists every durable summary under the root.
    ///
    /// Scans the directory rather than the cache, so evicted sessions
    /// stay visible. Sessions that never saved a summary are skipped.
    /// Reads go through the cache when possible but misses do not
    /// populate it — a listing must not churn the bounded cache.
    pub async fn list_summaries(&self) -> Result<Vec<SessionSummary>, LoamError> {
        let mut out = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(LoamError::storage)?;
        while let Some(entry) = entries.next_entry().await.map_err(LoamError::storage)? {
            let file_type = entry.file_type().await.map_err(LoamError::storage)?;
            if !file_type.is_dir() {
                continue;
            }
            let Some(session_id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };

            let cached = {
                let slots = self.slots.read().await;
                slots
                    .get(&session_id)
                    .and_then(|slot| slot.summary.clone())
            };
            if let Some(summary) = cached {
                out.push(summary);
            } else if let Some(summary) = self.load_summary(&session_id).await? {
                out.push(summary);
            }
        }
        Ok(out)
    }

    /// Number of sessions currently cached. Test/introspection hook.
    pub async fn cached_sessions(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Drops least-recently-used slots until the bound holds. Only the
    /// in-memory structures go away; durable state is untouched.
    fn evict_over_capacity(&self, slots: &mut HashMap<String, Slot>) {
        while slots.len() > self.capacity {
            let victim = slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_used.load(Ordering::Relaxed))
                .map(|(id, _)| id.clone());
            let Some(victim) = victim else {
                break;
            };
            slots.remove(&victim);
            debug!(session_id = %victim, "evicted cached session handle");
        }
    }
}

/// Session ids double as directory names; path metacharacters would
/// escape the root.
fn validate_session_id(session_id: &str) -> Result<(), LoamError> {
    if session_id.is_empty()
        || session_id == "."
        || session_id == ".."
        || session_id.contains(['/', '\\'])
    {
        return Err(LoamError::Internal(format!(
            "invalid session id: {session_id:?}"
        )));
    }
    Ok(())
}

async fn dir_exists(dir: &Path) -> Result<bool, LoamError> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) => Ok(meta.is_dir()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LoamError::storage(e)),
    }
}

/// Writes a JSON document durably: temp file, write, sync, rename.
async fn write_json_durably<T: serde::Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), LoamError> {
    let body = serde_json::to_vec_pretty(value)
        .map_err(|e| LoamError::Internal(format!("summary serialization failed: {e}")))?;
    let tmp = path.with_extension("json.tmp");
    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(LoamError::storage)?;
    file.write_all(&body).await.map_err(LoamError::storage)?;
    file.sync_data().await.map_err(LoamError::storage)?;
    drop(file);
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(LoamError::storage)
}

#[cfg(test)]
mod tests {
    use super::*;

    use loam_core::{LogicalClock, MessagePayload};
    use tempfile::tempdir;

    fn text(clock: &LogicalClock, session_id: &str, n: usize) -> Message {
        Message {
            session_id: session_id.into(),
            run_id: "r1".into(),
            message_id: format!("m{n:04}"),
            timestamp_us: clock.now_us(),
            payload: MessagePayload::UserPrompt {
                content: format!("prompt {n}"),
            },
        }
    }

    fn summary(session_id: &str, title: &str) -> SessionSummary {
        SessionSummary {
            session_id: session_id.into(),
            title: title.into(),
            summary: format!("about {title}"),
            topics: vec!["testing".into()],
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn eviction_never_loses_data() {
        let dir = tempdir().unwrap();
        let index = SessionIndex::new(dir.path(), 3).unwrap();
        let clock = LogicalClock::new();

        // Open logs for capacity + 5 sessions.
        for i in 0..8 {
            let id = format!("session-{i}");
            let handle = index.get_or_open_log(&id).await.unwrap();
            handle.append(&[text(&clock, &id, i)]).await.unwrap();
        }
        assert!(index.cached_sessions().await <= 3, "cache bound holds");

        // Every session remains independently readable after eviction.
        for i in 0..8 {
            let id = format!("session-{i}");
            let page = index
                .read(&id, 10, None, &Cursor::default(), Direction::Newer)
                .await
                .unwrap();
            assert_eq!(page.items.len(), 1, "{id} must survive eviction");
            assert_eq!(page.items[0].session_id, id);
        }
    }

    #[tokio::test]
    async fn lru_evicts_least_recently_used() {
        let dir = tempdir().unwrap();
        let index = SessionIndex::new(dir.path(), 2).unwrap();
        index.get_or_open_log("a").await.unwrap();
        index.get_or_open_log("b").await.unwrap();
        // Touch "a" so "b" is the LRU victim.
        index.get_or_open_log("a").await.unwrap();
        index.get_or_open_log("c").await.unwrap();

        let slots = index.slots.read().await;
        assert!(slots.contains_key("a"));
        assert!(!slots.contains_key("b"));
        assert!(slots.contains_key("c"));
    }

    #[tokio::test]
    async fn append_to_unknown_session_is_fatal() {
        let dir = tempdir().unwrap();
        let index = SessionIndex::new(dir.path(), 4).unwrap();
        let clock = LogicalClock::new();
        let result = index.append("ghost", &[text(&clock, "ghost", 0)]).await;
        assert!(matches!(result, Err(LoamError::SessionUnknown { .. })));
    }

    #[tokio::test]
    async fn append_reopens_evicted_session() {
        let dir = tempdir().unwrap();
        let index = SessionIndex::new(dir.path(), 1).unwrap();
        let clock = LogicalClock::new();

        index.get_or_open_log("a").await.unwrap();
        index.append("a", &[text(&clock, "a", 0)]).await.unwrap();
        // Evict "a" by opening another session.
        index.get_or_open_log("b").await.unwrap();

        // Append transparently reopens from disk.
        index.append("a", &[text(&clock, "a", 1)]).await.unwrap();
        let page = index
            .read("a", 10, None, &Cursor::default(), Direction::Newer)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
    }

    #[tokio::test]
    async fn read_unknown_session_is_empty_not_error() {
        let dir = tempdir().unwrap();
        let index = SessionIndex::new(dir.path(), 4).unwrap();
        let cursor = Cursor::default();
        let page = index
            .read("nobody", 10, None, &cursor, Direction::Older)
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.cursor, cursor);
    }

    #[tokio::test]
    async fn summary_round_trip_and_cache_miss_reload() {
        let dir = tempdir().unwrap();
        let index = SessionIndex::new(dir.path(), 1).unwrap();

        index.save_summary(summary("a", "Alpha")).await.unwrap();
        // Evict "a" from the cache.
        index.save_summary(summary("b", "Beta")).await.unwrap();

        // Reconstructed from the durable record.
        let reloaded = index.summary("a").await.unwrap().unwrap();
        assert_eq!(reloaded.title, "Alpha");
        assert_eq!(reloaded.topics, vec!["testing".to_string()]);
    }

    #[tokio::test]
    async fn summary_updated_at_strictly_increases() {
        let dir = tempdir().unwrap();
        let index = SessionIndex::new(dir.path(), 4).unwrap();

        let first = index.save_summary(summary("a", "v1")).await.unwrap();
        let second = index.save_summary(summary("a", "v2")).await.unwrap();
        let third = index.save_summary(summary("a", "v3")).await.unwrap();
        assert!(second.updated_at > first.updated_at);
        assert!(third.updated_at > second.updated_at);

        let stored = index.summary("a").await.unwrap().unwrap();
        assert_eq!(stored.title, "v3");
        assert_eq!(stored.updated_at, third.updated_at);
    }

    #[tokio::test]
    async fn unknown_summary_is_none() {
        let dir = tempdir().unwrap();
        let index = SessionIndex::new(dir.path(), 4).unwrap();
        assert!(index.summary("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_session_removes_everything_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let index = SessionIndex::new(dir.path(), 4).unwrap();
        let clock = LogicalClock::new();

        index.get_or_open_log("a").await.unwrap();
        index.append("a", &[text(&clock, "a", 0)]).await.unwrap();
        index.save_summary(summary("a", "Alpha")).await.unwrap();

        index.delete_session("a").await.unwrap();
        assert!(index.summary("a").await.unwrap().is_none());
        assert!(!dir.path().join("a").exists());
        let result = index.append("a", &[text(&clock, "a", 1)]).await;
        assert!(matches!(result, Err(LoamError::SessionUnknown { .. })));

        // Second delete is a no-op.
        index.delete_session("a").await.unwrap();
    }

    #[tokio::test]
    async fn list_summaries_includes_evicted_sessions() {
        let dir = tempdir().unwrap();
        let index = SessionIndex::new(dir.path(), 1).unwrap();
        index.save_summary(summary("a", "Alpha")).await.unwrap();
        index.save_summary(summary("b", "Beta")).await.unwrap();
        index.save_summary(summary("c", "Gamma")).await.unwrap();

        let mut titles: Vec<String> = index
            .list_summaries()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.title)
            .collect();
        titles.sort();
        assert_eq!(titles, vec!["Alpha", "Beta", "Gamma"]);
        assert_eq!(index.cached_sessions().await, 1, "listing does not churn the cache");
    }

    #[tokio::test]
    async fn session_id_with_path_separator_is_rejected() {
        let dir = tempdir().unwrap();
        let index = SessionIndex::new(dir.path(), 4).unwrap();
        assert!(index.get_or_open_log("../escape").await.is_err());
        assert!(index.summary("a/b").await.is_err());
    }

    #[tokio::test]
    async fn concurrent_opens_share_one_handle() {
        let dir = tempdir().unwrap();
        let index = Arc::new(SessionIndex::new(dir.path(), 4).unwrap());
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let index = index.clone();
            tasks.push(tokio::spawn(async move {
                index.get_or_open_log("shared").await.unwrap()
            }));
        }
        let handles: Vec<Arc<SessionHandle>> =
            futures_join(tasks).await;
        for handle in &handles[1..] {
            assert!(Arc::ptr_eq(&handles[0], handle), "racing opens must converge");
        }
    }

    async fn futures_join(
        tasks: Vec<tokio::task::JoinHandle<Arc<SessionHandle>>>,
    ) -> Vec<Arc<SessionHandle>> {
        let mut out = Vec::new();
        for task in tasks {
            out.push(task.await.unwrap());
        }
        out
    }
}
