// SPDX-FileCopyrightText: 2026 Loam Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable append-only message log, one JSONL file per session.
//!
//! The whole file is materialized at open time into an ordered in-memory
//! index keyed by `(timestamp, message_id)`. Appends write every record of
//! a batch in one durable operation and update the index only after the
//! write succeeds, so the index never runs ahead of durable state.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use loam_core::{LoamError, Message, MessageKey};

use crate::cursor::{Cursor, Direction, Page, paginate};

/// One page of messages plus the cursor to resume from.
pub type MessagePage = Page<MessageKey, Message>;

/// Read filter applied during the scan, before the count cutoff.
pub type MessageFilter = dyn Fn(&Message) -> bool + Send + Sync;

/// Append-only per-session message log.
///
/// Single-writer/many-readers discipline is enforced by the owner (the
/// session index wraps each log in an `RwLock`); the log itself performs
/// no internal locking.
#[derive(Debug)]
pub struct MessageLog {
    path: PathBuf,
    index: BTreeMap<MessageKey, Message>,
}

impl MessageLog {
    /// Opens the log file at `path`, materializing every record.
    ///
    /// A missing file is an empty log. A malformed **final** line is
    /// treated as an incomplete append and dropped; a malformed earlier
    /// line is a hard corruption error.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, LoamError> {
        let path = path.into();
        let index = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => parse_records(&path, &contents)?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(LoamError::storage(e)),
        };
        debug!(path = %path.display(), messages = index.len(), "opened message log");
        Ok(Self { path, index })
    }

    /// Durably appends a batch of messages.
    ///
    /// All records are serialized into one buffer and written with a
    /// single write + sync, so durability cost is paid once per batch.
    /// On failure the in-memory index is left unchanged — a failed
    /// append is never partially visible.
    pub async fn append(&mut self, messages: &[Message]) -> Result<(), LoamError> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::new();
        for message in messages {
            serde_json::to_writer(&mut buf, message)
                .map_err(|e| LoamError::Internal(format!("message serialization failed: {e}")))?;
            buf.push(b'\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(LoamError::storage)?;
        file.write_all(&buf).await.map_err(LoamError::storage)?;
        file.sync_data().await.map_err(LoamError::storage)?;

        for message in messages {
            self.index.insert(message.key(), message.clone());
        }
        Ok(())
    }

    /// Reads up to `count` post-filter messages relative to `cursor`.
    ///
    /// Responses are always chronological regardless of scan direction;
    /// see [`crate::cursor`] for the edge-advancement rules.
    pub fn read(
        &self,
        count: usize,
        filter: Option<&MessageFilter>,
        cursor: &Cursor<MessageKey>,
        direction: Direction,
    ) -> MessagePage {
        paginate(
            &self.index,
            count,
            |m| filter.is_none_or(|f| f(m)),
            cursor,
            direction,
        )
    }

    /// Number of messages currently materialized.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the log holds no messages.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parses the JSONL contents of a log file into an ordered index.
fn parse_records(
    path: &Path,
    contents: &str,
) -> Result<BTreeMap<MessageKey, Message>, LoamError> {
    let mut index = BTreeMap::new();
    let lines: Vec<&str> = contents.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Message>(line) {
            Ok(message) => {
                index.insert(message.key(), message);
            }
            Err(e) if i + 1 == lines.len() => {
                // A torn final line is an append that never completed.
                warn!(
                    path = %path.display(),
                    line = i + 1,
                    "dropping truncated final log line: {e}"
                );
            }
            Err(e) => {
                return Err(LoamError::Corruption {
                    path: path.display().to_string(),
                    message: format!("line {}: {e}", i + 1),
                });
            }
        }
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    use loam_core::{LogicalClock, MessageKind, MessagePayload};
    use tempfile::tempdir;

    fn message(clock: &LogicalClock, n: usize, payload: MessagePayload) -> Message {
        Message {
            session_id: "s1".into(),
            run_id: "r1".into(),
            message_id: format!("m{n:04}"),
            timestamp_us: clock.now_us(),
            payload,
        }
    }

    fn text(clock: &LogicalClock, n: usize) -> Message {
        message(
            clock,
            n,
            MessagePayload::Assistant {
                content: format!("reply {n}"),
            },
        )
    }

    async fn log_with(messages: &[Message]) -> (tempfile::TempDir, MessageLog) {
        let dir = tempdir().unwrap();
        let mut log = MessageLog::open(dir.path().join("messages.jsonl"))
            .await
            .unwrap();
        log.append(messages).await.unwrap();
        (dir, log)
    }

    #[tokio::test]
    async fn open_missing_file_is_empty_log() {
        let dir = tempdir().unwrap();
        let log = MessageLog::open(dir.path().join("messages.jsonl"))
            .await
            .unwrap();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn append_then_reopen_preserves_order() {
        let clock = LogicalClock::new();
        let messages: Vec<Message> = (0..10).map(|n| text(&clock, n)).collect();
        let (dir, log) = log_with(&messages).await;
        assert_eq!(log.len(), 10);
        drop(log);

        // Fresh instance against the same directory: crash recovery.
        let reopened = MessageLog::open(dir.path().join("messages.jsonl"))
            .await
            .unwrap();
        let page = reopened.read(100, None, &Cursor::default(), Direction::Newer);
        assert_eq!(page.items, messages, "reopen reproduces append order");
    }

    #[tokio::test]
    async fn older_exhaustion_reproduces_append_order() {
        let clock = LogicalClock::new();
        let mut appended = Vec::new();
        let dir = tempdir().unwrap();
        let mut log = MessageLog::open(dir.path().join("messages.jsonl"))
            .await
            .unwrap();
        // Several batches, as one batch per run would produce.
        for batch in 0..4 {
            let batch_messages: Vec<Message> =
                (0..5).map(|n| text(&clock, batch * 5 + n)).collect();
            log.append(&batch_messages).await.unwrap();
            appended.extend(batch_messages);
        }

        let mut cursor = Cursor::default();
        let mut pages = Vec::new();
        loop {
            let page = log.read(3, None, &cursor, Direction::Older);
            if page.items.is_empty() {
                break;
            }
            cursor = page.cursor;
            pages.push(page.items);
        }
        let collected: Vec<Message> = pages.into_iter().rev().flatten().collect();
        assert_eq!(collected, appended);
    }

    #[tokio::test]
    async fn newer_pagination_never_skips_or_repeats() {
        let clock = LogicalClock::new();
        let messages: Vec<Message> = (0..10).map(|n| text(&clock, n)).collect();
        let (_dir, log) = log_with(&messages).await;

        let first = log.read(6, None, &Cursor::default(), Direction::Newer);
        let second = log.read(6, None, &first.cursor, Direction::Newer);
        let mut seen: Vec<Message> = first.items;
        seen.extend(second.items);
        assert_eq!(seen, messages);
    }

    #[tokio::test]
    async fn filter_excludes_kind_before_count() {
        let clock = LogicalClock::new();
        let mut messages = Vec::new();
        for n in 0..6 {
            messages.push(text(&clock, n * 2));
            messages.push(message(
                &clock,
                n * 2 + 1,
                MessagePayload::ToolCall {
                    call_id: format!("c{n}"),
                    tool: "search".into(),
                    arguments: serde_json::json!({}),
                },
            ));
        }
        let (_dir, log) = log_with(&messages).await;

        let no_tool_calls: Box<MessageFilter> =
            Box::new(|m: &Message| m.payload.kind() != MessageKind::ToolCall);
        let page = log.read(
            4,
            Some(no_tool_calls.as_ref()),
            &Cursor::default(),
            Direction::Newer,
        );
        assert_eq!(page.items.len(), 4, "count reflects post-filter results");
        assert!(
            page.items
                .iter()
                .all(|m| m.payload.kind() == MessageKind::Assistant)
        );
    }

    #[tokio::test]
    async fn equal_timestamps_tie_break_on_message_id() {
        let dir = tempdir().unwrap();
        let mut log = MessageLog::open(dir.path().join("messages.jsonl"))
            .await
            .unwrap();
        let at = |id: &str| Message {
            session_id: "s1".into(),
            run_id: "r1".into(),
            message_id: id.into(),
            timestamp_us: 42,
            payload: MessagePayload::Assistant { content: id.into() },
        };
        log.append(&[at("b"), at("a"), at("c")]).await.unwrap();

        let page = log.read(10, None, &Cursor::default(), Direction::Newer);
        let ids: Vec<&str> = page.items.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn truncated_final_line_is_dropped() {
        let clock = LogicalClock::new();
        let messages: Vec<Message> = (0..3).map(|n| text(&clock, n)).collect();
        let (dir, log) = log_with(&messages).await;
        drop(log);

        // Simulate a torn write: a partial record at the end of the file.
        let path = dir.path().join("messages.jsonl");
        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("{\"session_id\":\"s1\",\"run_id");
        std::fs::write(&path, contents).unwrap();

        let reopened = MessageLog::open(&path).await.unwrap();
        assert_eq!(reopened.len(), 3, "torn final line dropped, rest intact");
    }

    #[tokio::test]
    async fn corrupt_earlier_line_is_fatal() {
        let clock = LogicalClock::new();
        let messages: Vec<Message> = (0..3).map(|n| text(&clock, n)).collect();
        let (dir, log) = log_with(&messages).await;
        drop(log);

        let path = dir.path().join("messages.jsonl");
        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<&str> = contents.lines().collect();
        lines[1] = "this is not json";
        std::fs::write(&path, lines.join("\n")).unwrap();

        let result = MessageLog::open(&path).await;
        assert!(
            matches!(result, Err(LoamError::Corruption { .. })),
            "mid-file corruption must not be silently repaired"
        );
    }

    #[tokio::test]
    async fn empty_batch_append_is_a_no_op() {
        let dir = tempdir().unwrap();
        let mut log = MessageLog::open(dir.path().join("messages.jsonl"))
            .await
            .unwrap();
        log.append(&[]).await.unwrap();
        assert!(log.is_empty());
        assert!(!dir.path().join("messages.jsonl").exists(), "no file created for an empty batch");
    }
}
