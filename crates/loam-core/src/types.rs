// SPDX-FileCopyrightText: 2026 Loam Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Loam persistence layer.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The payload of a session message, one variant per concrete message kind.
///
/// This is a closed union: code that needs per-kind behavior dispatches
/// with `match` rather than downcasting, so a new kind is a compile error
/// at every dispatch site until it is handled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePayload {
    /// System prompt installed at the start of a run.
    SystemPrompt { content: String },
    /// A prompt written by the user.
    UserPrompt { content: String },
    /// Plain assistant text.
    Assistant { content: String },
    /// A tool invocation requested by the model.
    ToolCall {
        call_id: String,
        tool: String,
        arguments: serde_json::Value,
    },
    /// The result returned by a tool invocation.
    ToolCallResponse {
        call_id: String,
        tool: String,
        content: String,
    },
    /// Model output constrained to a structured schema.
    StructuredOutput { content: serde_json::Value },
    /// Free-form text from an unmodeled role.
    GenericText { role: String, content: String },
    /// A reference to an external resource (file, image, URI).
    GenericResource {
        role: String,
        mime_type: String,
        uri: String,
    },
}

/// Discriminant of a [`MessagePayload`], used by read filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    SystemPrompt,
    UserPrompt,
    Assistant,
    ToolCall,
    ToolCallResponse,
    StructuredOutput,
    GenericText,
    GenericResource,
}

impl MessagePayload {
    /// Returns the kind tag for this payload.
    pub fn kind(&self) -> MessageKind {
        match self {
            MessagePayload::SystemPrompt { .. } => MessageKind::SystemPrompt,
            MessagePayload::UserPrompt { .. } => MessageKind::UserPrompt,
            MessagePayload::Assistant { .. } => MessageKind::Assistant,
            MessagePayload::ToolCall { .. } => MessageKind::ToolCall,
            MessagePayload::ToolCallResponse { .. } => MessageKind::ToolCallResponse,
            MessagePayload::StructuredOutput { .. } => MessageKind::StructuredOutput,
            MessagePayload::GenericText { .. } => MessageKind::GenericText,
            MessagePayload::GenericResource { .. } => MessageKind::GenericResource,
        }
    }
}

/// A single session message. Immutable once appended to a log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Session this message belongs to.
    pub session_id: String,
    /// Run (one agent invocation) that produced this message.
    pub run_id: String,
    /// Unique message identifier within the session.
    pub message_id: String,
    /// Logical-clock timestamp in microseconds since the Unix epoch.
    pub timestamp_us: i64,
    /// The message payload.
    pub payload: MessagePayload,
}

impl Message {
    /// Returns the ordering key for this message.
    pub fn key(&self) -> MessageKey {
        MessageKey {
            timestamp_us: self.timestamp_us,
            message_id: self.message_id.clone(),
        }
    }
}

/// Ordering key of a message within one log: `(timestamp, message_id)`.
///
/// The derived `Ord` compares the timestamp first and tie-breaks on the
/// message id lexicographically, giving a strict total order even when
/// two messages carry equal timestamps. Keys are never mutated after
/// append.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageKey {
    pub timestamp_us: i64,
    pub message_id: String,
}

/// Durable per-session summary. Mutable, upsert keyed by session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session this summary describes.
    pub session_id: String,
    /// Short human-readable title.
    pub title: String,
    /// Running summary of the conversation so far.
    pub summary: String,
    /// Topics/keywords extracted from the conversation.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Strictly increases on each successful save; used externally as a
    /// freshness check.
    pub updated_at: DateTime<Utc>,
}

/// Process-local logical clock with microsecond resolution.
///
/// Returns strictly increasing values: wall-clock microseconds, bumped to
/// `last + 1` whenever the wall clock has not advanced. Callers use it to
/// stamp messages so the `(timestamp, message_id)` ordering key stays
/// unique and monotonic per log.
#[derive(Debug, Default)]
pub struct LogicalClock {
    last: AtomicI64,
}

impl LogicalClock {
    /// Creates a clock starting from the current wall time.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next strictly increasing microsecond timestamp.
    pub fn now_us(&self) -> i64 {
        let wall = Utc::now().timestamp_micros();
        self.last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(wall.max(last + 1))
            })
            .map(|last| wall.max(last + 1))
            .unwrap_or(wall)
    }
}
