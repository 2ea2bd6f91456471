// SPDX-FileCopyrightText: 2026 Loam Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bidirectional cursor pagination over an ordered index.
//!
//! A [`Cursor`] remembers the two edges of what a client has already
//! seen: the oldest-known and the newest-known ordering key. Either edge
//! can be advanced independently across repeated calls — paging older
//! never loses track of where "newer" resumes, and vice versa.
//!
//! The module is generic over the ordering key so the per-session message
//! log and the sessions listing share one implementation.

use std::collections::BTreeMap;
use std::ops::Bound;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use loam_core::LoamError;

/// Which way to page relative to the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Scan strictly before the oldest-known edge.
    Older,
    /// Scan strictly after the newest-known edge.
    Newer,
}

/// Opaque pagination state: the two edges of what the client has seen.
///
/// A default cursor (both edges unknown) means "nothing seen yet": the
/// first `Older` page starts from the newest record, the first `Newer`
/// page from the oldest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor<K> {
    oldest: Option<K>,
    newest: Option<K>,
}

impl<K> Cursor<K> {
    /// The oldest-known edge, if any page has established one.
    pub fn oldest(&self) -> Option<&K> {
        self.oldest.as_ref()
    }

    /// The newest-known edge, if any page has established one.
    pub fn newest(&self) -> Option<&K> {
        self.newest.as_ref()
    }
}

impl<K: Serialize + DeserializeOwned> Cursor<K> {
    /// Encodes the cursor as an opaque URL-safe token for transport.
    pub fn encode(&self) -> Result<String, LoamError> {
        let json = serde_json::to_vec(self)
            .map_err(|e| LoamError::Internal(format!("cursor encoding failed: {e}")))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decodes a token produced by [`Cursor::encode`].
    pub fn decode(token: &str) -> Result<Self, LoamError> {
        let json = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| LoamError::Internal(format!("malformed cursor token: {e}")))?;
        serde_json::from_slice(&json)
            .map_err(|e| LoamError::Internal(format!("malformed cursor token: {e}")))
    }
}

/// One page of results plus the cursor to resume from.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<K, V> {
    /// Matching records in chronological (ascending key) order,
    /// regardless of scan direction.
    pub items: Vec<V>,
    /// Cursor with the paged edge advanced. The opposite edge is left
    /// untouched unless it was previously unknown, in which case it is
    /// filled in from this page.
    pub cursor: Cursor<K>,
}

/// Takes up to `count` post-filter records from `index` in the given
/// direction relative to `cursor`.
///
/// The filter applies during the scan, before the `count` cutoff, so a
/// full page means `count` records actually survived the filter. An empty
/// page returns the cursor unchanged.
pub fn paginate<K, V, F>(
    index: &BTreeMap<K, V>,
    count: usize,
    filter: F,
    cursor: &Cursor<K>,
    direction: Direction,
) -> Page<K, V>
where
    K: Ord + Clone,
    V: Clone,
    F: Fn(&V) -> bool,
{
    let taken: Vec<(K, V)> = match direction {
        Direction::Older => {
            let upper = match &cursor.oldest {
                Some(edge) => Bound::Excluded(edge),
                None => Bound::Unbounded,
            };
            let mut page: Vec<(K, V)> = index
                .range((Bound::Unbounded, upper))
                .rev()
                .filter(|(_, v)| filter(v))
                .take(count)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            // Scanned descending; responses are always chronological.
            page.reverse();
            page
        }
        Direction::Newer => {
            let lower = match &cursor.newest {
                Some(edge) => Bound::Excluded(edge),
                None => Bound::Unbounded,
            };
            index
                .range((lower, Bound::Unbounded))
                .filter(|(_, v)| filter(v))
                .take(count)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        }
    };

    let mut next = cursor.clone();
    if let (Some((first, _)), Some((last, _))) = (taken.first(), taken.last()) {
        match direction {
            Direction::Older => {
                next.oldest = Some(first.clone());
                if next.newest.is_none() {
                    next.newest = Some(last.clone());
                }
            }
            Direction::Newer => {
                next.newest = Some(last.clone());
                if next.oldest.is_none() {
                    next.oldest = Some(first.clone());
                }
            }
        }
    }

    Page {
        items: taken.into_iter().map(|(_, v)| v).collect(),
        cursor: next,
    }
}
