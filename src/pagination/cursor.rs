//! Cursor pagination with opaque continuation tokens.
//!
//! A token is base64 of `{"lastId": ..., "timestamp": ...}`. Sources return
//! items ordered by id and honour an `id > lastId` predicate, so a token stays
//! valid while the result set grows.

use crate::error::Result;
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Decoded cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorToken {
    pub last_id: String,
    /// Milliseconds since the Unix epoch when the token was issued.
    pub timestamp: u64,
}

impl CursorToken {
    pub fn new(last_id: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            last_id: last_id.into(),
            timestamp,
        }
    }

    pub fn encode(&self) -> String {
        // Serializing a struct of a string and an integer cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        general_purpose::STANDARD.encode(json)
    }
}

/// Issue a token pointing just past `last_id`.
pub fn create_token(last_id: &str) -> String {
    CursorToken::new(last_id).encode()
}

/// Decode a token. Anything malformed yields `None`.
///
/// ```
/// use framedex::pagination::cursor::{create_token, parse_token};
///
/// let token = create_token("det-42");
/// assert_eq!(parse_token(&token).unwrap().last_id, "det-42");
/// assert!(parse_token("definitely not base64!").is_none());
/// ```
pub fn parse_token(token: &str) -> Option<CursorToken> {
    let bytes = match general_purpose::STANDARD.decode(token.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("Ignoring cursor token that is not base64: {}", e);
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(cursor) => Some(cursor),
        Err(e) => {
            log::warn!("Ignoring cursor token with bad payload: {}", e);
            None
        }
    }
}

/// A query that can be resumed after a given id.
pub trait CursorSource {
    type Item;

    /// Up to `limit` items with id strictly greater than `after`, in id order.
    fn fetch_after(&self, after: Option<&str>, limit: usize) -> Result<Vec<Self::Item>>;

    /// Id used for ordering and for the next token.
    fn cursor_id(&self, item: &Self::Item) -> String;
}

/// One cursor page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPage<T> {
    pub results: Vec<T>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Fetch the page after `token`. An unreadable token restarts from the
/// beginning.
pub fn paginate_cursor<S: CursorSource>(
    source: &S,
    token: Option<&str>,
    limit: usize,
) -> Result<CursorPage<S::Item>> {
    let limit = limit.max(1);
    let cursor = token.and_then(parse_token);
    let after = cursor.as_ref().map(|c| c.last_id.as_str());

    let mut results = source.fetch_after(after, limit + 1)?;
    let has_more = results.len() > limit;
    results.truncate(limit);

    let next_cursor = if has_more {
        results.last().map(|item| create_token(&source.cursor_id(item)))
    } else {
        None
    };

    Ok(CursorPage {
        results,
        next_cursor,
        has_more,
    })
}

/// In-memory source sorted by the id extracted with `id_of`.
pub struct SliceSource<T, F> {
    items: Vec<T>,
    id_of: F,
}

impl<T, F> SliceSource<T, F>
where
    F: Fn(&T) -> &str,
{
    pub fn new(mut items: Vec<T>, id_of: F) -> Self {
        items.sort_by(|a, b| id_of(a).cmp(id_of(b)));
        Self { items, id_of }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T, F> CursorSource for SliceSource<T, F>
where
    T: Clone,
    F: Fn(&T) -> &str,
{
    type Item = T;

    fn fetch_after(&self, after: Option<&str>, limit: usize) -> Result<Vec<T>> {
        let from = match after {
            Some(last) => self
                .items
                .partition_point(|item| (self.id_of)(item) <= last),
            None => 0,
        };
        Ok(self.items[from..].iter().take(limit).cloned().collect())
    }

    fn cursor_id(&self, item: &T) -> String {
        (self.id_of)(item).to_string()
    }
}
