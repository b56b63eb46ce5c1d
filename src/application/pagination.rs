//! Cursor pagination helpers for feed connections.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_PAGE_SIZE: u32 = 30;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct FeedCursorPayload {
    /// Absolute position of the edge within the ordered feed.
    index: u64,
}

/// Opaque pointer to a position in a cursor-paginated feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedCursor {
    index: u64,
}

impl FeedCursor {
    pub fn at(index: u64) -> Self {
        Self { index }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn encode(&self) -> String {
        let payload = FeedCursorPayload { index: self.index };
        let serialized =
            serde_json::to_vec(&payload).expect("serializing feed cursor payload should succeed");
        URL_SAFE_NO_PAD.encode(serialized)
    }

    pub fn decode(cursor: &str) -> Result<Self, PaginationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        let payload: FeedCursorPayload = serde_json::from_slice(&bytes)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        Ok(Self {
            index: payload.index,
        })
    }
}

/// Relay-style connection arguments as they arrive on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionArgs {
    pub first: Option<u32>,
    pub after: Option<String>,
}

/// Offset-style arguments used by the anonymous feed.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OffsetArgs {
    pub limit: Option<u32>,
    pub offset: Option<u64>,
}

/// Resolved page descriptor: a clamped limit plus an absolute start offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u32,
    pub offset: u64,
}

impl PageRequest {
    pub fn from_connection(args: &ConnectionArgs) -> Result<Self, PaginationError> {
        let limit = args
            .first
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = match args.after.as_deref() {
            Some(cursor) => FeedCursor::decode(cursor)?.index + 1,
            None => 0,
        };
        Ok(Self { limit, offset })
    }

    pub fn from_offset(args: &OffsetArgs) -> Self {
        Self {
            limit: args.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            offset: args.offset.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Edge<T> {
    pub node: T,
    pub cursor: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

/// Cursor-paginated result page.
#[derive(Debug, Clone, Serialize)]
pub struct Connection<T> {
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
}

impl<T> Connection<T> {
    /// Map rows (already truncated or carrying one probe row) into edges.
    ///
    /// `has_next_page` is true iff more rows were produced than the page
    /// requested; the probe row is discarded from the output.
    pub fn from_rows(mut rows: Vec<T>, page: PageRequest) -> Self {
        let has_next_page = rows.len() as u64 > u64::from(page.limit);
        if has_next_page {
            rows.truncate(page.limit as usize);
        }

        let edges: Vec<Edge<T>> = rows
            .into_iter()
            .enumerate()
            .map(|(position, node)| Edge {
                cursor: FeedCursor::at(page.offset + position as u64).encode(),
                node,
            })
            .collect();

        let page_info = PageInfo {
            has_next_page,
            has_previous_page: page.offset > 0,
            start_cursor: edges.first().map(|edge| edge.cursor.clone()),
            end_cursor: edges.last().map(|edge| edge.cursor.clone()),
        };

        Self { edges, page_info }
    }
}

#[derive(Debug, Error)]
pub enum PaginationError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trip() {
        let cursor = FeedCursor::at(41);
        let decoded = FeedCursor::decode(&cursor.encode()).expect("decoded cursor");
        assert_eq!(decoded.index(), 41);
    }

    #[test]
    fn decoding_garbage_reports_invalid_cursor() {
        let err = FeedCursor::decode("not-base64!").expect_err("invalid cursor rejected");
        assert!(matches!(err, PaginationError::InvalidCursor(_)));
    }

    #[test]
    fn after_cursor_advances_the_offset() {
        let args = ConnectionArgs {
            first: Some(10),
            after: Some(FeedCursor::at(9).encode()),
        };
        let page = PageRequest::from_connection(&args).expect("page");
        assert_eq!(page, PageRequest { limit: 10, offset: 10 });
    }

    #[test]
    fn missing_args_fall_back_to_defaults() {
        let page = PageRequest::from_connection(&ConnectionArgs::default()).expect("page");
        assert_eq!(page.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(page.offset, 0);
    }

    #[test]
    fn limit_is_clamped() {
        let args = ConnectionArgs {
            first: Some(10_000),
            after: None,
        };
        let page = PageRequest::from_connection(&args).expect("page");
        assert_eq!(page.limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn probe_row_sets_has_next_and_is_discarded() {
        let page = PageRequest { limit: 2, offset: 0 };
        let connection = Connection::from_rows(vec!["a", "b", "c"], page);
        assert_eq!(connection.edges.len(), 2);
        assert!(connection.page_info.has_next_page);
        assert!(!connection.page_info.has_previous_page);

        let end = connection.page_info.end_cursor.expect("end cursor");
        assert_eq!(FeedCursor::decode(&end).unwrap().index(), 1);
    }

    #[test]
    fn short_page_has_no_next() {
        let page = PageRequest { limit: 5, offset: 10 };
        let connection = Connection::from_rows(vec!["a"], page);
        assert!(!connection.page_info.has_next_page);
        assert!(connection.page_info.has_previous_page);
        assert_eq!(
            FeedCursor::decode(connection.edges[0].cursor.as_str())
                .unwrap()
                .index(),
            10
        );
    }
}
