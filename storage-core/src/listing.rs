//! Paged listings.
//!
//! Remote stores hand out listings one segment at a time together with a
//! continuation token. [`paginate`] turns a segment fetcher into a lazy page
//! stream and [`list_all`] drains such a stream into a list.

use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use serde::Serialize;

use crate::error::{Result, StorageError};

/// One entry of a listing, a file/blob or a (virtual) directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageEntry {
    /// Full path relative to the container or share root.
    pub name: String,
    pub is_directory: bool,
    pub size: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl StorageEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: false,
            size: None,
            last_modified: None,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
            size: None,
            last_modified: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    /// Leaf part of the name.
    pub fn display_name(&self) -> &str {
        match self.name.rfind('/') {
            Some(idx) => &self.name[idx + 1..],
            None => &self.name,
        }
    }
}

/// Opaque resume point handed out by the remote store.
#[derive(Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContinuationToken({})", self.0)
    }
}

/// One page of a listing as returned by the remote store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListSegment {
    pub entries: Vec<StorageEntry>,
    /// `None` once the listing is exhausted.
    pub continuation_token: Option<ContinuationToken>,
}

impl ListSegment {
    pub fn has_more(&self) -> bool {
        self.continuation_token.is_some()
    }
}

/// Parameters of a listing call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingQuery {
    pub prefix: Option<String>,
    /// Return every entry regardless of nesting instead of grouping by the
    /// next directory boundary.
    pub flat: bool,
    pub max_results: Option<usize>,
    pub include_directories: bool,
    pub continuation_token: Option<ContinuationToken>,
}

impl ListingQuery {
    pub fn new() -> Self {
        Self {
            include_directories: true,
            ..Default::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn flat(mut self, flat: bool) -> Self {
        self.flat = flat;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn include_directories(mut self, include: bool) -> Self {
        self.include_directories = include;
        self
    }

    pub fn with_continuation_token(mut self, token: Option<ContinuationToken>) -> Self {
        self.continuation_token = token;
        self
    }
}

/// Builds a lazy page stream from a segment fetcher.
///
/// `fetch` is called once per polled page, starting with `first` and then
/// with each continuation token the store returns. Nothing is requested until
/// the stream is polled, and no page is requested after the store stops
/// returning a token.
pub fn paginate<'a, F, Fut>(
    first: Option<ContinuationToken>,
    fetch: F,
) -> BoxStream<'a, Result<Vec<StorageEntry>>>
where
    F: FnMut(Option<ContinuationToken>) -> Fut + Send + 'a,
    Fut: Future<Output = Result<ListSegment>> + Send + 'a,
{
    stream::try_unfold((Some(first), fetch), |(next, mut fetch)| async move {
        let Some(token) = next else {
            return Ok::<_, StorageError>(None);
        };
        let segment = fetch(token).await?;
        let next = segment.has_more().then_some(segment.continuation_token);
        Ok(Some((segment.entries, (next, fetch))))
    })
    .boxed()
}

/// Drains a page stream into a list in server order.
///
/// Directory entries are skipped when `include_directories` is false and do
/// not count towards `max_results`. Once `max_results` entries are collected
/// no further page is polled. The stream is dropped on every return path, and
/// an error from any page fails the whole call.
pub async fn list_all<S>(
    pages: S,
    include_directories: bool,
    max_results: Option<usize>,
) -> Result<Vec<StorageEntry>>
where
    S: Stream<Item = Result<Vec<StorageEntry>>>,
{
    let mut result = Vec::new();
    if max_results == Some(0) {
        return Ok(result);
    }

    let mut pages = std::pin::pin!(pages);
    while let Some(page) = pages.next().await {
        for entry in page? {
            if !include_directories && entry.is_directory {
                continue;
            }
            result.push(entry);
            if max_results.is_some_and(|max| result.len() >= max) {
                return Ok(result);
            }
        }
    }

    Ok(result)
}
