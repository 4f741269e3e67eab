//! Blob container facade.
//!
//! Blob names are flat keys; separators inside a name are cosmetic and only
//! produce virtual directories when listing without `flat`.

mod object_container;

pub use object_container::ObjectStoreContainer;

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use tokio::io::AsyncRead;
use tracing::{debug, info};

use crate::error::{Result, StorageError};
use crate::hashing::HashingReader;
use crate::listing::{list_all, paginate, ListSegment, ListingQuery, StorageEntry};
use crate::metrics::SharedMetrics;
use crate::path::{normalize_blob_name, validate_blob_name};
use crate::{ByteStream, DEFAULT_PAGE_SIZE};

/// Options passed to the remote store on write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// What the remote store reports back after a write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReceipt {
    pub e_tag: Option<String>,
}

/// Remote blob container.
///
/// Names handed to a client are already normalized and validated.
#[async_trait]
pub trait BlobContainerClient: Send + Sync + Debug {
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Deletes a blob; `BlobNotFound` when it does not exist.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Opens a read stream; `BlobNotFound` when it does not exist.
    async fn open_read(&self, name: &str) -> Result<ByteStream>;

    /// Creates or overwrites a blob with everything readable from `body`.
    async fn write(
        &self,
        name: &str,
        body: &mut (dyn AsyncRead + Unpin + Send),
        options: &WriteOptions,
    ) -> Result<WriteReceipt>;

    /// Returns one segment of at most `page_size` entries, resuming from
    /// `query.continuation_token`.
    async fn list_segment(&self, query: &ListingQuery, page_size: usize) -> Result<ListSegment>;
}

/// A validated reference to a blob. Creating one does not touch the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobRef {
    name: String,
}

impl BlobRef {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Result of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobHandle {
    pub name: String,
    pub content_type: Option<String>,
    pub size: u64,
    /// Hex encoded MD5 of the uploaded bytes.
    pub content_md5: String,
    pub e_tag: Option<String>,
}

/// Blob container facade: exists, delete, download, upload and listing.
#[derive(Debug, Clone)]
pub struct BlobStore {
    client: Arc<dyn BlobContainerClient>,
    page_size: usize,
    metrics: SharedMetrics,
}

impl BlobStore {
    pub fn new(client: Arc<dyn BlobContainerClient>) -> Self {
        Self {
            client,
            page_size: DEFAULT_PAGE_SIZE,
            metrics: SharedMetrics::default(),
        }
    }

    /// Number of entries requested from the store per listing segment.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Normalizes and validates a blob name without any remote call.
    pub fn create_client(&self, blob_name: &str) -> Result<BlobRef> {
        Ok(BlobRef {
            name: validate_blob_name(blob_name)?,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn exists(&self, blob_name: &str) -> Result<bool> {
        let blob = self.create_client(blob_name)?;
        let result = self.client.exists(blob.name()).await;
        self.metrics.observe(&result);
        result
    }

    /// Deletes a blob if it exists. A missing blob is not an error.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, blob_name: &str) -> Result<()> {
        let blob = self.create_client(blob_name)?;
        if !self.client.exists(blob.name()).await? {
            debug!(name = blob.name(), "blob absent, nothing to delete");
            return Ok(());
        }

        let result = self.client.delete(blob.name()).await;
        self.metrics.observe(&result);
        result?;
        self.metrics.entry_deleted();
        info!(name = blob.name(), "blob deleted");
        Ok(())
    }

    /// Opens a download stream.
    ///
    /// With `check_exists` a missing blob yields `Ok(None)`; without it the
    /// transfer is attempted and absence surfaces as `BlobNotFound`.
    #[tracing::instrument(skip(self))]
    pub async fn download(&self, blob_name: &str, check_exists: bool) -> Result<Option<ByteStream>> {
        let blob = self.create_client(blob_name)?;
        if check_exists && !self.client.exists(blob.name()).await? {
            debug!(name = blob.name(), "blob absent");
            return Ok(None);
        }

        let result = self.client.open_read(blob.name()).await;
        self.metrics.observe(&result);
        let stream = result?;
        self.metrics.download_started();

        let metrics = self.metrics.clone();
        Ok(Some(
            stream
                .inspect_ok(move |chunk| metrics.bytes_sent(chunk.len()))
                .boxed(),
        ))
    }

    /// Reads a whole blob into memory.
    pub async fn read_bytes(&self, blob_name: &str) -> Result<Bytes> {
        let mut stream = self
            .download(blob_name, true)
            .await?
            .ok_or_else(|| StorageError::BlobNotFound(normalize_blob_name(blob_name).to_string()))?;

        let mut bytes = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        Ok(bytes.freeze())
    }

    /// Uploads `content` under `blob_name`, overwriting any existing blob.
    ///
    /// The content type is derived from the name's extension when it is
    /// known. `content` is only read, never closed.
    #[tracing::instrument(skip(self, content, metadata))]
    pub async fn upload(
        &self,
        blob_name: &str,
        content: &mut (dyn AsyncRead + Unpin + Send),
        metadata: Option<&HashMap<String, String>>,
    ) -> Result<BlobHandle> {
        let blob = self.create_client(blob_name)?;
        let options = WriteOptions {
            content_type: mime_guess::from_path(blob.name())
                .first_raw()
                .map(str::to_string),
            metadata: metadata.cloned().unwrap_or_default(),
        };

        let mut reader = HashingReader::new(content);
        let result = self.client.write(blob.name(), &mut reader, &options).await;
        self.metrics.observe(&result);
        let receipt = result?;
        let (content_md5, size) = reader.finalize();

        self.metrics.entry_uploaded();
        self.metrics.bytes_received(size);
        info!(name = blob.name(), size, md5 = %content_md5, "blob uploaded");

        Ok(BlobHandle {
            name: blob.name,
            content_type: options.content_type,
            size,
            content_md5,
            e_tag: receipt.e_tag,
        })
    }

    /// Lists blobs under `prefix`.
    ///
    /// Without `flat` the store groups names at the next `/` and returns those
    /// groups as directory entries.
    pub async fn list_files(
        &self,
        prefix: Option<&str>,
        flat: bool,
        max_results: Option<usize>,
    ) -> Result<Vec<StorageEntry>> {
        let mut query = ListingQuery::new().flat(flat);
        query.prefix = prefix.map(str::to_string);
        query.max_results = max_results;
        self.list(&query).await
    }

    /// Drains every segment of `query` into a list.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, query: &ListingQuery) -> Result<Vec<StorageEntry>> {
        let query = self.normalize_query(query);
        let client = self.client.clone();
        let metrics = self.metrics.clone();
        let page_size = self.page_size;
        let segment_query = query.clone();

        let pages = paginate(query.continuation_token.clone(), move |token| {
            let client = client.clone();
            let metrics = metrics.clone();
            let query = segment_query.clone().with_continuation_token(token);
            async move {
                let result = client.list_segment(&query, page_size).await;
                metrics.observe(&result);
                if result.is_ok() {
                    metrics.page_fetched();
                }
                result
            }
        });

        let entries = list_all(pages, query.include_directories, query.max_results).await?;
        debug!(count = entries.len(), "blob listing materialized");
        Ok(entries)
    }

    /// Fetches a single segment so callers can page through a listing
    /// themselves with the returned continuation token.
    pub async fn list_segment(&self, query: &ListingQuery) -> Result<ListSegment> {
        let query = self.normalize_query(query);
        let page_size = query
            .max_results
            .map_or(self.page_size, |max| max.clamp(1, self.page_size));

        let result = self.client.list_segment(&query, page_size).await;
        self.metrics.observe(&result);
        let mut segment = result?;
        self.metrics.page_fetched();
        if !query.include_directories {
            segment.entries.retain(|entry| !entry.is_directory);
        }
        Ok(segment)
    }

    fn normalize_query(&self, query: &ListingQuery) -> ListingQuery {
        let mut query = query.clone();
        query.prefix = query
            .prefix
            .as_deref()
            .map(normalize_blob_name)
            .filter(|prefix| !prefix.is_empty())
            .map(str::to_string);
        query
    }
}
