use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{future, Stream, StreamExt, TryStreamExt};
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{
    parse_url_opts, Attribute, Attributes, ObjectMeta, ObjectStore, ObjectStoreScheme,
    PutMultipartOptions, WriteMultipart,
};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};
use url::Url;

use super::{BlobContainerClient, WriteOptions, WriteReceipt};
use crate::error::{Result, StorageError};
use crate::listing::{ContinuationToken, ListSegment, ListingQuery, StorageEntry};
use crate::ByteStream;

const CHUNK_SIZE: usize = 64 * 1024;
const MAX_IN_FLIGHT_PARTS: usize = 4;

/// Blob container backed by any [`ObjectStore`]: S3, Azure, a local
/// directory or memory.
///
/// The container is a path prefix inside the store; blob names are appended
/// to it one `/` separated segment at a time.
#[derive(Clone)]
pub struct ObjectStoreContainer {
    store: Arc<dyn ObjectStore>,
    base: Path,
    attributes: bool,
    ordered_listing: bool,
}

impl fmt::Debug for ObjectStoreContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreContainer")
            .field("store", &self.store.to_string())
            .field("base", &self.base.as_ref())
            .field("ordered_listing", &self.ordered_listing)
            .finish()
    }
}

impl ObjectStoreContainer {
    pub fn new(store: Arc<dyn ObjectStore>, container: &str) -> Self {
        Self {
            store,
            base: append(Path::default(), container),
            attributes: true,
            ordered_listing: true,
        }
    }

    pub fn in_memory(container: &str) -> Self {
        Self::new(Arc::new(InMemory::new()), container)
    }

    /// Builds a container from a store url such as `s3://bucket`,
    /// `az://account/share` or `file:///var/lib/blobs`.
    ///
    /// Credentials are picked up from `AWS_*` and `AZURE_*` environment
    /// variables.
    pub fn from_url(url: &str, container: &str) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| StorageError::Configuration(format!("invalid blob store url {url}: {e}")))?;
        let (scheme, _) = ObjectStoreScheme::parse(&parsed)
            .map_err(|e| StorageError::Configuration(format!("unsupported blob store url {url}: {e}")))?;

        let opts: Vec<(String, String)> = std::env::vars()
            .filter(|(key, _)| key.starts_with("AWS_") || key.starts_with("AZURE_"))
            .map(|(key, value)| (key.to_ascii_lowercase(), value))
            .collect();
        let (store, base) = parse_url_opts(&parsed, opts)
            .map_err(|e| StorageError::Configuration(format!("failed to open blob store {url}: {e}")))?;

        debug!(?scheme, base = base.as_ref(), container, "opened blob store");
        let opened = Self {
            store: Arc::from(store),
            base: append(base, container),
            attributes: true,
            ordered_listing: true,
        };
        Ok(match scheme {
            ObjectStoreScheme::Local => opened.for_local_directory(),
            _ => opened,
        })
    }

    /// Adapts to a store on the local file system, which keeps no object
    /// attributes and lists in directory order rather than by name.
    pub fn for_local_directory(mut self) -> Self {
        self.attributes = false;
        self.ordered_listing = false;
        self
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }

    fn location(&self, name: &str) -> Path {
        append(self.base.clone(), name)
    }

    fn relative_name(&self, location: &Path) -> String {
        let raw = location.as_ref();
        let base = self.base.as_ref();
        let relative = match raw.strip_prefix(base) {
            Some(rest) if !base.is_empty() => rest.trim_start_matches('/'),
            _ => raw,
        };
        match urlencoding::decode(relative) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => relative.to_string(),
        }
    }

    fn attributes_for(&self, options: &WriteOptions) -> Attributes {
        let mut attributes = Attributes::new();
        if !self.attributes {
            return attributes;
        }
        if let Some(content_type) = &options.content_type {
            attributes.insert(Attribute::ContentType, content_type.clone().into());
        }
        for (key, value) in &options.metadata {
            attributes.insert(
                Attribute::Metadata(Cow::Owned(key.clone())),
                value.clone().into(),
            );
        }
        attributes
    }

    /// Directory of `prefix` that the store can list. Object store prefixes
    /// match whole segments only, so a partial leaf is filtered afterwards.
    fn list_root(&self, prefix: &str) -> Path {
        match prefix.rfind('/') {
            Some(idx) => self.location(&prefix[..idx]),
            None => self.base.clone(),
        }
    }

    fn entry(&self, meta: &ObjectMeta) -> StorageEntry {
        StorageEntry::file(self.relative_name(&meta.location))
            .with_size(meta.size)
            .with_last_modified(meta.last_modified)
    }

    /// Pulls entries under `prefix` off a name ordered listing until one
    /// more than `page_size` is seen. The rest of the listing is not read.
    async fn take_page<S>(&self, metas: S, prefix: &str, page_size: usize) -> Result<Vec<StorageEntry>>
    where
        S: Stream<Item = object_store::Result<ObjectMeta>>,
    {
        metas
            .map_err(StorageError::unavailable)
            .map_ok(|meta| self.entry(&meta))
            .try_filter(|entry| future::ready(entry.name.starts_with(prefix)))
            .take(page_size.saturating_add(1))
            .try_collect()
            .await
    }
}

fn append(mut path: Path, name: &str) -> Path {
    for segment in name.split('/').filter(|s| !s.is_empty()) {
        path = path.child(segment);
    }
    path
}

fn map_error(name: &str, err: object_store::Error) -> StorageError {
    match err {
        object_store::Error::NotFound { .. } => StorageError::BlobNotFound(name.to_string()),
        other => StorageError::unavailable(other),
    }
}

#[async_trait]
impl BlobContainerClient for ObjectStoreContainer {
    async fn exists(&self, name: &str) -> Result<bool> {
        match self.store.head(&self.location(name)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::unavailable(e)),
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.store
            .delete(&self.location(name))
            .await
            .map_err(|e| map_error(name, e))
    }

    async fn open_read(&self, name: &str) -> Result<ByteStream> {
        let result = self
            .store
            .get(&self.location(name))
            .await
            .map_err(|e| map_error(name, e))?;
        let name = name.to_string();
        Ok(result
            .into_stream()
            .map_err(move |e| map_error(&name, e))
            .boxed())
    }

    async fn write(
        &self,
        name: &str,
        body: &mut (dyn AsyncRead + Unpin + Send),
        options: &WriteOptions,
    ) -> Result<WriteReceipt> {
        let location = self.location(name);
        let opts = PutMultipartOptions {
            attributes: self.attributes_for(options),
            ..Default::default()
        };
        let upload = self
            .store
            .put_multipart_opts(&location, opts)
            .await
            .map_err(StorageError::unavailable)?;
        let mut writer = WriteMultipart::new(upload);

        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let read = match body.read(&mut buf).await {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) => {
                    if let Err(abort) = writer.abort().await {
                        warn!(name, error = %abort, "failed to abort multipart upload");
                    }
                    return Err(e.into());
                }
            };
            writer
                .wait_for_capacity(MAX_IN_FLIGHT_PARTS)
                .await
                .map_err(StorageError::unavailable)?;
            writer.write(&buf[..read]);
        }

        let result = writer.finish().await.map_err(StorageError::unavailable)?;
        Ok(WriteReceipt {
            e_tag: result.e_tag,
        })
    }

    async fn list_segment(&self, query: &ListingQuery, page_size: usize) -> Result<ListSegment> {
        let prefix = query.prefix.as_deref().unwrap_or("");
        let root = self.list_root(prefix);
        let after = query.continuation_token.as_ref().map(|t| t.as_str());

        let mut entries = if query.flat && self.ordered_listing {
            let metas = match after {
                Some(after) => self.store.list_with_offset(Some(&root), &self.location(after)),
                None => self.store.list(Some(&root)),
            };
            self.take_page(metas, prefix, page_size).await?
        } else if query.flat {
            self.store
                .list(Some(&root))
                .map_ok(|meta| self.entry(&meta))
                .try_collect::<Vec<_>>()
                .await
                .map_err(StorageError::unavailable)?
        } else {
            let listed = self
                .store
                .list_with_delimiter(Some(&root))
                .await
                .map_err(StorageError::unavailable)?;
            let directories = listed
                .common_prefixes
                .iter()
                .map(|p| StorageEntry::directory(self.relative_name(p)));
            let files = listed.objects.iter().map(|meta| self.entry(meta));
            directories.chain(files).collect()
        };

        entries.retain(|entry| {
            entry.name.starts_with(prefix) && after.map_or(true, |after| entry.name.as_str() > after)
        });
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let continuation_token = if entries.len() > page_size {
            entries.truncate(page_size);
            entries
                .last()
                .map(|entry| ContinuationToken::new(entry.name.clone()))
        } else {
            None
        };

        Ok(ListSegment {
            entries,
            continuation_token,
        })
    }
}
