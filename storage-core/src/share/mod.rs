//! Hierarchical file share facade.
//!
//! Paths are split with [`crate::path::parse`] into a directory and a leaf;
//! only the leaf's own directory is ever created implicitly.

mod local;

pub use local::LocalShare;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncRead;
use tracing::{debug, info};

use crate::error::{Result, StorageError};
use crate::hashing::HashingReader;
use crate::listing::{list_all, paginate, ContinuationToken, ListSegment, StorageEntry};
use crate::metrics::SharedMetrics;
use crate::path::{join, normalize_directory, parse};
use crate::{ByteStream, DEFAULT_PAGE_SIZE};

/// Remote file share. An empty directory is the share root.
#[async_trait]
pub trait ShareClient: Send + Sync + Debug {
    async fn directory_exists(&self, directory: &str) -> Result<bool>;

    /// Creates one directory level; its parent must exist. Creating an
    /// existing directory succeeds.
    async fn create_directory(&self, directory: &str) -> Result<()>;

    async fn file_exists(&self, directory: &str, file_name: &str) -> Result<bool>;

    async fn delete_file(&self, directory: &str, file_name: &str) -> Result<()>;

    async fn open_read(&self, directory: &str, file_name: &str) -> Result<ByteStream>;

    /// Creates or overwrites a file, returning the number of bytes written.
    async fn create_file(
        &self,
        directory: &str,
        file_name: &str,
        body: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64>;

    /// One segment of a single directory level. Entry names are full paths
    /// from the share root.
    async fn list_segment(
        &self,
        directory: &str,
        page_size: usize,
        token: Option<&ContinuationToken>,
    ) -> Result<ListSegment>;
}

/// A file located inside an existing share directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareFileRef {
    pub directory: String,
    pub file_name: String,
}

impl ShareFileRef {
    pub fn full_path(&self) -> String {
        join(&self.directory, &self.file_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    pub path: String,
    pub size: u64,
    pub content_md5: String,
}

#[derive(Debug, Clone)]
pub struct FileShareStore {
    client: Arc<dyn ShareClient>,
    page_size: usize,
    metrics: SharedMetrics,
}

impl FileShareStore {
    pub fn new(client: Arc<dyn ShareClient>) -> Self {
        Self {
            client,
            page_size: DEFAULT_PAGE_SIZE,
            metrics: SharedMetrics::default(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    fn split(path: &str) -> Result<ShareFileRef> {
        let parsed = parse(path);
        if parsed.file_name.trim().is_empty() {
            return Err(StorageError::InvalidName(path.to_string()));
        }
        Ok(ShareFileRef {
            directory: parsed.directory_name,
            file_name: parsed.file_name,
        })
    }

    async fn directory_exists(&self, directory: &str) -> Result<bool> {
        if directory.is_empty() {
            return Ok(true);
        }
        let result = self.client.directory_exists(directory).await;
        self.metrics.observe(&result);
        result
    }

    /// Resolves `path` to a file reference; a non-root directory must exist.
    #[tracing::instrument(skip(self))]
    pub async fn find_client(&self, path: &str) -> Result<ShareFileRef> {
        let file = Self::split(path)?;
        if !self.directory_exists(&file.directory).await? {
            return Err(StorageError::DirectoryNotFound(file.directory));
        }
        Ok(file)
    }

    #[tracing::instrument(skip(self))]
    pub async fn exists(&self, path: &str) -> Result<bool> {
        let file = Self::split(path)?;
        if !self.directory_exists(&file.directory).await? {
            return Ok(false);
        }
        let result = self.client.file_exists(&file.directory, &file.file_name).await;
        self.metrics.observe(&result);
        result
    }

    /// Deletes a file; a missing file or directory is not an error.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, path: &str) -> Result<()> {
        if !self.exists(path).await? {
            debug!(path, "file absent, nothing to delete");
            return Ok(());
        }
        let file = Self::split(path)?;
        let result = self.client.delete_file(&file.directory, &file.file_name).await;
        self.metrics.observe(&result);
        result?;
        self.metrics.entry_deleted();
        info!(path = %file.full_path(), "file deleted");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn download(&self, path: &str) -> Result<ByteStream> {
        let file = self.find_client(path).await?;
        let result = self.client.open_read(&file.directory, &file.file_name).await;
        self.metrics.observe(&result);
        let stream = result?;
        self.metrics.download_started();
        Ok(stream)
    }

    /// Writes `content` to `path`, creating the file's directory when it is
    /// missing. Only that one level is created.
    #[tracing::instrument(skip(self, content))]
    pub async fn upload(
        &self,
        content: &mut (dyn AsyncRead + Unpin + Send),
        path: &str,
    ) -> Result<UploadedFile> {
        let file = Self::split(path)?;
        if !self.directory_exists(&file.directory).await? {
            let result = self.client.create_directory(&file.directory).await;
            self.metrics.observe(&result);
            result?;
            debug!(directory = %file.directory, "created directory");
        }

        let mut reader = HashingReader::new(content);
        let result = self
            .client
            .create_file(&file.directory, &file.file_name, &mut reader)
            .await;
        self.metrics.observe(&result);
        let size = result?;
        let (content_md5, _) = reader.finalize();

        self.metrics.entry_uploaded();
        self.metrics.bytes_received(size);
        info!(path = %file.full_path(), size, "file uploaded");

        Ok(UploadedFile {
            path: file.full_path(),
            size,
            content_md5,
        })
    }

    /// Lists one level of `directory`, the share root when empty.
    #[tracing::instrument(skip(self))]
    pub async fn list_files(
        &self,
        directory: &str,
        include_directories: bool,
    ) -> Result<Vec<StorageEntry>> {
        let directory = normalize_directory(directory).to_string();
        if !self.directory_exists(&directory).await? {
            return Err(StorageError::DirectoryNotFound(directory));
        }

        let client = self.client.clone();
        let metrics = self.metrics.clone();
        let page_size = self.page_size;
        let pages = paginate(None, move |token| {
            let client = client.clone();
            let metrics = metrics.clone();
            let directory = directory.clone();
            async move {
                let result = client
                    .list_segment(&directory, page_size, token.as_ref())
                    .await;
                metrics.observe(&result);
                if result.is_ok() {
                    metrics.page_fetched();
                }
                result
            }
        });

        list_all(pages, include_directories, None).await
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;

    use super::*;

    async fn share() -> (tempfile::TempDir, FileShareStore) {
        let dir = tempfile::tempdir().unwrap();
        let client = LocalShare::new(dir.path());
        (dir, FileShareStore::new(Arc::new(client)).with_page_size(2))
    }

    async fn upload(store: &FileShareStore, path: &str, data: &[u8]) -> UploadedFile {
        let mut body = data;
        store.upload(&mut body, path).await.unwrap()
    }

    async fn read(store: &FileShareStore, path: &str) -> Vec<u8> {
        let chunks: Vec<_> = store
            .download(path)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn test_upload_creates_directory() {
        let (root, store) = share().await;
        let uploaded = upload(&store, "docs/readme.txt", b"hello world").await;

        assert_eq!(uploaded.path, "docs/readme.txt");
        assert_eq!(uploaded.size, 11);
        assert_eq!(uploaded.content_md5, "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert!(root.path().join("docs").is_dir());
        assert_eq!(read(&store, "docs/readme.txt").await, b"hello world");
    }

    #[tokio::test]
    async fn test_upload_does_not_create_ancestors() {
        let (_root, store) = share().await;
        let mut body: &[u8] = b"x";
        let err = store.upload(&mut body, "a/b/c.txt").await.unwrap_err();
        assert!(matches!(err, StorageError::DirectoryNotFound(_)));
    }

    #[tokio::test]
    async fn test_upload_overwrites() {
        let (_root, store) = share().await;
        upload(&store, "note.txt", b"first version").await;
        upload(&store, "/note.txt", b"second").await;
        assert_eq!(read(&store, "note.txt").await, b"second");
    }

    #[tokio::test]
    async fn test_find_client() {
        let (_root, store) = share().await;
        upload(&store, "docs/a.txt", b"x").await;

        let file = store.find_client("docs/a.txt").await.unwrap();
        assert_eq!(file.directory, "docs");
        assert_eq!(file.file_name, "a.txt");

        // the leaf itself is not required to exist
        let file = store.find_client("docs\\b.txt").await.unwrap();
        assert_eq!(file.full_path(), "docs/b.txt");

        let root_file = store.find_client("top.txt").await.unwrap();
        assert_eq!(root_file.directory, "");

        assert!(matches!(
            store.find_client("missing/a.txt").await,
            Err(StorageError::DirectoryNotFound(_))
        ));
        assert!(matches!(
            store.find_client("docs/").await,
            Err(StorageError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (root, store) = share().await;
        upload(&store, "docs/a.txt", b"x").await;

        store.delete("docs/a.txt").await.unwrap();
        assert!(!root.path().join("docs/a.txt").exists());
        store.delete("docs/a.txt").await.unwrap();
        store.delete("nowhere/a.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_download_missing_file() {
        let (_root, store) = share().await;
        upload(&store, "docs/a.txt", b"x").await;
        assert!(matches!(
            store.download("docs/b.txt").await.err().unwrap(),
            StorageError::FileNotFound(_)
        ));
        assert!(store.download("nowhere/b.txt").await.err().unwrap().is_not_found());
    }

    #[tokio::test]
    async fn test_directory_path_is_not_a_file() {
        let (root, store) = share().await;
        upload(&store, "docs/a.txt", b"x").await;

        assert!(!store.exists("docs").await.unwrap());
        assert!(matches!(
            store.download("docs").await.err().unwrap(),
            StorageError::FileNotFound(_)
        ));

        let mut body: &[u8] = b"overwrite";
        assert!(matches!(
            store.upload(&mut body, "docs").await,
            Err(StorageError::InvalidName(_))
        ));
        assert!(root.path().join("docs/a.txt").is_file());
    }

    #[tokio::test]
    async fn test_list_files_across_pages() {
        let (_root, store) = share().await;
        for name in ["docs/c.txt", "docs/a.txt", "docs/b.txt"] {
            upload(&store, name, b"x").await;
        }
        upload(&store, "docs/sub/d.txt", b"x").await;

        let entries = store.list_files("docs", true).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| (e.name.as_str(), e.is_directory)).collect();
        assert_eq!(
            names,
            [
                ("docs/a.txt", false),
                ("docs/b.txt", false),
                ("docs/c.txt", false),
                ("docs/sub", true)
            ]
        );

        let files = store.list_files("/docs/", false).await.unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(files[0].size, Some(1));
    }

    #[tokio::test]
    async fn test_list_missing_directory() {
        let (_root, store) = share().await;
        assert!(store.list_files("", true).await.unwrap().is_empty());
        assert!(matches!(
            store.list_files("nowhere", true).await,
            Err(StorageError::DirectoryNotFound(_))
        ));
    }
}
