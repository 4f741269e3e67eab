use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio_util::io::ReaderStream;

use super::ShareClient;
use crate::error::{Result, StorageError};
use crate::listing::{ContinuationToken, ListSegment, StorageEntry};
use crate::path::join;
use crate::ByteStream;

/// A file share rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalShare {
    root: PathBuf,
}

impl LocalShare {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Opens the share `share` below `root`, creating it when missing.
    pub async fn open(root: impl AsRef<Path>, share: &str) -> Result<Self> {
        let segments = segments(share)?;
        let mut path = root.as_ref().to_path_buf();
        path.extend(&segments);
        fs::create_dir_all(&path).await?;
        Ok(Self::new(path))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn directory_path(&self, directory: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        path.extend(segments(directory)?);
        Ok(path)
    }

    fn file_path(&self, directory: &str, file_name: &str) -> Result<PathBuf> {
        if segments(file_name)?.len() != 1 {
            return Err(StorageError::InvalidName(file_name.to_string()));
        }
        Ok(self.directory_path(directory)?.join(file_name))
    }
}

/// Splits a share path on either separator, rejecting segments that would
/// escape the share.
fn segments(raw: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = raw
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.iter().any(|s| *s == "." || *s == "..") {
        return Err(StorageError::InvalidName(raw.to_string()));
    }
    Ok(segments)
}

fn display_directory(directory: &str) -> String {
    segments(directory).map(|s| s.join("/")).unwrap_or_default()
}

#[async_trait]
impl ShareClient for LocalShare {
    async fn directory_exists(&self, directory: &str) -> Result<bool> {
        match fs::metadata(self.directory_path(directory)?).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_directory(&self, directory: &str) -> Result<()> {
        match fs::create_dir(self.directory_path(directory)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::DirectoryNotFound(directory.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn file_exists(&self, directory: &str, file_name: &str) -> Result<bool> {
        match fs::metadata(self.file_path(directory, file_name)?).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_file(&self, directory: &str, file_name: &str) -> Result<()> {
        match fs::remove_file(self.file_path(directory, file_name)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::FileNotFound(join(directory, file_name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn open_read(&self, directory: &str, file_name: &str) -> Result<ByteStream> {
        let path = self.file_path(directory, file_name)?;
        if !self.file_exists(directory, file_name).await? {
            return Err(StorageError::FileNotFound(join(directory, file_name)));
        }
        let file = match fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::FileNotFound(join(directory, file_name)))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(ReaderStream::new(file).map_err(StorageError::from).boxed())
    }

    async fn create_file(
        &self,
        directory: &str,
        file_name: &str,
        body: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<u64> {
        let path = self.file_path(directory, file_name)?;
        // a directory already holds this name
        if fs::metadata(&path).await.is_ok_and(|meta| meta.is_dir()) {
            return Err(StorageError::InvalidName(join(directory, file_name)));
        }
        let mut file = match fs::File::create(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::DirectoryNotFound(directory.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let written = tokio::io::copy(body, &mut file).await?;
        file.flush().await?;
        Ok(written)
    }

    async fn list_segment(
        &self,
        directory: &str,
        page_size: usize,
        token: Option<&ContinuationToken>,
    ) -> Result<ListSegment> {
        let mut read_dir = match fs::read_dir(self.directory_path(directory)?).await {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::DirectoryNotFound(directory.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let prefix = display_directory(directory);
        let mut entries = Vec::new();
        while let Some(dir_entry) = read_dir.next_entry().await? {
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            let full_name = join(&prefix, &name);
            if token.is_some_and(|token| full_name.as_str() <= token.as_str()) {
                continue;
            }

            let meta = dir_entry.metadata().await?;
            let mut entry = if meta.is_dir() {
                StorageEntry::directory(full_name)
            } else {
                StorageEntry::file(full_name).with_size(meta.len())
            };
            if let Ok(modified) = meta.modified() {
                entry = entry.with_last_modified(DateTime::<Utc>::from(modified));
            }
            entries.push(entry);
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_reject_escapes() {
        assert_eq!(segments("a/b\\c").unwrap(), ["a", "b", "c"]);
        assert!(segments("").unwrap().is_empty());
        assert!(matches!(segments("../etc"), Err(StorageError::InvalidName(_))));
        assert!(matches!(segments("a/./b"), Err(StorageError::InvalidName(_))));
    }

    #[tokio::test]
    async fn test_open_creates_share() {
        let dir = tempfile::tempdir().unwrap();
        let share = LocalShare::open(dir.path(), "documents").await.unwrap();
        assert_eq!(share.root(), dir.path().join("documents"));
        assert!(share.root().is_dir());
        assert!(share.directory_exists("").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_directory_requires_parent() {
        let dir = tempfile::tempdir().unwrap();
        let share = LocalShare::new(dir.path());
        share.create_directory("a").await.unwrap();
        share.create_directory("a").await.unwrap();
        assert!(matches!(
            share.create_directory("x/y").await,
            Err(StorageError::DirectoryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_segments_paginate_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let share = LocalShare::new(dir.path());
        share.create_directory("d").await.unwrap();
        for name in ["3.txt", "1.txt", "2.txt"] {
            let mut body: &[u8] = b"abc";
            share.create_file("d", name, &mut body).await.unwrap();
        }

        let first = share.list_segment("d", 2, None).await.unwrap();
        let names: Vec<_> = first.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["d/1.txt", "d/2.txt"]);
        assert_eq!(first.entries[0].size, Some(3));

        let second = share
            .list_segment("d", 2, first.continuation_token.as_ref())
            .await
            .unwrap();
        let names: Vec<_> = second.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["d/3.txt"]);
        assert!(second.continuation_token.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let share = LocalShare::new(dir.path());
        assert!(matches!(
            share.delete_file("", "a.txt").await,
            Err(StorageError::FileNotFound(_))
        ));
        assert!(matches!(
            share.open_read("", "a.txt").await.err().unwrap(),
            StorageError::FileNotFound(_)
        ));
        let mut body: &[u8] = b"x";
        assert!(matches!(
            share.create_file("nope", "a.txt", &mut body).await,
            Err(StorageError::DirectoryNotFound(_))
        ));
        assert!(matches!(
            share.list_segment("nope", 10, None).await,
            Err(StorageError::DirectoryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let share = LocalShare::new(dir.path());
        share.create_directory("docs").await.unwrap();

        assert!(!share.file_exists("", "docs").await.unwrap());
        assert!(matches!(
            share.open_read("", "docs").await.err().unwrap(),
            StorageError::FileNotFound(_)
        ));
        let mut body: &[u8] = b"x";
        assert!(matches!(
            share.create_file("", "docs", &mut body).await,
            Err(StorageError::InvalidName(_))
        ));
        assert!(dir.path().join("docs").is_dir());
    }
}
