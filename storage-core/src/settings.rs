use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::blob::{BlobStore, ObjectStoreContainer};
use crate::error::{Result, StorageError};
use crate::metrics::SharedMetrics;
use crate::share::{FileShareStore, LocalShare};
use crate::DEFAULT_PAGE_SIZE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobStorageSettings {
    /// Object store url, e.g. `s3://bucket`, `az://account` or `file:///data`.
    pub url: String,
    pub container: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStorageSettings {
    pub root: PathBuf,
    pub share: String,
}

/// Storage section of the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub blob: Option<BlobStorageSettings>,
    #[serde(default)]
    pub file: Option<FileStorageSettings>,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            blob: None,
            file: None,
        }
    }
}

impl StorageSettings {
    pub fn blob_store(&self, metrics: SharedMetrics) -> Result<BlobStore> {
        let settings = self
            .blob
            .as_ref()
            .ok_or_else(|| StorageError::Configuration("no blob storage configured".into()))?;
        if settings.container.trim().is_empty() {
            return Err(StorageError::Configuration("blob container name is empty".into()));
        }

        let container = ObjectStoreContainer::from_url(&settings.url, &settings.container)?;
        info!(url = %settings.url, container = %settings.container, "blob storage ready");
        Ok(BlobStore::new(Arc::new(container))
            .with_page_size(self.page_size)
            .with_metrics(metrics))
    }

    pub async fn file_share(&self, metrics: SharedMetrics) -> Result<FileShareStore> {
        let settings = self
            .file
            .as_ref()
            .ok_or_else(|| StorageError::Configuration("no file share configured".into()))?;
        if settings.share.trim().is_empty() {
            return Err(StorageError::Configuration("file share name is empty".into()));
        }

        let share = LocalShare::open(&settings.root, &settings.share).await?;
        info!(root = %share.root().display(), "file share ready");
        Ok(FileShareStore::new(Arc::new(share))
            .with_page_size(self.page_size)
            .with_metrics(metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = StorageSettings::default();
        assert_eq!(settings.page_size, 5000);
        assert!(settings.blob.is_none());
        assert!(settings.file.is_none());
    }

    #[test]
    fn test_missing_sections_are_configuration_errors() {
        let settings = StorageSettings::default();
        assert!(matches!(
            settings.blob_store(SharedMetrics::default()),
            Err(StorageError::Configuration(_))
        ));
    }

    #[test]
    fn test_blob_store_from_memory_url() {
        let settings = StorageSettings {
            page_size: 10,
            blob: Some(BlobStorageSettings {
                url: "memory:///".to_string(),
                container: "images".to_string(),
            }),
            file: None,
        };
        let store = settings.blob_store(SharedMetrics::default()).unwrap();
        assert_eq!(store.page_size(), 10);
    }

    #[test]
    fn test_invalid_url() {
        let settings = StorageSettings {
            blob: Some(BlobStorageSettings {
                url: "not a url".to_string(),
                container: "images".to_string(),
            }),
            ..Default::default()
        };
        assert!(matches!(
            settings.blob_store(SharedMetrics::default()),
            Err(StorageError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_file_share_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let settings = StorageSettings {
            file: Some(FileStorageSettings {
                root: dir.path().to_path_buf(),
                share: "documents".to_string(),
            }),
            ..Default::default()
        };
        settings.file_share(SharedMetrics::default()).await.unwrap();
        assert!(dir.path().join("documents").is_dir());
    }
}
