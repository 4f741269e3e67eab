use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use storage_core::{BlobStorageSettings, FileStorageSettings, StorageSettings};

/// Storage options shared by every subcommand.
#[derive(Parser, Debug, Clone, Default)]
pub struct StorageArgs {
    #[arg(long, help = "TOML settings file with [blob] and [file] sections")]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        help = "Blob store url (s3://, az://, file://, memory://) or a local directory"
    )]
    pub blob_url: Option<String>,

    #[arg(long, default_value = "images")]
    pub container: String,

    #[arg(long, help = "Local directory holding file shares")]
    pub file_root: Option<PathBuf>,

    #[arg(long, default_value = "documents")]
    pub share: String,

    #[arg(long, help = "Entries requested per listing page")]
    pub page_size: Option<usize>,
}

impl StorageArgs {
    /// Settings from the file, with sections the file lacks filled from flags.
    pub fn settings(&self) -> Result<StorageSettings> {
        let mut settings = match &self.config {
            Some(path) => load_settings(path)?,
            None => StorageSettings::default(),
        };

        if settings.blob.is_none() {
            if let Some(url) = &self.blob_url {
                settings.blob = Some(BlobStorageSettings {
                    url: blob_url(url)?,
                    container: self.container.clone(),
                });
            }
        }

        if settings.file.is_none() {
            if let Some(root) = &self.file_root {
                settings.file = Some(FileStorageSettings {
                    root: root.clone(),
                    share: self.share.clone(),
                });
            }
        }

        if let Some(page_size) = self.page_size {
            settings.page_size = page_size;
        }

        Ok(settings)
    }
}

pub fn load_settings(path: &Path) -> Result<StorageSettings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    let settings: StorageSettings = toml::from_str(&content)
        .with_context(|| format!("failed to parse settings file {}", path.display()))?;
    info!(path = %path.display(), "loaded storage settings");
    Ok(settings)
}

/// Turns a bare directory into a `file://` url, creating the directory.
fn blob_url(raw: &str) -> Result<String> {
    if raw.contains("://") {
        return Ok(raw.to_string());
    }

    std::fs::create_dir_all(raw).with_context(|| format!("failed to create {raw}"))?;
    let path = Path::new(raw)
        .canonicalize()
        .with_context(|| format!("failed to resolve {raw}"))?;
    Ok(format!("file://{}", path.display()))
}
