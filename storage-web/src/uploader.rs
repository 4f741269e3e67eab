//! Bulk upload of a local directory into the blob container.
//!
//! Every blob gets an `id` and a `roles` metadata entry so that consumers can
//! filter on them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use storage_core::path::join;
use storage_core::BlobStore;

#[derive(Parser, Debug, Clone)]
pub struct UploadConfig {
    /// Directory whose files are uploaded (not recursive)
    pub source: PathBuf,

    #[arg(long, help = "Blob name prefix, e.g. Images")]
    pub prefix: Option<String>,

    #[arg(long, value_delimiter = ',', default_value = "admin,member,non-member")]
    pub roles: Vec<String>,

    #[arg(long, default_value = "admin", help = "Role every blob receives")]
    pub mandatory_role: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct UploadReport {
    pub uploaded: Vec<String>,
    pub skipped: Vec<String>,
}

/// Metadata attached to every uploaded blob.
pub fn upload_metadata<R: Rng>(
    rng: &mut R,
    roles: &[String],
    mandatory_role: Option<&str>,
) -> Result<HashMap<String, String>> {
    let mut assigned: Vec<&str> = Vec::new();
    if let Some(role) = mandatory_role.filter(|r| !r.trim().is_empty()) {
        assigned.push(role);
    }
    if !roles.is_empty() {
        let amount = rng.gen_range(1..=roles.len());
        for role in roles.choose_multiple(rng, amount) {
            if !assigned.contains(&role.as_str()) {
                assigned.push(role);
            }
        }
    }

    Ok(HashMap::from([
        ("id".to_string(), Uuid::new_v4().to_string()),
        ("roles".to_string(), serde_json::to_string(&assigned)?),
    ]))
}

/// Uploads every file directly inside `config.source`. Names that already
/// exist in the container are skipped.
pub async fn upload_directory(store: &BlobStore, config: &UploadConfig) -> Result<UploadReport> {
    let files = files_in(&config.source).await?;
    let mut report = UploadReport::default();
    let mut rng = StdRng::from_entropy();

    for path in files {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!(path = %path.display(), "skipping file with a non utf-8 name");
            continue;
        };
        let name = join(config.prefix.as_deref().unwrap_or(""), file_name);

        if store.exists(&name).await? {
            info!(%name, "skipping, blob already exists");
            report.skipped.push(name);
            continue;
        }

        let metadata = upload_metadata(&mut rng, &config.roles, config.mandatory_role.as_deref())?;
        let mut file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        let handle = store.upload(&name, &mut file, Some(&metadata)).await?;
        info!(name = %handle.name, size = handle.size, "uploaded");
        report.uploaded.push(handle.name);
    }

    Ok(report)
}

async fn files_in(directory: &Path) -> Result<Vec<PathBuf>> {
    let mut read_dir = tokio::fs::read_dir(directory)
        .await
        .with_context(|| format!("failed to read {}", directory.display()))?;
    let mut files = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
