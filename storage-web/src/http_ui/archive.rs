use std::io::{Cursor, Write};

use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Name of a blob inside an archive of everything under `prefix`.
///
/// The prefix's directory part is dropped so that zipping `Images/` yields
/// `cat.png` rather than `Images/cat.png`.
pub fn archive_entry_name<'a>(key: &'a str, prefix: &str) -> &'a str {
    let prefix = prefix.trim_start_matches(['/', '\\']);
    let as_directory = format!("{}/", prefix.trim_end_matches('/'));
    let base = if !prefix.is_empty() && key.starts_with(&as_directory) {
        as_directory.as_str()
    } else {
        match prefix.rfind('/') {
            Some(idx) => &prefix[..=idx],
            None => "",
        }
    };

    match key.strip_prefix(base) {
        Some(rest) if !rest.is_empty() => rest,
        _ => key,
    }
}

/// File name offered for the archive download.
pub fn archive_file_name(prefix: &str) -> String {
    let name = prefix
        .trim_matches(['/', '\\'])
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("blobs");
    format!("{name}.zip")
}

/// Uncompressed bytes a single archive download may hold by default.
pub const DEFAULT_MAX_ARCHIVE_BYTES: u64 = 1024 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive would exceed {limit} bytes")]
    TooLarge { limit: u64 },

    #[error(transparent)]
    Zip(#[from] ZipError),
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        Self::Zip(err.into())
    }
}

/// Deflate compressed archive written entry by entry as content streams in.
///
/// The uncompressed total is capped; only the compressed output is kept.
pub struct ArchiveBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    written: u64,
    limit: u64,
    entries: usize,
}

impl ArchiveBuilder {
    pub fn new(limit: u64) -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
            written: 0,
            limit,
            entries: 0,
        }
    }

    pub fn start_entry(&mut self, name: &str) -> Result<(), ArchiveError> {
        self.writer.start_file(name, self.options)?;
        self.entries += 1;
        Ok(())
    }

    /// Appends to the entry started last.
    pub fn write(&mut self, chunk: &[u8]) -> Result<(), ArchiveError> {
        self.written += chunk.len() as u64;
        if self.written > self.limit {
            return Err(ArchiveError::TooLarge { limit: self.limit });
        }
        self.writer.write_all(chunk)?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn finish(self) -> Result<Vec<u8>, ArchiveError> {
        Ok(self.writer.finish()?.into_inner())
    }
}
