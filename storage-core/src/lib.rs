//! Storage facades over a blob container and a hierarchical file share.
//!
//! Both facades hide a remote client behind a trait so the backend can be an
//! object store, a local directory or an in-memory double in tests.

pub mod blob;
pub mod error;
pub mod hashing;
pub mod listing;
pub mod metrics;
pub mod path;
pub mod settings;
pub mod share;

use bytes::Bytes;
use futures::stream::BoxStream;

pub use blob::{BlobContainerClient, BlobHandle, BlobRef, BlobStore, ObjectStoreContainer};
pub use error::{Result, StorageError};
pub use listing::{list_all, paginate, ContinuationToken, ListSegment, ListingQuery, StorageEntry};
pub use metrics::{MetricsCollector, NoOpMetrics, SharedMetrics};
pub use path::{parse, ParsedPath};
pub use settings::{BlobStorageSettings, FileStorageSettings, StorageSettings};
pub use share::{FileShareStore, LocalShare, ShareClient, ShareFileRef, UploadedFile};

/// Chunked content of a blob or share file.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Entries requested per listing segment unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 5000;
