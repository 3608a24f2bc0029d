//! # dog-gridfs: Chunked media storage for DogRS applications
//!
//! `dog-gridfs` stores uploaded media (profile pictures, videos) as ordered,
//! fixed-size chunks in a database and streams them back lazily. A file only
//! becomes visible under its name once its write has committed, so a reference
//! saved after an upload can never point at half a file.
//!
//! ## Key Features
//!
//! - **Commit-or-nothing writes**: chunks are keyed by a per-write id; the name is published last
//! - **Streaming both ways**: at most one partial chunk is buffered on upload, reads are lazy with bounded read-ahead
//! - **Namespaces**: one store, many buckets (`images`, `videos`, or your own)
//! - **Pluggable backends**: SQLite through sqlx for production, in-memory for tests
//!
//! ## Quick Start
//!
//! ```rust
//! use dog_gridfs::prelude::*;
//! use dog_gridfs::media::{VideoMetadata, VideoRecord};
//!
//! # #[tokio::main]
//! # async fn main() -> GridResult<()> {
//! // 1. Connect (SQLite, in memory by default) and share the handle
//! let stores = StoreCell::from_store(GridStore::connect(GridConfig::default()).await?);
//!
//! // 2. Upload; the callback only runs after the file is committed
//! let uploader = Uploader::new(stores.clone());
//! let metadata = VideoMetadata::new("First clip");
//! let request = UploadRequest::new(Namespace::videos(), "clip.mp4", Payload::buffered(&b"..."[..]))
//!     .with_check(metadata.clone());
//!
//! let receipt = uploader
//!     .upload(request, |file| async move {
//!         Ok(VideoRecord::from_upload("user-123", metadata, &file))
//!     })
//!     .await?;
//!
//! // 3. Stream it back
//! let downloader = Downloader::new(stores);
//! let download = downloader.serve(Namespace::videos(), &receipt.file.logical_name).await?;
//! assert_eq!(download.content_type, "video/mp4");
//!
//! let mut body = Vec::new();
//! download.write_to(&mut body).await?;
//! assert_eq!(body, b"...");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │   Your Service           │  ← owns references (user profile, video record)
//! ├────────────┬─────────────┤
//! │  Uploader  │ Downloader  │  ← validation, streaming, commit, read-ahead
//! ├────────────┴─────────────┤
//! │  StoreCell → GridStore   │  ← readiness + per-namespace ChunkStore
//! ├──────────────────────────┤
//! │  ChunkBackend            │  ← SQLite or memory
//! └──────────────────────────┘
//! ```

pub mod backend;
pub mod backends;
mod config;
mod download;
mod error;
pub mod media;
pub mod mime;
pub mod names;
pub mod store;
mod types;
mod upload;

// Re-export main types for clean API
pub use backend::ChunkBackend;
pub use backends::{MemoryBackend, SqliteBackend};
pub use config::{GridConfig, MAX_CHUNK_SIZE};
pub use download::{Download, Downloader};
pub use error::{GridError, GridResult};
pub use names::{NameGenerator, RandomHexNames};
pub use store::{ChunkStore, GridStore, ReadHandle, StoreCell, WriteHandle};
pub use types::{ByteStream, ChunkStream, FileId, LogicalName, Namespace, Payload, StoredFile};
pub use upload::{UploadCheck, UploadReceipt, UploadRequest, Uploader};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ChunkStore, Download, Downloader, GridConfig, GridError, GridResult, GridStore,
        LogicalName, Namespace, Payload, StoreCell, StoredFile, UploadRequest, Uploader,
    };
}
