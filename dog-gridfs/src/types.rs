use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use uuid::Uuid;

use crate::{GridError, GridResult};

/// Stream of bytes handed to the upload pipeline (network reads, files, ...)
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Stream of stored chunks, in sequence order
pub type ChunkStream = Pin<Box<dyn Stream<Item = GridResult<Bytes>> + Send>>;

/// Independent bucket of files, e.g. profile images vs. videos
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace(String);

impl Namespace {
    pub const IMAGES: &'static str = "images";
    pub const VIDEOS: &'static str = "videos";

    /// Create a namespace; names are ASCII alphanumerics, `-` or `_`
    pub fn new<S: Into<String>>(name: S) -> GridResult<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name.len() <= 64
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(GridError::validation(format!("Invalid namespace: {:?}", name)));
        }
        Ok(Self(name))
    }

    pub fn images() -> Self {
        Self(Self::IMAGES.to_string())
    }

    pub fn videos() -> Self {
        Self(Self::VIDEOS.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage key of a file, unique within its namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalName(String);

impl LogicalName {
    /// Create from an existing string (e.g. a URL path segment)
    pub fn new<S: Into<String>>(name: S) -> GridResult<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name.len() <= 255
            && !name
                .chars()
                .any(|c| c == '/' || c == '\\' || c.is_control());
        if !valid {
            return Err(GridError::validation(format!("Invalid logical name: {:?}", name)));
        }
        Ok(Self(name))
    }

    pub(crate) fn from_generated(name: String) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extension after the last dot, without the dot ("" when there is none)
    pub fn extension(&self) -> &str {
        match self.0.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext,
            _ => "",
        }
    }
}

impl std::fmt::Display for LogicalName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque id tying chunks to their file record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub String);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata record of a committed file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: FileId,
    pub namespace: Namespace,
    pub logical_name: LogicalName,
    /// Lowercase extension without the dot, may be empty
    pub extension: String,
    pub length: u64,
    pub chunk_size: u32,
    pub chunk_count: u32,
    pub created_at: DateTime<Utc>,
}

impl StoredFile {
    /// Content type derived from the stored extension
    pub fn content_type(&self) -> &'static str {
        crate::mime::content_type_for(&self.extension)
    }

    /// Expected length of chunk `n`, or `None` past the end of the file
    pub fn expected_chunk_len(&self, n: u32) -> Option<u64> {
        if n >= self.chunk_count {
            return None;
        }
        let offset = n as u64 * self.chunk_size as u64;
        Some(self.length.saturating_sub(offset).min(self.chunk_size as u64))
    }
}

/// Payload handed over by the transport layer
pub enum Payload {
    /// Whole body already in memory
    Buffered(Bytes),
    /// Body arriving incrementally
    Stream(ByteStream),
}

impl Payload {
    pub fn buffered<B: Into<Bytes>>(bytes: B) -> Self {
        Self::Buffered(bytes.into())
    }

    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
    {
        Self::Stream(Box::pin(stream))
    }

    /// Size when known up front
    pub fn known_len(&self) -> Option<u64> {
        match self {
            Self::Buffered(bytes) => Some(bytes.len() as u64),
            Self::Stream(_) => None,
        }
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}
