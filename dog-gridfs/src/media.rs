//! Media references built on top of committed files.
//!
//! The store never knows about these records; callers build them inside the
//! upload completion callback, once the file is committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{upload::UploadCheck, GridError, GridResult, LogicalName, StoredFile};

pub const TITLE_MAX_CHARS: usize = 30;
pub const DESCRIPTION_MAX_CHARS: usize = 500;

/// Caller-supplied fields accompanying a video upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl VideoMetadata {
    pub fn new<S: Into<String>>(title: S) -> Self {
        Self {
            title: title.into(),
            description: None,
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl UploadCheck for VideoMetadata {
    fn check(&self) -> GridResult<()> {
        if self.title.trim().is_empty() {
            return Err(GridError::validation("Title is required"));
        }
        if self.title.chars().count() > TITLE_MAX_CHARS {
            return Err(GridError::validation(format!(
                "Title must be {} characters max",
                TITLE_MAX_CHARS
            )));
        }
        if let Some(description) = &self.description {
            if description.chars().count() > DESCRIPTION_MAX_CHARS {
                return Err(GridError::validation(format!(
                    "Description must be {} characters max",
                    DESCRIPTION_MAX_CHARS
                )));
            }
        }
        Ok(())
    }
}

/// Video entry persisted by the caller after a successful upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub user_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub video_url: String,
    pub filename: String,
    pub created_at: DateTime<Utc>,
}

impl VideoRecord {
    pub fn from_upload<S: Into<String>>(user_id: S, metadata: VideoMetadata, file: &StoredFile) -> Self {
        Self {
            user_id: user_id.into(),
            title: metadata.title,
            description: metadata.description,
            video_url: video_url(&file.logical_name),
            filename: file.logical_name.as_str().to_string(),
            created_at: file.created_at,
        }
    }
}

/// Public path of a stored video
pub fn video_url(name: &LogicalName) -> String {
    format!("/videos/{}", name)
}

/// Public path of a stored profile picture
pub fn profile_picture_url(name: &LogicalName) -> String {
    format!("/api/users/profilePicture/{}", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileId, Namespace};

    fn stored(name: &str) -> StoredFile {
        let logical_name = LogicalName::new(name).unwrap();
        StoredFile {
            id: FileId::new(),
            namespace: Namespace::videos(),
            extension: logical_name.extension().to_string(),
            logical_name,
            length: 42,
            chunk_size: 16,
            chunk_count: 3,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_title_limits() {
        assert!(VideoMetadata::new("a".repeat(30)).check().is_ok());
        assert!(VideoMetadata::new("a".repeat(31)).check().is_err());
        assert!(VideoMetadata::new("   ").check().is_err());
        // counted in characters, not bytes
        assert!(VideoMetadata::new("é".repeat(30)).check().is_ok());
    }

    #[test]
    fn test_description_limit() {
        let ok = VideoMetadata::new("clip").with_description("d".repeat(500));
        assert!(ok.check().is_ok());

        let too_long = VideoMetadata::new("clip").with_description("d".repeat(501));
        let err = too_long.check().unwrap_err();
        assert!(matches!(err, GridError::ValidationFailed { .. }));
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_video_record_from_upload() {
        let file = stored("0123abcd.mp4");
        let meta = VideoMetadata::new("My clip").with_description("first upload");
        let record = VideoRecord::from_upload("user-1", meta, &file);

        assert_eq!(record.video_url, "/videos/0123abcd.mp4");
        assert_eq!(record.filename, "0123abcd.mp4");
        assert_eq!(record.created_at, file.created_at);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["videoUrl"], "/videos/0123abcd.mp4");
        assert_eq!(json["userId"], "user-1");
    }

    #[test]
    fn test_profile_picture_url() {
        let name = LogicalName::new("ff00.png").unwrap();
        assert_eq!(profile_picture_url(&name), "/api/users/profilePicture/ff00.png");
    }
}
