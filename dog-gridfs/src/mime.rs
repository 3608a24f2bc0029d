/// Content type used when the extension is unknown
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const CONTENT_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("mov", "video/quicktime"),
    ("mkv", "video/x-matroska"),
];

/// Look up the content type for a file extension.
///
/// Accepts the extension with or without its leading dot, in any case.
pub fn content_type_for(extension: &str) -> &'static str {
    let ext = extension.trim_start_matches('.');
    CONTENT_TYPES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map(|(_, content_type)| *content_type)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_images() {
        assert_eq!(content_type_for(".png"), "image/png");
        assert_eq!(content_type_for("jpg"), "image/jpeg");
        assert_eq!(content_type_for(".JPEG"), "image/jpeg");
    }

    #[test]
    fn test_unknown_falls_back() {
        assert_eq!(content_type_for(".bin"), DEFAULT_CONTENT_TYPE);
        assert_eq!(content_type_for(""), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_videos() {
        assert_eq!(content_type_for("mp4"), "video/mp4");
        assert_eq!(content_type_for("mov"), "video/quicktime");
    }
}
