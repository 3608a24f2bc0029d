use rand::RngCore;
use std::path::Path;

use crate::LogicalName;

/// Random bytes behind every generated name (128 bits)
pub const TOKEN_BYTES: usize = 16;

/// Strategy for generating logical names
pub trait NameGenerator: Send + Sync {
    /// Generate a storage key for a file uploaded as `original_filename`
    fn generate(&self, original_filename: &str) -> LogicalName;
}

/// Default strategy: 32 hex chars of CSPRNG output plus the lowercased extension
#[derive(Debug, Clone, Default)]
pub struct RandomHexNames;

impl NameGenerator for RandomHexNames {
    fn generate(&self, original_filename: &str) -> LogicalName {
        let mut token = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut token);

        let name = match extension_of(original_filename) {
            Some(ext) => format!("{}.{}", hex::encode(token), ext),
            None => hex::encode(token),
        };

        // hex digits plus an alphanumeric extension always form a valid name
        LogicalName::from_generated(name)
    }
}

/// Generate a name with the default strategy
pub fn generate(original_filename: &str) -> LogicalName {
    RandomHexNames.generate(original_filename)
}

/// Lowercased extension of the last path component.
///
/// Dotfiles have no extension; extensions that are not plain ASCII
/// alphanumerics are dropped so they never end up in storage keys.
pub fn extension_of(original_filename: &str) -> Option<String> {
    let ext = Path::new(original_filename).extension()?.to_str()?;
    if ext.is_empty() || ext.len() > 16 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_name_shape() {
        let name = generate("Holiday.PNG");
        let (token, ext) = name.as_str().split_once('.').unwrap();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(ext, "png");
    }

    #[test]
    fn test_no_extension() {
        assert_eq!(generate("README").as_str().len(), TOKEN_BYTES * 2);
        assert_eq!(generate(".profile").as_str().len(), TOKEN_BYTES * 2);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("clip.MP4").as_deref(), Some("mp4"));
        assert_eq!(extension_of("uploads/archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(extension_of("weird.p n g"), None);
        assert_eq!(extension_of("noext"), None);
    }

    #[test]
    fn test_names_are_unique() {
        let names: HashSet<String> = (0..10_000)
            .map(|_| generate("photo.jpg").as_str().to_string())
            .collect();
        assert_eq!(names.len(), 10_000);
    }
}
