//! Common types used throughout filestore.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Flat string-keyed metadata as stored by providers.
pub type MetadataMap = HashMap<String, String>;

/// One stored file as seen by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Caller-assigned file identifier.
    pub id: Uuid,
    /// Content size in bytes, as confirmed by the provider.
    pub size: u64,
    /// Flat metadata.
    pub metadata: MetadataMap,
}

impl FileRecord {
    /// Create a new record.
    pub fn new(id: Uuid, size: u64, metadata: MetadataMap) -> Self {
        Self { id, size, metadata }
    }
}

/// How a provider transports metadata values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataTransport {
    /// Values are stored as arbitrary strings (JSON documents, BSON, memory).
    #[default]
    Native,
    /// Values travel as HTTP-header-like fields restricted to visible ASCII.
    Header,
}

/// Name of a bucket (collection) inside a provider.
///
/// Bucket names become path components or object-store bucket names, so
/// they must be non-empty and free of path separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketName(String);

impl BucketName {
    /// Create a new bucket name.
    ///
    /// # Errors
    /// - Name is empty or whitespace
    /// - Name contains '/' or '\\' or is a relative path marker
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(crate::Error::InvalidArgument(
                "Bucket name cannot be empty".to_string(),
            ));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(crate::Error::InvalidArgument(format!(
                "Bucket name cannot contain separators: {}",
                name
            )));
        }
        if name == "." || name == ".." {
            return Err(crate::Error::InvalidArgument(format!(
                "Invalid bucket name: {}",
                name
            )));
        }
        Ok(Self(name))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_name_creation() {
        let name = BucketName::new("temp-files").unwrap();
        assert_eq!(name.as_str(), "temp-files");
        assert_eq!(name.to_string(), "temp-files");
    }

    #[test]
    fn test_bucket_name_rejects_invalid() {
        assert!(BucketName::new("").is_err());
        assert!(BucketName::new("   ").is_err());
        assert!(BucketName::new("a/b").is_err());
        assert!(BucketName::new("a\\b").is_err());
        assert!(BucketName::new("..").is_err());
    }

    #[test]
    fn test_file_record_serialization() {
        let mut metadata = MetadataMap::new();
        metadata.insert("FileName".to_string(), "report.pdf".to_string());
        let record = FileRecord::new(Uuid::new_v4(), 42, metadata);

        let json = serde_json::to_string(&record).unwrap();
        let deserialized: FileRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized, record);
    }

    #[test]
    fn test_transport_default_is_native() {
        assert_eq!(MetadataTransport::default(), MetadataTransport::Native);
    }
}
