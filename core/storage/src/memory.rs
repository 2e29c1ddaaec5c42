//! In-memory storage provider for testing.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use filestore_common::{BucketName, Error, FileRecord, MetadataMap, MetadataTransport, Result};

use crate::provider::{bytes_stream, check_cancelled, collect_stream, ByteStream, StorageProvider};
use crate::registry::ProviderConstructor;
use crate::services::Services;

/// Options for [`MemoryProvider`].
///
/// Limits of `0` mean unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryOptions {
    /// Maximum number of files a single bucket may hold.
    pub max_files_per_bucket: usize,
    /// Maximum content size in bytes.
    pub max_file_size: u64,
    /// Behave like a backend that carries metadata in HTTP-style headers.
    ///
    /// The provider then reports [`MetadataTransport::Header`] and rejects
    /// metadata values that are not printable ASCII.
    pub header_metadata: bool,
}

/// Number of calls made to each provider operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub upload: usize,
    pub find: usize,
    pub read: usize,
    pub delete: usize,
}

impl CallCounts {
    /// Sum of all calls.
    pub fn total(&self) -> usize {
        self.upload + self.find + self.read + self.delete
    }
}

#[derive(Default)]
struct Counters {
    upload: AtomicUsize,
    find: AtomicUsize,
    read: AtomicUsize,
    delete: AtomicUsize,
}

/// In-memory storage entry.
#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    metadata: MetadataMap,
}

impl Entry {
    fn record(&self, id: Uuid) -> FileRecord {
        FileRecord::new(id, self.data.len() as u64, self.metadata.clone())
    }
}

/// In-memory storage provider.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop. Every operation is counted so tests can assert that a
/// call never reached the provider.
#[derive(Default)]
pub struct MemoryProvider {
    options: MemoryOptions,
    buckets: RwLock<HashMap<String, HashMap<Uuid, Entry>>>,
    counters: Counters,
}

impl MemoryProvider {
    /// Create a new empty memory provider without limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory provider with the given options.
    pub fn with_options(options: MemoryOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Options this provider was built with.
    pub fn options(&self) -> &MemoryOptions {
        &self.options
    }

    /// Calls made so far, per operation.
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            upload: self.counters.upload.load(Ordering::SeqCst),
            find: self.counters.find.load(Ordering::SeqCst),
            read: self.counters.read.load(Ordering::SeqCst),
            delete: self.counters.delete.load(Ordering::SeqCst),
        }
    }

    /// Number of buckets that have received at least one file.
    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }

    /// Number of files currently stored in `bucket`.
    pub fn file_count(&self, bucket: &str) -> usize {
        self.buckets.read().get(bucket).map_or(0, HashMap::len)
    }

    fn check_metadata(&self, metadata: &MetadataMap) -> Result<()> {
        if !self.options.header_metadata {
            return Ok(());
        }
        for (key, value) in metadata {
            if !value.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
                return Err(Error::Validation(format!(
                    "Metadata value for '{}' is not valid in a header",
                    key
                )));
            }
        }
        Ok(())
    }

    fn check_size(&self, size: u64) -> Result<()> {
        if size == 0 {
            return Err(Error::Validation("File content is empty".to_string()));
        }
        if self.options.max_file_size > 0 && size > self.options.max_file_size {
            return Err(Error::Validation(format!(
                "File size {} exceeds the limit of {} bytes",
                size, self.options.max_file_size
            )));
        }
        Ok(())
    }
}

impl ProviderConstructor for MemoryProvider {
    const KIND: &'static str = "memory";
    type Options = MemoryOptions;

    fn construct(options: MemoryOptions, _services: &Services) -> Result<Self> {
        Ok(Self::with_options(options))
    }
}

#[async_trait]
impl StorageProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn metadata_transport(&self) -> MetadataTransport {
        if self.options.header_metadata {
            MetadataTransport::Header
        } else {
            MetadataTransport::Native
        }
    }

    async fn upload(
        &self,
        bucket: &str,
        id: Uuid,
        metadata: MetadataMap,
        content: ByteStream,
        cancel: &CancellationToken,
    ) -> Result<FileRecord> {
        self.counters.upload.fetch_add(1, Ordering::SeqCst);
        debug!(bucket = %bucket, id = %id, "Uploading file to memory");

        let bucket = BucketName::new(bucket)?;
        self.check_metadata(&metadata)?;

        let data = collect_stream(content, cancel).await?;
        self.check_size(data.len() as u64)?;
        check_cancelled(cancel)?;

        let mut buckets = self.buckets.write();
        let files = buckets.entry(bucket.as_str().to_string()).or_default();
        if files.contains_key(&id) {
            return Err(Error::InvalidArgument(format!(
                "File {} already exists in bucket '{}'",
                id, bucket
            )));
        }
        let limit = self.options.max_files_per_bucket;
        if limit > 0 && files.len() >= limit {
            return Err(Error::Validation(format!(
                "Bucket '{}' is full ({} files)",
                bucket, limit
            )));
        }

        let entry = Entry { data, metadata };
        let record = entry.record(id);
        files.insert(id, entry);

        info!(bucket = %bucket, id = %id, size = record.size, "Stored file in memory");
        Ok(record)
    }

    async fn find(
        &self,
        bucket: &str,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<FileRecord>> {
        self.counters.find.fetch_add(1, Ordering::SeqCst);
        check_cancelled(cancel)?;

        let buckets = self.buckets.read();
        Ok(buckets
            .get(bucket)
            .and_then(|files| files.get(&id))
            .map(|entry| entry.record(id)))
    }

    async fn read(&self, bucket: &str, id: Uuid, cancel: &CancellationToken) -> Result<ByteStream> {
        self.counters.read.fetch_add(1, Ordering::SeqCst);
        check_cancelled(cancel)?;

        let data = self
            .buckets
            .read()
            .get(bucket)
            .and_then(|files| files.get(&id))
            .map(|entry| entry.data.clone())
            .ok_or_else(|| {
                Error::NotFound(format!("File {} not found in bucket '{}'", id, bucket))
            })?;

        Ok(bytes_stream(data))
    }

    async fn delete(&self, bucket: &str, id: Uuid, cancel: &CancellationToken) -> Result<bool> {
        self.counters.delete.fetch_add(1, Ordering::SeqCst);
        check_cancelled(cancel)?;

        let removed = self
            .buckets
            .write()
            .get_mut(bucket)
            .and_then(|files| files.remove(&id))
            .is_some();

        if removed {
            info!(bucket = %bucket, id = %id, "Deleted file from memory");
        }
        Ok(removed)
    }
}
