//! Storage provider trait definition.

use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use filestore_common::{Error, FileRecord, MetadataMap, MetadataTransport, Result};

/// Byte stream type for upload/read operations.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Wrap an in-memory buffer as a single-chunk stream.
pub fn bytes_stream(data: Vec<u8>) -> ByteStream {
    Box::pin(stream::once(async move { Ok(data) }))
}

/// Drain a stream into one buffer.
///
/// Stops with [`Error::Cancelled`] as soon as `cancel` fires.
pub async fn collect_stream(mut stream: ByteStream, cancel: &CancellationToken) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            chunk = stream.next() => match chunk {
                Some(chunk) => data.extend_from_slice(&chunk?),
                None => return Ok(data),
            },
        }
    }
}

/// Fail with [`Error::Cancelled`] if `cancel` has fired.
pub fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// Storage provider trait for different backends.
///
/// A provider stores opaque content plus flat metadata under a
/// `(bucket, id)` pair. Every operation is async and takes a cancellation
/// token; a cancelled upload must leave the file either fully present or
/// absent.
///
/// Implementations translate backend-native failures into the shared
/// [`Error`] taxonomy and never retry on their own.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Get the provider name (e.g., "memory", "folder").
    fn name(&self) -> &str;

    /// How this provider transports metadata values.
    fn metadata_transport(&self) -> MetadataTransport {
        MetadataTransport::Native
    }

    /// Store a new file.
    ///
    /// # Postconditions
    /// - Content and metadata are both committed, or neither is
    /// - Returned record carries the size the provider stored
    ///
    /// # Errors
    /// - `InvalidArgument` if a file already exists at `(bucket, id)`
    /// - `Validation` if `content` is empty
    /// - `AccessDenied` / `Integration` on backend failures
    async fn upload(
        &self,
        bucket: &str,
        id: Uuid,
        metadata: MetadataMap,
        content: ByteStream,
        cancel: &CancellationToken,
    ) -> Result<FileRecord>;

    /// Look up a file's record.
    ///
    /// Returns `Ok(None)` if the file does not exist.
    async fn find(&self, bucket: &str, id: Uuid, cancel: &CancellationToken)
        -> Result<Option<FileRecord>>;

    /// Open a file's content.
    ///
    /// # Errors
    /// - `NotFound` if the file does not exist
    async fn read(&self, bucket: &str, id: Uuid, cancel: &CancellationToken) -> Result<ByteStream>;

    /// Remove a file.
    ///
    /// Returns `Ok(true)` if the file was removed and `Ok(false)` if it did
    /// not exist.
    async fn delete(&self, bucket: &str, id: Uuid, cancel: &CancellationToken) -> Result<bool>;

    /// Release backend resources.
    ///
    /// Called once by the registry on shutdown.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
