//! Typed file collections.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use filestore_common::{Error, Result};
use filestore_metadata::{FileMetadata, MetadataCodec};
use filestore_storage::{ByteStream, StorageProvider};

/// A stored file with typed metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct File<T> {
    pub id: Uuid,
    pub size: u64,
    pub metadata: T,
}

/// Files of one metadata type in one provider bucket.
///
/// Converts typed metadata to and from the provider's flat map and
/// delegates storage to the shared provider.
pub struct FileCollection<T> {
    name: String,
    provider: Arc<dyn StorageProvider>,
    codec: MetadataCodec<T>,
}

impl<T: FileMetadata> FileCollection<T> {
    /// Create a collection over `provider`'s bucket `name`.
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn StorageProvider>,
        codec: MetadataCodec<T>,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            codec,
        }
    }

    /// Physical bucket name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Codec used for this collection's metadata.
    pub fn codec(&self) -> &MetadataCodec<T> {
        &self.codec
    }

    /// Upload a new file.
    ///
    /// # Errors
    /// - `InvalidArgument` if `id` is nil or already used in this collection
    /// - `RequiredField` if a required metadata field is empty; the provider
    ///   is not called
    /// - `Validation` if the provider rejects the content
    pub async fn upload(&self, id: Uuid, metadata: T, content: ByteStream) -> Result<File<T>> {
        self.upload_with_cancel(id, metadata, content, &CancellationToken::new())
            .await
    }

    /// [`upload`](Self::upload) with a cancellation token.
    pub async fn upload_with_cancel(
        &self,
        id: Uuid,
        metadata: T,
        content: ByteStream,
        cancel: &CancellationToken,
    ) -> Result<File<T>> {
        if id.is_nil() {
            return Err(Error::InvalidArgument("File id must not be nil".to_string()));
        }
        let flat = self.codec.serialize(&metadata)?;
        debug!(collection = %self.name, id = %id, keys = flat.len(), "Uploading file");

        let record = self.provider.upload(&self.name, id, flat, content, cancel).await?;
        Ok(File {
            id: record.id,
            size: record.size,
            metadata,
        })
    }

    /// Find a file by id.
    ///
    /// Returns `Ok(None)` if the file does not exist.
    ///
    /// # Errors
    /// - `Integration` if stored metadata cannot be decoded
    pub async fn find(&self, id: Uuid) -> Result<Option<File<T>>> {
        self.find_with_cancel(id, &CancellationToken::new()).await
    }

    /// [`find`](Self::find) with a cancellation token.
    pub async fn find_with_cancel(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<File<T>>> {
        debug!(collection = %self.name, id = %id, "Finding file");
        let Some(record) = self.provider.find(&self.name, id, cancel).await? else {
            return Ok(None);
        };

        let metadata = self.codec.deserialize(&record.metadata)?;
        Ok(Some(File {
            id: record.id,
            size: record.size,
            metadata,
        }))
    }

    /// Open a file's content.
    ///
    /// # Errors
    /// - `NotFound` if the file does not exist
    pub async fn read(&self, id: Uuid) -> Result<ByteStream> {
        self.read_with_cancel(id, &CancellationToken::new()).await
    }

    /// [`read`](Self::read) with a cancellation token.
    pub async fn read_with_cancel(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<ByteStream> {
        debug!(collection = %self.name, id = %id, "Reading file");
        self.provider.read(&self.name, id, cancel).await
    }

    /// Delete a file.
    ///
    /// Returns `Ok(false)` if the file did not exist.
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        self.delete_with_cancel(id, &CancellationToken::new()).await
    }

    /// [`delete`](Self::delete) with a cancellation token.
    pub async fn delete_with_cancel(&self, id: Uuid, cancel: &CancellationToken) -> Result<bool> {
        debug!(collection = %self.name, id = %id, "Deleting file");
        self.provider.delete(&self.name, id, cancel).await
    }
}

impl<T> fmt::Debug for FileCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCollection")
            .field("name", &self.name)
            .field("provider", &self.provider.name())
            .finish()
    }
}
