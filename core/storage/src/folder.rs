//! Local folder storage provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use filestore_common::{BucketName, Error, FileRecord, MetadataMap, Result};

use crate::provider::{bytes_stream, check_cancelled, collect_stream, ByteStream, StorageProvider};
use crate::registry::ProviderConstructor;
use crate::services::Services;

/// Options for [`FolderProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderOptions {
    /// Root directory for file content.
    pub content_path: PathBuf,
    /// Root directory for metadata sidecars.
    pub metadata_path: PathBuf,
}

impl FolderOptions {
    /// Keep content and metadata under `content/` and `metadata/` of `root`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            content_path: root.join("content"),
            metadata_path: root.join("metadata"),
        }
    }
}

/// Metadata sidecar stored next to every file.
#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    size: u64,
    metadata: MetadataMap,
}

/// Local filesystem storage provider.
///
/// Content lives at `<content_path>/<bucket>/<id>` and metadata in a JSON
/// sidecar at `<metadata_path>/<bucket>/<id>.json`. The sidecar is the
/// commit point: a file exists once its sidecar does.
pub struct FolderProvider {
    content_root: PathBuf,
    metadata_root: PathBuf,
}

impl FolderProvider {
    /// Create a new folder provider.
    ///
    /// # Postconditions
    /// - Both root directories exist
    ///
    /// # Errors
    /// - `InvalidArgument` if either path is empty
    /// - `AccessDenied` / `Integration` if the directories cannot be created
    pub fn new(options: FolderOptions) -> Result<Self> {
        for (label, path) in [
            ("content_path", &options.content_path),
            ("metadata_path", &options.metadata_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(Error::InvalidArgument(format!("Folder provider requires '{}'", label)));
            }
            // Sync for constructor
            std::fs::create_dir_all(path)
                .map_err(|e| Error::from_io(e, format!("Failed to create {}", path.display())))?;
        }

        Ok(Self {
            content_root: options.content_path,
            metadata_root: options.metadata_path,
        })
    }

    fn content_path(&self, bucket: &BucketName, id: Uuid) -> PathBuf {
        self.content_root.join(bucket.as_str()).join(id.to_string())
    }

    fn sidecar_path(&self, bucket: &BucketName, id: Uuid) -> PathBuf {
        self.metadata_root
            .join(bucket.as_str())
            .join(format!("{}.json", id))
    }

    async fn load_sidecar(&self, bucket: &BucketName, id: Uuid) -> Result<Option<Sidecar>> {
        let path = self.sidecar_path(bucket, id);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::from_io(e, format!("Failed to read {}", path.display()))),
        };
        let sidecar = serde_json::from_slice(&raw).map_err(|e| {
            Error::integration_with(format!("Malformed metadata sidecar {}", path.display()), e)
        })?;
        Ok(Some(sidecar))
    }
}

/// Best-effort removal used when unwinding a failed upload.
async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to clean up file");
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4()))
}

impl ProviderConstructor for FolderProvider {
    const KIND: &'static str = "folder";
    type Options = FolderOptions;

    fn construct(options: FolderOptions, _services: &Services) -> Result<Self> {
        Self::new(options)
    }
}

#[async_trait]
impl StorageProvider for FolderProvider {
    fn name(&self) -> &str {
        "folder"
    }

    async fn upload(
        &self,
        bucket: &str,
        id: Uuid,
        metadata: MetadataMap,
        content: ByteStream,
        cancel: &CancellationToken,
    ) -> Result<FileRecord> {
        debug!(bucket = %bucket, id = %id, "Uploading file to folder");
        let bucket = BucketName::new(bucket)?;
        let content_path = self.content_path(&bucket, id);
        let sidecar_path = self.sidecar_path(&bucket, id);

        // Content without a sidecar is left over from an interrupted upload
        // and gets overwritten.
        let exists = fs::try_exists(&sidecar_path).await.map_err(|e| {
            Error::from_io(e, format!("Failed to check {}", sidecar_path.display()))
        })?;
        if exists {
            return Err(Error::InvalidArgument(format!(
                "File {} already exists in bucket '{}'",
                id, bucket
            )));
        }

        let data = collect_stream(content, cancel).await?;
        if data.is_empty() {
            return Err(Error::Validation("File content is empty".to_string()));
        }

        let record = FileRecord::new(id, data.len() as u64, metadata);
        let sidecar = serde_json::to_vec_pretty(&Sidecar {
            size: record.size,
            metadata: record.metadata.clone(),
        })
        .map_err(|e| Error::integration_with("Failed to encode metadata sidecar", e))?;

        for dir in [content_path.parent(), sidecar_path.parent()].into_iter().flatten() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::from_io(e, format!("Failed to create {}", dir.display())))?;
        }

        let content_tmp = temp_path(&content_path);
        let sidecar_tmp = temp_path(&sidecar_path);
        let written = async {
            fs::write(&content_tmp, &data)
                .await
                .map_err(|e| Error::from_io(e, "Failed to write file content"))?;
            fs::write(&sidecar_tmp, &sidecar)
                .await
                .map_err(|e| Error::from_io(e, "Failed to write metadata sidecar"))?;
            check_cancelled(cancel)?;

            fs::rename(&content_tmp, &content_path)
                .await
                .map_err(|e| Error::from_io(e, "Failed to commit file content"))?;
            if let Err(e) = fs::rename(&sidecar_tmp, &sidecar_path).await {
                remove_quietly(&content_path).await;
                return Err(Error::from_io(e, "Failed to commit metadata sidecar"));
            }
            Ok::<(), Error>(())
        }
        .await;
        if let Err(e) = written {
            remove_quietly(&content_tmp).await;
            remove_quietly(&sidecar_tmp).await;
            return Err(e);
        }

        info!(bucket = %bucket, id = %id, size = record.size, "Stored file in folder");
        Ok(record)
    }

    async fn find(
        &self,
        bucket: &str,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<FileRecord>> {
        check_cancelled(cancel)?;
        let bucket = BucketName::new(bucket)?;

        let sidecar = self.load_sidecar(&bucket, id).await?;
        Ok(sidecar.map(|s| FileRecord::new(id, s.size, s.metadata)))
    }

    async fn read(&self, bucket: &str, id: Uuid, cancel: &CancellationToken) -> Result<ByteStream> {
        check_cancelled(cancel)?;
        let bucket = BucketName::new(bucket)?;

        let not_found = || Error::NotFound(format!("File {} not found in bucket '{}'", id, bucket));
        if self.load_sidecar(&bucket, id).await?.is_none() {
            return Err(not_found());
        }

        let path = self.content_path(&bucket, id);
        match fs::read(&path).await {
            Ok(data) => Ok(bytes_stream(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(Error::from_io(e, format!("Failed to read {}", path.display()))),
        }
    }

    async fn delete(&self, bucket: &str, id: Uuid, cancel: &CancellationToken) -> Result<bool> {
        check_cancelled(cancel)?;
        let bucket = BucketName::new(bucket)?;

        let sidecar_path = self.sidecar_path(&bucket, id);
        match fs::remove_file(&sidecar_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(Error::from_io(
                    e,
                    format!("Failed to delete {}", sidecar_path.display()),
                ))
            }
        }
        remove_quietly(&self.content_path(&bucket, id)).await;

        info!(bucket = %bucket, id = %id, "Deleted file from folder");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tempfile::TempDir;

    fn provider(temp: &TempDir) -> FolderProvider {
        FolderProvider::new(FolderOptions::under(temp.path())).unwrap()
    }

    async fn read_all(provider: &FolderProvider, bucket: &str, id: Uuid) -> Result<Vec<u8>> {
        let cancel = CancellationToken::new();
        let stream = provider.read(bucket, id, &cancel).await?;
        collect_stream(stream, &cancel).await
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_new_creates_directories() {
        let temp = TempDir::new().unwrap();
        let options = FolderOptions::under(temp.path().join("nested"));
        FolderProvider::new(options.clone()).unwrap();

        assert!(options.content_path.is_dir());
        assert!(options.metadata_path.is_dir());
    }

    #[test]
    fn test_new_rejects_empty_path() {
        let result = FolderProvider::new(FolderOptions {
            content_path: PathBuf::new(),
            metadata_path: PathBuf::from("meta"),
        });
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_folder_upload_find_read() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp);
        let cancel = CancellationToken::new();
        let id = Uuid::new_v4();
        let metadata: MetadataMap = [("Name".to_string(), "notes.txt".to_string())].into();

        let record = provider
            .upload("docs", id, metadata.clone(), bytes_stream(b"Hello, Folder!".to_vec()), &cancel)
            .await
            .unwrap();
        assert_eq!(record.size, 14);

        let found = provider.find("docs", id, &cancel).await.unwrap().unwrap();
        assert_eq!(found, FileRecord::new(id, 14, metadata));
        assert_eq!(read_all(&provider, "docs", id).await.unwrap(), b"Hello, Folder!");

        assert!(temp.path().join("content/docs").join(id.to_string()).is_file());
        assert!(temp.path().join("metadata/docs").join(format!("{}.json", id)).is_file());
    }

    #[tokio::test]
    async fn test_folder_chunked_upload() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp);
        let id = Uuid::new_v4();
        let chunks: Vec<Result<Vec<u8>>> = vec![Ok(vec![1, 2]), Ok(vec![3])];

        let record = provider
            .upload(
                "docs",
                id,
                MetadataMap::new(),
                Box::pin(stream::iter(chunks)),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(record.size, 3);
        assert_eq!(read_all(&provider, "docs", id).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_folder_duplicate_rejected() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp);
        let cancel = CancellationToken::new();
        let id = Uuid::new_v4();

        provider
            .upload("docs", id, MetadataMap::new(), bytes_stream(vec![1]), &cancel)
            .await
            .unwrap();
        let result = provider
            .upload("docs", id, MetadataMap::new(), bytes_stream(vec![2]), &cancel)
            .await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_folder_orphan_content_is_overwritten() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp);
        let cancel = CancellationToken::new();
        let id = Uuid::new_v4();

        let orphan = temp.path().join("content/docs").join(id.to_string());
        std::fs::create_dir_all(orphan.parent().unwrap()).unwrap();
        std::fs::write(&orphan, b"stale").unwrap();
        assert!(provider.find("docs", id, &cancel).await.unwrap().is_none());

        let record = provider
            .upload("docs", id, MetadataMap::new(), bytes_stream(b"fresh".to_vec()), &cancel)
            .await
            .unwrap();
        assert_eq!(record.size, 5);
        assert_eq!(read_all(&provider, "docs", id).await.unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_folder_empty_content_rejected() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp);
        let id = Uuid::new_v4();

        let result = provider
            .upload(
                "docs",
                id,
                MetadataMap::new(),
                bytes_stream(Vec::new()),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(provider.find("docs", id, &CancellationToken::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_folder_failed_stream_leaves_nothing() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp);
        let id = Uuid::new_v4();
        let chunks: Vec<Result<Vec<u8>>> =
            vec![Ok(vec![1]), Err(Error::integration("connection reset"))];

        let result = provider
            .upload(
                "docs",
                id,
                MetadataMap::new(),
                Box::pin(stream::iter(chunks)),
                &CancellationToken::new(),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(entries(&temp.path().join("content/docs")), 0);
        assert_eq!(entries(&temp.path().join("metadata/docs")), 0);
    }

    #[tokio::test]
    async fn test_folder_cancelled_upload_leaves_nothing() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = provider
            .upload("docs", Uuid::new_v4(), MetadataMap::new(), bytes_stream(vec![1]), &cancel)
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(entries(&temp.path().join("content/docs")), 0);
        assert_eq!(entries(&temp.path().join("metadata/docs")), 0);
    }

    #[tokio::test]
    async fn test_folder_missing_file() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp);
        let cancel = CancellationToken::new();
        let id = Uuid::new_v4();

        assert!(provider.find("docs", id, &cancel).await.unwrap().is_none());
        assert!(matches!(read_all(&provider, "docs", id).await, Err(Error::NotFound(_))));
        assert!(!provider.delete("docs", id, &cancel).await.unwrap());
    }

    #[tokio::test]
    async fn test_folder_delete() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp);
        let cancel = CancellationToken::new();
        let id = Uuid::new_v4();

        provider
            .upload("docs", id, MetadataMap::new(), bytes_stream(vec![1, 2, 3]), &cancel)
            .await
            .unwrap();

        assert!(provider.delete("docs", id, &cancel).await.unwrap());
        assert!(provider.find("docs", id, &cancel).await.unwrap().is_none());
        assert!(!temp.path().join("content/docs").join(id.to_string()).exists());
    }

    #[tokio::test]
    async fn test_folder_malformed_sidecar() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp);
        let id = Uuid::new_v4();
        let dir = temp.path().join("metadata/docs");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{}.json", id)), b"not json").unwrap();

        let result = provider.find("docs", id, &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::Integration { .. })));
    }

    #[tokio::test]
    async fn test_folder_rejects_path_traversal_bucket() {
        let temp = TempDir::new().unwrap();
        let provider = provider(&temp);

        let result = provider.find("..", Uuid::new_v4(), &CancellationToken::new()).await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}
