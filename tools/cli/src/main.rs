//! filestore CLI - Command line interface for file storage operations.
//!
//! Uploads, finds, reads and deletes files in a collection of a context
//! described by a storage settings file.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use futures::{StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use filestore_common::Error as StoreError;
use filestore_context::{
    load_settings, ContextSettings, FileCollection, FileContext, FileStorage, ProviderSettings,
    StorageContext, StorageSettings,
};
use filestore_metadata::{FieldMapBuilder, FileMetadata, SchemaCache};
use filestore_storage::ByteStream;

#[derive(Parser)]
#[command(name = "filestore")]
#[command(about = "filestore - Typed file storage over pluggable providers")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Storage settings file.
    #[arg(short, long, default_value = "filestore.json")]
    settings: PathBuf,

    /// Context section of the settings file to use.
    #[arg(short, long, default_value = "default")]
    context: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a settings file using a folder provider.
    Init {
        /// Directory to store content and metadata in.
        #[arg(short, long)]
        root: PathBuf,
    },

    #[command(flatten)]
    Files(FileCommand),
}

/// Commands that run against an opened storage context.
#[derive(Subcommand)]
enum FileCommand {
    /// Upload a file into a collection.
    Upload {
        /// Collection key.
        #[arg(short = 'k', long)]
        collection: String,

        /// Source file to upload.
        #[arg(short, long)]
        source: PathBuf,

        /// File id (default: random).
        #[arg(short, long)]
        id: Option<Uuid>,

        /// Content type (default: guessed from the extension).
        #[arg(short = 't', long)]
        content_type: Option<String>,
    },

    /// Show a file's metadata.
    Find {
        /// Collection key.
        #[arg(short = 'k', long)]
        collection: String,

        /// File id.
        #[arg(short, long)]
        id: Uuid,
    },

    /// Write a file's content to disk.
    Read {
        /// Collection key.
        #[arg(short = 'k', long)]
        collection: String,

        /// File id.
        #[arg(short, long)]
        id: Uuid,

        /// Destination file path.
        #[arg(short, long)]
        dest: PathBuf,
    },

    /// Delete a file.
    Delete {
        /// Collection key.
        #[arg(short = 'k', long)]
        collection: String,

        /// File id.
        #[arg(short, long)]
        id: Uuid,
    },
}

/// Metadata stored with every file the CLI uploads.
#[derive(Debug, Default, Clone, PartialEq)]
struct StoredFile {
    file_name: String,
    content_type: Option<String>,
    uploaded_at: Option<DateTime<Utc>>,
}

impl FileMetadata for StoredFile {
    fn describe(fields: &mut FieldMapBuilder<Self>) {
        fields
            .field("FileName", |m: &Self| &m.file_name, |m| &mut m.file_name)
            .required();
        fields.field("ContentType", |m: &Self| &m.content_type, |m| &mut m.content_type);
        fields.field("UploadedAt", |m: &Self| &m.uploaded_at, |m| &mut m.uploaded_at);
    }
}

/// Context whose collections all hold [`StoredFile`] metadata.
struct CliContext {
    storage: StorageContext,
}

impl CliContext {
    fn files(&self, key: &str) -> filestore_common::Result<Arc<FileCollection<StoredFile>>> {
        self.storage.collection(key)
    }
}

impl FileContext for CliContext {
    fn create(storage: StorageContext) -> Self {
        Self { storage }
    }

    fn register_metadata(schemas: &SchemaCache) -> filestore_common::Result<()> {
        schemas.field_map::<StoredFile>()?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init { root } => cmd_init(&cli.settings, &cli.context, &root),
        Commands::Files(command) => run_files(&cli.settings, &cli.context, command).await,
    }
}

/// Open the storage, run one file command, then close the providers.
async fn run_files(settings_path: &Path, context_name: &str, command: FileCommand) -> Result<()> {
    let storage = open_storage(settings_path, context_name)?;
    let context = storage
        .context::<CliContext>()
        .context("Failed to open storage context")?;

    let result = match command {
        FileCommand::Upload {
            collection,
            source,
            id,
            content_type,
        } => cmd_upload(&context, &collection, &source, id, content_type).await,
        FileCommand::Find { collection, id } => cmd_find(&context, &collection, id).await,
        FileCommand::Read {
            collection,
            id,
            dest,
        } => cmd_read(&context, &collection, id, &dest).await,
        FileCommand::Delete { collection, id } => cmd_delete(&context, &collection, id).await,
    };

    storage.shutdown().await.context("Failed to close providers")?;
    result
}

/// Build the file storage described by a settings file.
fn open_storage(settings_path: &Path, context: &str) -> Result<FileStorage> {
    let settings = load_settings(settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;

    let mut builder = FileStorage::builder();
    builder
        .apply_settings(settings)
        .context("Invalid storage settings")?
        .add_named_context::<CliContext>(context)
        .with_context(|| format!("Failed to register context '{}'", context))?;
    Ok(builder.build())
}

/// Settings for a single folder provider under `root`.
fn folder_settings(root: &Path, context: &str) -> StorageSettings {
    let mut settings = StorageSettings::default();
    settings.providers.insert(
        "local".to_string(),
        ProviderSettings {
            kind: "folder".to_string(),
            options: serde_json::json!({
                "content_path": root.join("content"),
                "metadata_path": root.join("metadata"),
            }),
        },
    );
    settings.contexts.insert(
        context.to_string(),
        ContextSettings {
            provider: "local".to_string(),
            collections: Default::default(),
        },
    );
    settings
}

/// Write a new settings file.
fn cmd_init(settings_path: &Path, context: &str, root: &Path) -> Result<()> {
    if settings_path.exists() {
        anyhow::bail!("Settings file {} already exists", settings_path.display());
    }

    let json = folder_settings(root, context).to_json()?;
    std::fs::write(settings_path, json).context("Failed to write settings file")?;

    println!("Settings written to {}", settings_path.display());
    println!("  Provider: folder ({})", root.display());
    println!("  Context: {}", context);

    Ok(())
}

/// Guess a content type from a file extension.
fn guess_content_type(path: &Path) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let content_type = match extension.as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    };
    Some(content_type.to_string())
}

/// Upload a file.
async fn cmd_upload(
    context: &CliContext,
    collection: &str,
    source: &Path,
    id: Option<Uuid>,
    content_type: Option<String>,
) -> Result<()> {
    info!("Uploading {} to collection {}", source.display(), collection);

    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("Source path has no file name")?;
    let metadata = StoredFile {
        file_name,
        content_type: content_type.or_else(|| guess_content_type(source)),
        uploaded_at: Some(Utc::now()),
    };

    let file = tokio::fs::File::open(source)
        .await
        .context("Failed to open source file")?;
    let content: ByteStream = Box::pin(
        ReaderStream::new(file)
            .map_ok(|chunk| chunk.to_vec())
            .map_err(|e| StoreError::from_io(e, "Failed to read source file")),
    );

    let id = id.unwrap_or_else(Uuid::new_v4);
    let stored = context
        .files(collection)?
        .upload(id, metadata, content)
        .await
        .context("Failed to upload file")?;

    println!("File uploaded successfully!");
    println!("  ID: {}", stored.id);
    println!("  Size: {} bytes", stored.size);

    Ok(())
}

/// Show file metadata.
async fn cmd_find(context: &CliContext, collection: &str, id: Uuid) -> Result<()> {
    let found = context
        .files(collection)?
        .find(id)
        .await
        .context("Failed to look up file")?;

    let Some(file) = found else {
        println!("File {} not found in {}", id, collection);
        return Ok(());
    };

    println!("File: {}", file.id);
    println!("  Name: {}", file.metadata.file_name);
    println!("  Size: {} bytes", file.size);
    if let Some(content_type) = &file.metadata.content_type {
        println!("  Content type: {}", content_type);
    }
    if let Some(uploaded_at) = file.metadata.uploaded_at {
        println!("  Uploaded: {}", uploaded_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    Ok(())
}

/// Write file content to disk.
async fn cmd_read(context: &CliContext, collection: &str, id: Uuid, dest: &Path) -> Result<()> {
    info!("Reading {} from {} to {}", id, collection, dest.display());

    let mut content = context
        .files(collection)?
        .read(id)
        .await
        .context("Failed to read file")?;

    let mut output = tokio::fs::File::create(dest)
        .await
        .context("Failed to create output file")?;
    let mut written = 0usize;
    while let Some(chunk) = content.next().await {
        let chunk = chunk.context("Failed to read file content")?;
        output
            .write_all(&chunk)
            .await
            .context("Failed to write output file")?;
        written += chunk.len();
    }
    output.flush().await.context("Failed to write output file")?;

    println!(
        "File written successfully: {} ({} bytes)",
        dest.display(),
        written
    );

    Ok(())
}

/// Delete a file.
async fn cmd_delete(context: &CliContext, collection: &str, id: Uuid) -> Result<()> {
    info!("Deleting {} from {}", id, collection);

    let deleted = context
        .files(collection)?
        .delete(id)
        .await
        .context("Failed to delete file")?;

    if deleted {
        println!("File deleted: {}", id);
    } else {
        println!("File {} not found in {}", id, collection);
    }

    Ok(())
}
