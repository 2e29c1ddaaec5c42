//! Storage contexts.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use filestore_common::{Error, Result};
use filestore_metadata::{FileMetadata, SchemaCache};
use filestore_storage::StorageProvider;

use crate::collection::FileCollection;
use crate::config::ContextConfiguration;

type AnyCollection = Arc<dyn Any + Send + Sync>;

/// Per-scope handle onto one provider.
///
/// Hands out typed collections and caches them by normalized physical
/// name, so the same collection key always yields the same instance within
/// one context. The provider is shared; dropping a context never closes it.
pub struct StorageContext {
    provider: Arc<dyn StorageProvider>,
    schemas: Arc<SchemaCache>,
    configuration: Arc<ContextConfiguration>,
    collections: Mutex<HashMap<String, AnyCollection>>,
}

impl StorageContext {
    /// Create a context over an already resolved provider.
    pub fn new(
        provider: Arc<dyn StorageProvider>,
        schemas: Arc<SchemaCache>,
        configuration: Arc<ContextConfiguration>,
    ) -> Self {
        Self {
            provider,
            schemas,
            configuration,
            collections: Mutex::new(HashMap::new()),
        }
    }

    /// The shared provider.
    pub fn provider(&self) -> &Arc<dyn StorageProvider> {
        &self.provider
    }

    /// The collection alias table.
    pub fn configuration(&self) -> &ContextConfiguration {
        &self.configuration
    }

    /// Get the collection for a logical key.
    ///
    /// The key is mapped through the alias table, then trimmed; the cache key
    /// is the lowercased physical name.
    ///
    /// # Errors
    /// - `InvalidArgument` if the key is blank, or if the collection was
    ///   already opened with a different metadata type
    /// - `Configuration` if `T`'s field map is invalid
    pub fn collection<T: FileMetadata>(&self, key: &str) -> Result<Arc<FileCollection<T>>> {
        let key = key.trim();
        let physical = self.configuration.resolve(key).unwrap_or(key).trim();
        if physical.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "Collection key '{}' does not name a collection",
                key
            )));
        }
        let cache_key = physical.to_lowercase();

        let mut collections = self.collections.lock();
        if let Some(existing) = collections.get(&cache_key) {
            return existing.clone().downcast::<FileCollection<T>>().map_err(|_| {
                Error::InvalidArgument(format!(
                    "Collection '{}' is already open with a different metadata type than {}",
                    physical,
                    type_name::<T>()
                ))
            });
        }

        let codec = self.schemas.codec::<T>(self.provider.metadata_transport())?;
        let collection = Arc::new(FileCollection::new(physical, self.provider.clone(), codec));
        debug!(
            key = %key,
            collection = %physical,
            metadata_type = type_name::<T>(),
            "Opened collection"
        );
        collections.insert(cache_key, collection.clone());
        Ok(collection)
    }
}
