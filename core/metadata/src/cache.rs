//! Shared cache of built field maps.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use filestore_common::{Error, MetadataTransport, Result};

use crate::codec::MetadataCodec;
use crate::schema::{FileMetadata, MetadataFieldMap};

type AnyFieldMap = Arc<dyn Any + Send + Sync>;

/// Builds each metadata type's field map at most once and shares it.
///
/// One cache is owned by the composition root and handed to every context,
/// so all collections over the same metadata type share one field map.
#[derive(Default)]
pub struct SchemaCache {
    maps: RwLock<HashMap<TypeId, AnyFieldMap>>,
}

impl SchemaCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the field map for `T`, building it on first use.
    ///
    /// Concurrent first calls build the map once; later calls never take the
    /// write lock. A failed build is not cached.
    pub fn field_map<T: FileMetadata>(&self) -> Result<Arc<MetadataFieldMap<T>>> {
        let type_id = TypeId::of::<T>();

        if let Some(existing) = self.maps.read().get(&type_id) {
            return downcast::<T>(existing.clone());
        }

        let mut maps = self.maps.write();
        if let Some(existing) = maps.get(&type_id) {
            return downcast::<T>(existing.clone());
        }

        let map = Arc::new(MetadataFieldMap::<T>::build()?);
        debug!(
            metadata_type = map.type_name(),
            fields = map.len(),
            "Built metadata field map"
        );
        maps.insert(type_id, map.clone());
        Ok(map)
    }

    /// Get a codec for `T` targeting the given transport.
    pub fn codec<T: FileMetadata>(&self, transport: MetadataTransport) -> Result<MetadataCodec<T>> {
        Ok(MetadataCodec::new(self.field_map::<T>()?).with_transport(transport))
    }

    /// Whether the field map for `T` has been built.
    pub fn contains<T: FileMetadata>(&self) -> bool {
        self.maps.read().contains_key(&TypeId::of::<T>())
    }

    /// Number of cached field maps.
    pub fn len(&self) -> usize {
        self.maps.read().len()
    }

    /// Whether no field map has been built yet.
    pub fn is_empty(&self) -> bool {
        self.maps.read().is_empty()
    }
}

fn downcast<T: FileMetadata>(map: AnyFieldMap) -> Result<Arc<MetadataFieldMap<T>>> {
    map.downcast::<MetadataFieldMap<T>>().map_err(|_| {
        Error::Configuration(format!(
            "Cached field map has unexpected type for {}",
            std::any::type_name::<T>()
        ))
    })
}
