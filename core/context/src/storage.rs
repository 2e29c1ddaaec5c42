//! Composition root: registry, schema cache and registered contexts.

use std::any::{type_name, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use filestore_common::{Error, Result};
use filestore_metadata::SchemaCache;
use filestore_storage::ProviderRegistry;

use crate::config::{ContextConfiguration, ContextSettings, StorageSettings};
use crate::context::StorageContext;

/// A user-defined context type.
///
/// Implementors wrap a [`StorageContext`] and expose typed collection
/// accessors:
///
/// ```
/// use std::sync::Arc;
/// use filestore_common::Result;
/// use filestore_context::{FileCollection, FileContext, StorageContext};
/// use filestore_metadata::{FieldMapBuilder, FileMetadata, SchemaCache};
///
/// #[derive(Default)]
/// struct Invoice {
///     number: String,
/// }
///
/// impl FileMetadata for Invoice {
///     fn describe(fields: &mut FieldMapBuilder<Self>) {
///         fields.field("Number", |m: &Self| &m.number, |m| &mut m.number).required();
///     }
/// }
///
/// struct Billing {
///     storage: StorageContext,
/// }
///
/// impl Billing {
///     fn invoices(&self) -> Result<Arc<FileCollection<Invoice>>> {
///         self.storage.collection("Invoices")
///     }
/// }
///
/// impl FileContext for Billing {
///     fn create(storage: StorageContext) -> Self {
///         Self { storage }
///     }
///
///     fn register_metadata(schemas: &SchemaCache) -> Result<()> {
///         schemas.field_map::<Invoice>()?;
///         Ok(())
///     }
/// }
/// ```
pub trait FileContext: Sized + 'static {
    /// Wrap a freshly created storage context.
    fn create(storage: StorageContext) -> Self;

    /// Build the field maps of every metadata type this context uses.
    ///
    /// Called once when the context is registered so invalid metadata
    /// declarations fail at startup instead of on first use.
    fn register_metadata(_schemas: &SchemaCache) -> Result<()> {
        Ok(())
    }
}

/// How to build one registered context type.
#[derive(Debug, Clone)]
struct ContextRegistration {
    provider: String,
    configuration: Arc<ContextConfiguration>,
}

/// Builder for [`FileStorage`].
pub struct FileStorageBuilder {
    registry: ProviderRegistry,
    schemas: Arc<SchemaCache>,
    contexts: HashMap<TypeId, ContextRegistration>,
    named_contexts: BTreeMap<String, ContextSettings>,
}

impl FileStorageBuilder {
    /// Create a builder with the built-in provider kinds.
    pub fn new() -> Self {
        Self::with_registry(ProviderRegistry::with_default_providers())
    }

    /// Create a builder around a custom registry.
    pub fn with_registry(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            schemas: Arc::new(SchemaCache::new()),
            contexts: HashMap::new(),
            named_contexts: BTreeMap::new(),
        }
    }

    /// Get mutable provider registry.
    pub fn registry_mut(&mut self) -> &mut ProviderRegistry {
        &mut self.registry
    }

    /// Register a named provider configuration.
    pub fn add_provider(
        &mut self,
        name: impl Into<String>,
        kind: impl Into<String>,
        options: Value,
    ) -> Result<&mut Self> {
        self.registry.register(name, kind, options)?;
        Ok(self)
    }

    /// Register a context type bound to a provider configuration.
    ///
    /// # Errors
    /// - `InvalidArgument` if `C` is already registered
    /// - `NotFound` if `provider` is not a registered configuration
    /// - `Configuration` if one of `C`'s metadata types is invalid
    pub fn add_context<C: FileContext>(
        &mut self,
        provider: impl Into<String>,
        configuration: ContextConfiguration,
    ) -> Result<&mut Self> {
        let provider = provider.into();
        let type_id = TypeId::of::<C>();

        if self.contexts.contains_key(&type_id) {
            return Err(Error::InvalidArgument(format!(
                "Context {} is already registered",
                type_name::<C>()
            )));
        }
        if !self.registry.has_configuration(&provider) {
            return Err(Error::NotFound(format!(
                "Provider configuration '{}' for context {}",
                provider,
                type_name::<C>()
            )));
        }
        C::register_metadata(&self.schemas)?;

        debug!(context = type_name::<C>(), provider = %provider, "Registered context");
        self.contexts.insert(
            type_id,
            ContextRegistration {
                provider,
                configuration: Arc::new(configuration),
            },
        );
        Ok(self)
    }

    /// Register a context type from a context section of the applied settings.
    ///
    /// # Errors
    /// - `NotFound` if no context named `name` was applied
    /// - Same as [`add_context`](Self::add_context)
    pub fn add_named_context<C: FileContext>(&mut self, name: &str) -> Result<&mut Self> {
        let settings = self
            .named_contexts
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Context '{}' in storage settings", name)))?;
        self.add_context::<C>(settings.provider.clone(), settings.configuration())
    }

    /// Register the providers of a settings file and remember its contexts.
    ///
    /// Providers are registered immediately. Contexts are bound to types
    /// later through [`add_named_context`](Self::add_named_context).
    ///
    /// # Errors
    /// - Same as [`ProviderRegistry::register`]
    /// - `NotFound` if a context refers to an unknown provider configuration
    pub fn apply_settings(&mut self, settings: StorageSettings) -> Result<&mut Self> {
        for (name, provider) in settings.providers {
            self.registry.register(name, provider.kind, provider.options)?;
        }
        for (name, context) in settings.contexts {
            if !self.registry.has_configuration(&context.provider) {
                return Err(Error::NotFound(format!(
                    "Provider configuration '{}' for context '{}'",
                    context.provider, name
                )));
            }
            self.named_contexts.insert(name, context);
        }
        Ok(self)
    }

    /// Finish building.
    pub fn build(self) -> FileStorage {
        info!(
            providers = self.registry.configurations().len(),
            contexts = self.contexts.len(),
            "File storage ready"
        );
        FileStorage {
            registry: Arc::new(self.registry),
            schemas: self.schemas,
            contexts: self.contexts,
        }
    }
}

impl Default for FileStorageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry point for applications.
///
/// Owns the provider registry and the schema cache. Contexts are created
/// per scope through [`context`](Self::context); the providers behind them
/// live until [`shutdown`](Self::shutdown).
pub struct FileStorage {
    registry: Arc<ProviderRegistry>,
    schemas: Arc<SchemaCache>,
    contexts: HashMap<TypeId, ContextRegistration>,
}

impl FileStorage {
    /// Start building a file storage.
    pub fn builder() -> FileStorageBuilder {
        FileStorageBuilder::new()
    }

    /// Get the provider registry.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Get the shared schema cache.
    pub fn schemas(&self) -> &Arc<SchemaCache> {
        &self.schemas
    }

    /// Whether context type `C` is registered.
    pub fn has_context<C: FileContext>(&self) -> bool {
        self.contexts.contains_key(&TypeId::of::<C>())
    }

    /// Create a new instance of context `C`.
    ///
    /// Each call creates a fresh context with its own collection cache;
    /// the provider is resolved once and shared.
    ///
    /// # Errors
    /// - `NotFound` if `C` was never registered
    /// - Whatever constructing the provider returns
    pub fn context<C: FileContext>(&self) -> Result<C> {
        let registration = self
            .contexts
            .get(&TypeId::of::<C>())
            .ok_or_else(|| {
                Error::NotFound(format!("Context {} is not registered", type_name::<C>()))
            })?;

        let provider = self.registry.resolve(&registration.provider)?;
        let storage = StorageContext::new(
            provider,
            self.schemas.clone(),
            registration.configuration.clone(),
        );
        Ok(C::create(storage))
    }

    /// Close every provider.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down file storage");
        self.registry.shutdown().await
    }
}
