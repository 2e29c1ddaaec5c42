//! Provider registry for dynamic provider resolution.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use filestore_common::{Error, Result};

use crate::folder::FolderProvider;
use crate::memory::MemoryProvider;
use crate::provider::StorageProvider;
use crate::services::Services;

/// Factory function type for creating providers.
///
/// Receives the configuration's options and the registry's services.
pub type ProviderFactory =
    Box<dyn Fn(&Value, &Services) -> Result<Arc<dyn StorageProvider>> + Send + Sync>;

/// A provider that can be built from one options value plus services.
pub trait ProviderConstructor: StorageProvider + Sized + 'static {
    /// Factory key the provider registers under.
    const KIND: &'static str;

    /// Serializable options accepted by [`construct`](Self::construct).
    type Options: Serialize + DeserializeOwned;

    /// Build a provider instance.
    fn construct(options: Self::Options, services: &Services) -> Result<Self>;
}

/// Build a factory that decodes `P::Options` and calls `P::construct`.
///
/// A `null` options value is read as an empty object.
pub fn factory_for<P: ProviderConstructor>() -> ProviderFactory {
    Box::new(
        |options: &Value, services: &Services| -> Result<Arc<dyn StorageProvider>> {
            let options = match options {
                Value::Null => Value::Object(Default::default()),
                other => other.clone(),
            };
            let options: P::Options = serde_json::from_value(options).map_err(|e| {
                Error::Configuration(format!(
                    "Invalid options for provider kind '{}': {}",
                    P::KIND,
                    e
                ))
            })?;
            Ok(Arc::new(P::construct(options, services)?))
        },
    )
}

/// One named provider configuration.
struct ProviderConfiguration {
    kind: String,
    options: Value,
    instance: OnceCell<Arc<dyn StorageProvider>>,
}

/// Registry of provider factories and named configurations.
///
/// Factories are keyed by kind (`"memory"`, `"folder"`, ...). A
/// configuration binds a name to a kind plus options; the provider behind
/// it is constructed on first [`resolve`](Self::resolve) and shared by every
/// later caller. The registry owns the constructed providers and closes them
/// on [`shutdown`](Self::shutdown).
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
    configurations: BTreeMap<String, ProviderConfiguration>,
    services: Services,
    shut_down: AtomicBool,
    /// Held shared while a provider is being constructed and exclusively
    /// while `shutdown` flips `shut_down`.
    gate: RwLock<()>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            configurations: BTreeMap::new(),
            services: Services::new(),
            shut_down: AtomicBool::new(false),
            gate: RwLock::new(()),
        }
    }

    /// Create a registry with the built-in provider kinds registered.
    pub fn with_default_providers() -> Self {
        let mut registry = Self::new();
        registry
            .factories
            .insert(MemoryProvider::KIND.to_string(), factory_for::<MemoryProvider>());
        registry
            .factories
            .insert(FolderProvider::KIND.to_string(), factory_for::<FolderProvider>());
        registry
    }

    /// Services handed to every factory.
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Mutable access to the services, for wiring before first resolve.
    pub fn services_mut(&mut self) -> &mut Services {
        &mut self.services
    }

    /// Register a provider factory.
    ///
    /// # Preconditions
    /// - `kind` must be unique within the registry
    ///
    /// # Errors
    /// - `AlreadyExists` if the kind is already registered
    pub fn register_factory(
        &mut self,
        kind: impl Into<String>,
        factory: ProviderFactory,
    ) -> Result<()> {
        let kind = kind.into();
        if self.factories.contains_key(&kind) {
            return Err(Error::AlreadyExists(format!(
                "Provider kind '{}' is already registered",
                kind
            )));
        }
        debug!(kind = %kind, "Registered provider factory");
        self.factories.insert(kind, factory);
        Ok(())
    }

    /// Register a named provider configuration.
    ///
    /// Nothing is constructed until the configuration is first resolved.
    ///
    /// # Errors
    /// - `InvalidArgument` if `name` is empty or already registered
    /// - `Configuration` if no factory is registered for `kind`
    pub fn register(
        &mut self,
        name: impl Into<String>,
        kind: impl Into<String>,
        options: Value,
    ) -> Result<()> {
        let name = name.into();
        let kind = kind.into();

        if name.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "Provider configuration name must not be empty".to_string(),
            ));
        }
        if self.configurations.contains_key(&name) {
            return Err(Error::InvalidArgument(format!(
                "Provider configuration '{}' is already registered",
                name
            )));
        }
        if !self.factories.contains_key(&kind) {
            return Err(Error::Configuration(format!(
                "No provider factory registered for kind '{}' (configuration '{}')",
                kind, name
            )));
        }

        debug!(configuration = %name, kind = %kind, "Registered provider configuration");
        self.configurations.insert(
            name,
            ProviderConfiguration {
                kind,
                options,
                instance: OnceCell::new(),
            },
        );
        Ok(())
    }

    /// Register a configuration for a typed provider.
    ///
    /// The provider's factory is added under `P::KIND` if it is not already
    /// present, and `options` is stored in serialized form.
    ///
    /// # Errors
    /// - Same as [`register`](Self::register)
    /// - `Configuration` if the options cannot be serialized
    pub fn register_provider<P: ProviderConstructor>(
        &mut self,
        name: impl Into<String>,
        options: P::Options,
    ) -> Result<()> {
        let options = serde_json::to_value(options).map_err(|e| {
            Error::Configuration(format!(
                "Cannot serialize options for provider kind '{}': {}",
                P::KIND,
                e
            ))
        })?;
        if !self.factories.contains_key(P::KIND) {
            self.register_factory(P::KIND, factory_for::<P>())?;
        }
        self.register(name, P::KIND, options)
    }

    /// Resolve the provider behind a named configuration.
    ///
    /// The first call constructs the provider; every later call, including
    /// concurrent ones, returns the same instance. A failed construction is
    /// not cached and the next call tries again.
    ///
    /// # Errors
    /// - `NotFound` if the configuration is not registered
    /// - `Configuration` if the registry has been shut down
    /// - Whatever the factory returns
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn StorageProvider>> {
        let _gate = self.gate.read();
        if self.shut_down.load(Ordering::Acquire) {
            return Err(Error::Configuration(format!(
                "Cannot resolve '{}': provider registry is shut down",
                name
            )));
        }

        let config = self.configurations.get(name).ok_or_else(|| {
            Error::NotFound(format!("Provider configuration '{}' is not registered", name))
        })?;

        let provider = config.instance.get_or_try_init(|| {
            let factory = self.factories.get(&config.kind).ok_or_else(|| {
                Error::Configuration(format!(
                    "No provider factory registered for kind '{}'",
                    config.kind
                ))
            })?;
            let provider = factory(&config.options, &self.services)?;
            info!(
                configuration = %name,
                kind = %config.kind,
                provider = provider.name(),
                "Constructed storage provider"
            );
            Ok::<_, Error>(provider)
        })?;

        Ok(provider.clone())
    }

    /// Close every provider that has been constructed.
    ///
    /// All providers are closed even if some fail; the first failure is
    /// returned. Constructions already in flight are waited for, so their
    /// providers are closed too. Later calls are no-ops.
    pub async fn shutdown(&self) -> Result<()> {
        {
            let _gate = self.gate.write();
            if self.shut_down.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
        }

        let mut first_error = None;
        for (name, config) in &self.configurations {
            let Some(provider) = config.instance.get() else {
                continue;
            };
            match provider.close().await {
                Ok(()) => debug!(configuration = %name, "Closed storage provider"),
                Err(err) => {
                    warn!(configuration = %name, error = %err, "Failed to close storage provider");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Names of all registered configurations, sorted.
    pub fn configurations(&self) -> Vec<String> {
        self.configurations.keys().cloned().collect()
    }

    /// Check if a configuration is registered.
    pub fn has_configuration(&self, name: &str) -> bool {
        self.configurations.contains_key(name)
    }

    /// Kind of a registered configuration.
    pub fn kind_of(&self, name: &str) -> Option<&str> {
        self.configurations.get(name).map(|c| c.kind.as_str())
    }

    /// Get list of registered provider kinds.
    pub fn kinds(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Check if a factory is registered for `kind`.
    pub fn has_kind(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
