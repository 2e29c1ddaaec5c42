//! Ambient services handed to provider factories.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use filestore_common::{Error, Result};

/// Type-keyed set of shared services.
///
/// Factories pull whatever collaborators they need beyond their own
/// options from here (a shared HTTP client, a database handle, a clock).
#[derive(Default, Clone)]
pub struct Services {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Services {
    /// Create an empty service set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service, replacing any previous service of the same type.
    pub fn insert<S: Send + Sync + 'static>(&mut self, service: S) -> &mut Self {
        self.insert_arc(Arc::new(service))
    }

    /// Add an already shared service.
    pub fn insert_arc<S: Send + Sync + 'static>(&mut self, service: Arc<S>) -> &mut Self {
        self.entries.insert(TypeId::of::<S>(), service);
        self
    }

    /// Look up a service.
    pub fn get<S: Send + Sync + 'static>(&self) -> Option<Arc<S>> {
        self.entries
            .get(&TypeId::of::<S>())
            .and_then(|service| service.clone().downcast::<S>().ok())
    }

    /// Look up a service that must be present.
    ///
    /// # Errors
    /// - `Configuration` if no service of type `S` was registered
    pub fn require<S: Send + Sync + 'static>(&self) -> Result<Arc<S>> {
        self.get::<S>().ok_or_else(|| {
            Error::Configuration(format!("Service {} is not registered", type_name::<S>()))
        })
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no service is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Clock(u64);

    #[test]
    fn test_insert_and_get() {
        let mut services = Services::new();
        services.insert(Clock(7));

        assert_eq!(*services.get::<Clock>().unwrap(), Clock(7));
        assert!(services.get::<String>().is_none());
        assert_eq!(services.len(), 1);
    }

    #[test]
    fn test_insert_arc_shares_instance() {
        let shared = Arc::new(Clock(1));
        let mut services = Services::new();
        services.insert_arc(shared.clone());

        assert!(Arc::ptr_eq(&services.get::<Clock>().unwrap(), &shared));
    }

    #[test]
    fn test_require_missing_fails() {
        let services = Services::new();
        let result = services.require::<Clock>();
        assert!(matches!(result, Err(Error::Configuration(msg)) if msg.contains("Clock")));
    }
}
