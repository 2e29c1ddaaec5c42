//! Typed file storage contexts for filestore.
//!
//! This crate is the client-facing layer:
//! - [`FileStorage`] owns the provider registry and the schema cache and
//!   creates contexts per scope
//! - [`StorageContext`] hands out typed [`FileCollection`]s over one provider
//! - [`StorageSettings`] describes providers and contexts in a JSON file

pub mod collection;
pub mod config;
pub mod context;
pub mod storage;

pub use collection::{File, FileCollection};
pub use config::{
    load_settings, ContextConfiguration, ContextSettings, ProviderSettings, StorageSettings,
};
pub use context::StorageContext;
pub use storage::{FileContext, FileStorage, FileStorageBuilder};
