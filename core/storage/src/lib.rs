//! Storage provider abstraction for filestore.
//!
//! This crate provides a trait-based interface for storage backends
//! (object storage, local folders, in-memory test doubles) and a provider
//! registry that constructs one shared instance per named configuration.
//!
//! # Design Principles
//! - Provider isolation: no provider-specific logic above this crate
//! - Async operations: all I/O is async and cancellable
//! - Streaming support: content moves as byte streams
//! - Unified error semantics: backend failures map onto one error type

pub mod folder;
pub mod memory;
pub mod provider;
pub mod registry;
pub mod services;

pub use folder::{FolderOptions, FolderProvider};
pub use memory::{CallCounts, MemoryOptions, MemoryProvider};
pub use provider::{bytes_stream, check_cancelled, collect_stream, ByteStream, StorageProvider};
pub use registry::{factory_for, ProviderConstructor, ProviderFactory, ProviderRegistry};
pub use services::Services;
