//! Common utilities and types shared across filestore crates.
//!
//! This crate provides the error taxonomy every provider maps its failures
//! into, and the plain data exchanged between collections and providers.

pub mod error;
pub mod types;

pub use error::{BoxError, Error, Result};
pub use types::{BucketName, FileRecord, MetadataMap, MetadataTransport};
