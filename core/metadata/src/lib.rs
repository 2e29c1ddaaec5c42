//! Metadata mapping for filestore.
//!
//! This crate turns caller-defined metadata records into the flat
//! string-keyed maps providers store, and back again:
//! - [`FileMetadata`] and [`FieldMapBuilder`]: explicit field declaration
//!   with rename, ignore and required options
//! - [`MetadataFieldMap`]: the validated, ordered field descriptors of a type
//! - [`MetadataCodec`]: serialization with required-field checks and typed
//!   conversion
//! - [`SchemaCache`]: one field map per type, shared across contexts

pub mod cache;
pub mod codec;
pub mod schema;
pub mod value;

pub use cache::SchemaCache;
pub use codec::{decode_header_value, encode_header_value, MetadataCodec, HEX_PREFIX};
pub use schema::{FieldMapBuilder, FieldSpec, FileMetadata, MetadataField, MetadataFieldMap};
pub use value::MetadataValue;
