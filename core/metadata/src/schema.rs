//! Field maps for metadata types.
//!
//! A metadata type lists its fields once through [`FileMetadata::describe`].
//! [`MetadataFieldMap::build`] turns that description into a flat, ordered
//! list of [`MetadataField`] descriptors whose accessors are plain closures,
//! so serializing a value never inspects the type again.
//!
//! # Nested types
//! A field whose type is itself a [`FileMetadata`] is flattened recursively.
//! Each inner key is prefixed with the outer key and a dot (`Author.Name`).
//! Ignoring a nested field ignores its whole subtree; marking it required
//! makes every leaf below it required.

use std::any::type_name;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use filestore_common::{BoxError, Error, Result};

use crate::value::MetadataValue;

type Getter<T> = Arc<dyn Fn(&T) -> Option<String> + Send + Sync>;
type Setter<T> = Arc<dyn Fn(&mut T, &str) -> std::result::Result<(), BoxError> + Send + Sync>;

/// A record type whose fields are stored as flat provider metadata.
///
/// # Example
/// ```
/// use filestore_metadata::{FieldMapBuilder, FileMetadata};
///
/// #[derive(Default)]
/// struct Invoice {
///     file_name: String,
///     total: Option<f64>,
///     scratch: String,
/// }
///
/// impl FileMetadata for Invoice {
///     fn describe(fields: &mut FieldMapBuilder<Self>) {
///         fields.field("FileName", |m: &Self| &m.file_name, |m| &mut m.file_name).required();
///         fields.field("Total", |m: &Self| &m.total, |m| &mut m.total).rename("Amount");
///         fields.field("Scratch", |m: &Self| &m.scratch, |m| &mut m.scratch).ignore();
///     }
/// }
/// ```
pub trait FileMetadata: Default + Send + Sync + 'static {
    /// Declare the fields of this type, in storage order.
    fn describe(fields: &mut FieldMapBuilder<Self>);
}

/// Descriptor for one flattened metadata field.
pub struct MetadataField<T> {
    name: String,
    logical_key: String,
    ignored: bool,
    required: bool,
    text: bool,
    get: Getter<T>,
    set: Setter<T>,
}

impl<T: 'static> MetadataField<T> {
    /// Declared field name (dot-joined for nested fields).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key under which the value is stored in provider metadata.
    pub fn logical_key(&self) -> &str {
        &self.logical_key
    }

    /// Whether the field is excluded from storage.
    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    /// Whether a null value is rejected at serialize time.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Whether the stored value is free-form text.
    pub fn is_text(&self) -> bool {
        self.text
    }

    /// Read the stored form of this field from `value`.
    pub fn read(&self, value: &T) -> Option<String> {
        (self.get)(value)
    }

    /// Parse `raw` and assign it to this field of `value`.
    pub fn write(&self, value: &mut T, raw: &str) -> std::result::Result<(), BoxError> {
        (self.set)(value, raw)
    }

    /// Re-root this descriptor under an outer type `P`.
    fn nest<P: 'static>(
        self,
        outer: &NestedSpec,
        get: Arc<dyn Fn(&P) -> &T + Send + Sync>,
        get_mut: Arc<dyn Fn(&mut P) -> &mut T + Send + Sync>,
    ) -> MetadataField<P> {
        let inner_get = self.get;
        let inner_set = self.set;
        MetadataField {
            name: format!("{}.{}", outer.name, self.name),
            logical_key: format!("{}.{}", outer.key, self.logical_key),
            ignored: outer.ignored || self.ignored,
            required: outer.required || self.required,
            text: self.text,
            get: Arc::new(move |parent: &P| inner_get(get(parent))),
            set: Arc::new(move |parent: &mut P, raw: &str| inner_set(get_mut(parent), raw)),
        }
    }
}

impl<T> fmt::Debug for MetadataField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataField")
            .field("name", &self.name)
            .field("logical_key", &self.logical_key)
            .field("ignored", &self.ignored)
            .field("required", &self.required)
            .field("text", &self.text)
            .finish()
    }
}

struct NestedSpec {
    name: String,
    key: String,
    ignored: bool,
    required: bool,
}

type NestedFields<T> = Box<dyn FnOnce(&NestedSpec) -> Result<Vec<MetadataField<T>>> + Send>;

enum FieldKind<T> {
    Scalar {
        text: bool,
        get: Getter<T>,
        set: Setter<T>,
    },
    Nested(NestedFields<T>),
}

/// Declaration of one field, returned by [`FieldMapBuilder`] for chaining.
pub struct FieldSpec<T> {
    name: &'static str,
    rename: Option<String>,
    ignored: bool,
    required: bool,
    kind: FieldKind<T>,
}

impl<T> FieldSpec<T> {
    /// Store the field under `key` instead of its declared name.
    pub fn rename(&mut self, key: impl Into<String>) -> &mut Self {
        self.rename = Some(key.into());
        self
    }

    /// Exclude the field from storage entirely.
    pub fn ignore(&mut self) -> &mut Self {
        self.ignored = true;
        self
    }

    /// Reject null or empty values at serialize time.
    pub fn required(&mut self) -> &mut Self {
        self.required = true;
        self
    }
}

/// Collects field declarations for one metadata type.
pub struct FieldMapBuilder<T> {
    specs: Vec<FieldSpec<T>>,
}

impl<T: 'static> FieldMapBuilder<T> {
    fn new() -> Self {
        Self { specs: Vec::new() }
    }

    /// Declare a scalar field with its shared and mutable accessors.
    pub fn field<V, G, S>(&mut self, name: &'static str, get: G, get_mut: S) -> &mut FieldSpec<T>
    where
        V: MetadataValue,
        G: Fn(&T) -> &V + Send + Sync + 'static,
        S: Fn(&mut T) -> &mut V + Send + Sync + 'static,
    {
        let getter: Getter<T> = Arc::new(move |value: &T| get(value).to_metadata());
        let setter: Setter<T> = Arc::new(
            move |value: &mut T, raw: &str| -> std::result::Result<(), BoxError> {
                *get_mut(value) = V::from_metadata(raw)?;
                Ok(())
            },
        );

        self.push(
            name,
            FieldKind::Scalar {
                text: V::TEXT,
                get: getter,
                set: setter,
            },
        )
    }

    /// Declare a compound field whose own fields are flattened under this one.
    pub fn nested<N, G, S>(&mut self, name: &'static str, get: G, get_mut: S) -> &mut FieldSpec<T>
    where
        N: FileMetadata,
        G: Fn(&T) -> &N + Send + Sync + 'static,
        S: Fn(&mut T) -> &mut N + Send + Sync + 'static,
    {
        let get: Arc<dyn Fn(&T) -> &N + Send + Sync> = Arc::new(get);
        let get_mut: Arc<dyn Fn(&mut T) -> &mut N + Send + Sync> = Arc::new(get_mut);

        let nested: NestedFields<T> =
            Box::new(move |outer: &NestedSpec| -> Result<Vec<MetadataField<T>>> {
                let inner = MetadataFieldMap::<N>::build()?;
                Ok(inner
                    .fields
                    .into_iter()
                    .map(|field| field.nest(outer, get.clone(), get_mut.clone()))
                    .collect())
            });

        self.push(name, FieldKind::Nested(nested))
    }

    fn push(&mut self, name: &'static str, kind: FieldKind<T>) -> &mut FieldSpec<T> {
        self.specs.push(FieldSpec {
            name,
            rename: None,
            ignored: false,
            required: false,
            kind,
        });
        let last = self.specs.len() - 1;
        &mut self.specs[last]
    }
}

/// Ordered, validated field descriptors for one metadata type.
pub struct MetadataFieldMap<T> {
    type_name: &'static str,
    fields: Vec<MetadataField<T>>,
}

impl<T: FileMetadata> MetadataFieldMap<T> {
    /// Build the field map for `T`.
    ///
    /// The result depends only on `T::describe`, so building twice yields
    /// the same descriptors in the same order.
    ///
    /// # Errors
    /// - A field has an empty name or an empty rename key
    /// - Two non-ignored fields resolve to the same logical key
    pub fn build() -> Result<Self> {
        let type_name = type_name::<T>();
        let mut builder = FieldMapBuilder::<T>::new();
        T::describe(&mut builder);

        let mut fields = Vec::with_capacity(builder.specs.len());
        for spec in builder.specs {
            if spec.name.trim().is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "Metadata field name cannot be empty in {}",
                    type_name
                )));
            }

            let key = match spec.rename {
                Some(key) if key.trim().is_empty() => {
                    return Err(Error::InvalidArgument(format!(
                        "Metadata key for field '{}' in {} cannot be empty",
                        spec.name, type_name
                    )));
                }
                Some(key) => key,
                None => spec.name.to_string(),
            };

            match spec.kind {
                FieldKind::Scalar { text, get, set } => fields.push(MetadataField {
                    name: spec.name.to_string(),
                    logical_key: key,
                    ignored: spec.ignored,
                    required: spec.required,
                    text,
                    get,
                    set,
                }),
                FieldKind::Nested(nested) => {
                    let outer = NestedSpec {
                        name: spec.name.to_string(),
                        key,
                        ignored: spec.ignored,
                        required: spec.required,
                    };
                    fields.extend(nested(&outer)?);
                }
            }
        }

        let mut seen = HashSet::new();
        for field in fields.iter().filter(|f| !f.ignored) {
            if !seen.insert(field.logical_key.as_str()) {
                return Err(Error::Configuration(format!(
                    "Duplicate metadata key '{}' in {}",
                    field.logical_key, type_name
                )));
            }
        }

        Ok(Self { type_name, fields })
    }

    /// Name of the described type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// All descriptors, ignored ones included, in declaration order.
    pub fn fields(&self) -> &[MetadataField<T>] {
        &self.fields
    }

    /// Descriptors that take part in storage.
    pub fn stored_fields(&self) -> impl Iterator<Item = &MetadataField<T>> {
        self.fields.iter().filter(|f| !f.ignored)
    }

    /// Logical keys of the stored fields, in order.
    pub fn keys(&self) -> Vec<&str> {
        self.stored_fields().map(|f| f.logical_key.as_str()).collect()
    }

    /// Look up a stored field by logical key.
    pub fn get(&self, key: &str) -> Option<&MetadataField<T>> {
        self.stored_fields().find(|f| f.logical_key == key)
    }

    /// Number of descriptors, ignored ones included.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the type declares no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<T> fmt::Debug for MetadataFieldMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataFieldMap")
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .finish()
    }
}
