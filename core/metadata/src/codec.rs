//! Conversion between metadata values and flat provider metadata.

use std::sync::Arc;

use filestore_common::{Error, MetadataMap, MetadataTransport, Result};

use crate::schema::{FileMetadata, MetadataFieldMap};

/// Prefix marking a hex-encoded text value on header-like transports.
pub const HEX_PREFIX: &str = "hex:";

/// Serializes `T` to a [`MetadataMap`] and back using its field map.
pub struct MetadataCodec<T> {
    fields: Arc<MetadataFieldMap<T>>,
    transport: MetadataTransport,
}

impl<T> Clone for MetadataCodec<T> {
    fn clone(&self) -> Self {
        Self {
            fields: Arc::clone(&self.fields),
            transport: self.transport,
        }
    }
}

impl<T: FileMetadata> MetadataCodec<T> {
    /// Create a codec for a native transport.
    pub fn new(fields: Arc<MetadataFieldMap<T>>) -> Self {
        Self {
            fields,
            transport: MetadataTransport::Native,
        }
    }

    /// Set the transport the serialized values must survive.
    pub fn with_transport(mut self, transport: MetadataTransport) -> Self {
        self.transport = transport;
        self
    }

    /// Transport this codec encodes for.
    pub fn transport(&self) -> MetadataTransport {
        self.transport
    }

    /// Field map driving this codec.
    pub fn field_map(&self) -> &MetadataFieldMap<T> {
        &self.fields
    }

    /// Flatten `value` into provider metadata.
    ///
    /// Null values of optional fields are omitted from the map.
    ///
    /// # Errors
    /// - `RequiredField` if a required field is null or an empty string
    pub fn serialize(&self, value: &T) -> Result<MetadataMap> {
        let mut output = MetadataMap::new();

        for field in self.fields.stored_fields() {
            let stored = field.read(value);

            if field.is_required() && stored.as_deref().map_or(true, str::is_empty) {
                return Err(Error::RequiredField(field.logical_key().to_string()));
            }

            if let Some(stored) = stored {
                let stored = if field.is_text() && self.transport == MetadataTransport::Header {
                    encode_header_value(&stored)
                } else {
                    stored
                };
                output.insert(field.logical_key().to_string(), stored);
            }
        }

        Ok(output)
    }

    /// Rebuild a value from provider metadata.
    ///
    /// Starts from `T::default()`; keys missing from `input` keep their
    /// default and keys unknown to `T` are skipped.
    ///
    /// # Errors
    /// - `Integration` if a stored value cannot be converted to its field type
    pub fn deserialize(&self, input: &MetadataMap) -> Result<T> {
        let mut value = T::default();

        for field in self.fields.stored_fields() {
            let Some(raw) = input.get(field.logical_key()) else {
                continue;
            };

            let decoded;
            let raw = if field.is_text() && self.transport == MetadataTransport::Header {
                decoded = decode_header_value(raw).map_err(|source| Error::Integration {
                    message: format!(
                        "Malformed encoded metadata value for '{}'",
                        field.logical_key()
                    ),
                    source: Some(source),
                })?;
                decoded.as_str()
            } else {
                raw.as_str()
            };

            field
                .write(&mut value, raw)
                .map_err(|source| Error::Integration {
                    message: format!(
                        "Cannot convert metadata value for '{}' of {}",
                        field.logical_key(),
                        self.fields.type_name()
                    ),
                    source: Some(source),
                })?;
        }

        Ok(value)
    }
}

/// Encode a text value so it only contains visible ASCII.
pub fn encode_header_value(value: &str) -> String {
    format!("{}{}", HEX_PREFIX, hex::encode(value.as_bytes()))
}

/// Decode a value produced by [`encode_header_value`].
///
/// Values without the prefix are returned unchanged.
pub fn decode_header_value(value: &str) -> std::result::Result<String, filestore_common::BoxError> {
    match value.strip_prefix(HEX_PREFIX) {
        Some(encoded) => Ok(String::from_utf8(hex::decode(encoded)?)?),
        None => Ok(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldMapBuilder;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use proptest::prelude::*;
    use uuid::Uuid;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Address {
        city: String,
        zip: Option<u32>,
    }

    impl FileMetadata for Address {
        fn describe(fields: &mut FieldMapBuilder<Self>) {
            fields.field("City", |m: &Self| &m.city, |m| &mut m.city);
            fields.field("Zip", |m: &Self| &m.zip, |m| &mut m.zip);
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct TestFile {
        file_name: Option<String>,
        size: i64,
        id: Uuid,
        created_date: Option<DateTime<Utc>>,
        day: Option<NaiveDate>,
        ratio: f64,
        published: bool,
        address: Address,
        ignore: Option<String>,
    }

    impl FileMetadata for TestFile {
        fn describe(fields: &mut FieldMapBuilder<Self>) {
            fields
                .field("FileName", |m: &Self| &m.file_name, |m| &mut m.file_name)
                .required();
            fields.field("Size", |m: &Self| &m.size, |m| &mut m.size);
            fields.field("Id", |m: &Self| &m.id, |m| &mut m.id);
            fields.field("CreatedDate", |m: &Self| &m.created_date, |m| &mut m.created_date);
            fields.field("Day", |m: &Self| &m.day, |m| &mut m.day);
            fields.field("Ratio", |m: &Self| &m.ratio, |m| &mut m.ratio);
            fields.field("Published", |m: &Self| &m.published, |m| &mut m.published);
            fields.nested("Address", |m: &Self| &m.address, |m| &mut m.address);
            fields.field("Ignore", |m: &Self| &m.ignore, |m| &mut m.ignore).ignore();
        }
    }

    /// Older shape of the same files: shares some keys, stores the name under
    /// its own declared field name.
    #[derive(Debug, Default, Clone, PartialEq)]
    struct LegacyFile {
        name: String,
        size: i64,
        legacy_flag: bool,
    }

    impl FileMetadata for LegacyFile {
        fn describe(fields: &mut FieldMapBuilder<Self>) {
            fields.field("Name", |m: &Self| &m.name, |m| &mut m.name).rename("FileName");
            fields.field("Size", |m: &Self| &m.size, |m| &mut m.size);
            fields.field("LegacyFlag", |m: &Self| &m.legacy_flag, |m| &mut m.legacy_flag);
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Relabelled {
        label: String,
        address: Address,
    }

    impl FileMetadata for Relabelled {
        fn describe(fields: &mut FieldMapBuilder<Self>) {
            fields.field("Label", |m: &Self| &m.label, |m| &mut m.label);
            fields.nested("Address", |m: &Self| &m.address, |m| &mut m.address).rename("Ship");
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Unaddressed {
        label: String,
        address: Address,
    }

    impl FileMetadata for Unaddressed {
        fn describe(fields: &mut FieldMapBuilder<Self>) {
            fields.field("Label", |m: &Self| &m.label, |m| &mut m.label);
            fields.nested("Address", |m: &Self| &m.address, |m| &mut m.address).ignore();
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Delivery {
        label: String,
        address: Address,
    }

    impl FileMetadata for Delivery {
        fn describe(fields: &mut FieldMapBuilder<Self>) {
            fields.field("Label", |m: &Self| &m.label, |m| &mut m.label);
            fields.nested("Address", |m: &Self| &m.address, |m| &mut m.address).required();
        }
    }

    fn zurich() -> Address {
        Address {
            city: "Zürich".to_string(),
            zip: Some(8001),
        }
    }

    fn codec<T: FileMetadata>() -> MetadataCodec<T> {
        MetadataCodec::new(Arc::new(MetadataFieldMap::<T>::build().unwrap()))
    }

    fn sample() -> TestFile {
        TestFile {
            file_name: Some("Test".to_string()),
            size: 100,
            id: Uuid::new_v4(),
            created_date: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            day: NaiveDate::from_ymd_opt(2024, 1, 1),
            ratio: 0.25,
            published: true,
            address: Address {
                city: "Zürich".to_string(),
                zip: Some(8001),
            },
            ignore: None,
        }
    }

    #[test]
    fn test_serialize_uses_logical_keys() {
        let value = sample();
        let map = codec::<TestFile>().serialize(&value).unwrap();

        assert_eq!(map.get("FileName").map(String::as_str), Some("Test"));
        assert_eq!(map.get("Size").map(String::as_str), Some("100"));
        assert_eq!(
            map.get("CreatedDate").map(String::as_str),
            Some("2024-01-01T00:00:00Z")
        );
        assert_eq!(map.get("Address.City").map(String::as_str), Some("Zürich"));
        assert_eq!(map.get("Address.Zip").map(String::as_str), Some("8001"));
    }

    #[test]
    fn test_round_trip() {
        let codec = codec::<TestFile>();
        let value = sample();
        let restored = codec.deserialize(&codec.serialize(&value).unwrap()).unwrap();
        assert_eq!(restored, value);
    }

    #[test]
    fn test_ignored_field_is_not_stored() {
        let codec = codec::<TestFile>();
        let mut value = sample();
        value.ignore = Some("232".to_string());

        let mut map = codec.serialize(&value).unwrap();
        assert!(!map.contains_key("Ignore"));

        // Whatever a backend holds under the key, the field stays default.
        map.insert("Ignore".to_string(), "stale".to_string());
        assert_eq!(codec.deserialize(&map).unwrap().ignore, None);
    }

    #[test]
    fn test_required_field_missing() {
        let codec = codec::<TestFile>();
        let mut value = sample();
        value.file_name = None;

        let err = codec.serialize(&value).unwrap_err();
        assert!(matches!(err, Error::RequiredField(key) if key == "FileName"));
    }

    #[test]
    fn test_renamed_nested_prefix() {
        let codec = codec::<Relabelled>();
        let value = Relabelled {
            label: "parcel".to_string(),
            address: zurich(),
        };

        let map = codec.serialize(&value).unwrap();
        assert_eq!(map.get("Ship.City").map(String::as_str), Some("Zürich"));
        assert_eq!(map.get("Ship.Zip").map(String::as_str), Some("8001"));
        assert!(!map.keys().any(|k| k.starts_with("Address.")));

        assert_eq!(codec.deserialize(&map).unwrap(), value);
    }

    #[test]
    fn test_ignored_nested_subtree_is_not_stored() {
        let codec = codec::<Unaddressed>();
        let value = Unaddressed {
            label: "parcel".to_string(),
            address: zurich(),
        };

        let mut map = codec.serialize(&value).unwrap();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("Label"));

        map.insert("Address.City".to_string(), "Bern".to_string());
        map.insert("Address.Zip".to_string(), "3000".to_string());
        let restored = codec.deserialize(&map).unwrap();
        assert_eq!(restored.label, "parcel");
        assert_eq!(restored.address, Address::default());
    }

    #[test]
    fn test_required_nested_leaf_empty() {
        let codec = codec::<Delivery>();
        let mut value = Delivery {
            label: "parcel".to_string(),
            address: zurich(),
        };
        assert!(codec.serialize(&value).is_ok());

        value.address.city = String::new();
        let err = codec.serialize(&value).unwrap_err();
        assert!(matches!(err, Error::RequiredField(key) if key == "Address.City"));

        value.address.city = "Bern".to_string();
        value.address.zip = None;
        let err = codec.serialize(&value).unwrap_err();
        assert!(matches!(err, Error::RequiredField(key) if key == "Address.Zip"));
    }

    #[test]
    fn test_required_field_empty_string() {
        let codec = codec::<TestFile>();
        let mut value = sample();
        value.file_name = Some(String::new());

        assert!(matches!(codec.serialize(&value), Err(Error::RequiredField(_))));
    }

    #[test]
    fn test_null_optional_is_omitted() {
        let codec = codec::<TestFile>();
        let mut value = sample();
        value.created_date = None;
        value.address.zip = None;

        let map = codec.serialize(&value).unwrap();
        assert!(!map.contains_key("CreatedDate"));
        assert!(!map.contains_key("Address.Zip"));
    }

    #[test]
    fn test_missing_keys_keep_defaults() {
        let codec = codec::<TestFile>();
        let mut map = MetadataMap::new();
        map.insert("FileName".to_string(), "only-name".to_string());
        map.insert("Unknown".to_string(), "whatever".to_string());

        let value = codec.deserialize(&map).unwrap();
        assert_eq!(value.file_name.as_deref(), Some("only-name"));
        assert_eq!(value.size, 0);
        assert_eq!(value.address, Address::default());
    }

    #[test]
    fn test_malformed_value_is_integration_error() {
        let codec = codec::<TestFile>();
        let mut map = MetadataMap::new();
        map.insert("Size".to_string(), "one hundred".to_string());

        let err = codec.deserialize(&map).unwrap_err();
        assert!(matches!(err, Error::Integration { .. }));
    }

    #[test]
    fn test_compatibility_through_shared_keys() {
        let new_codec = codec::<TestFile>();
        let legacy_codec = codec::<LegacyFile>();

        let legacy = LegacyFile {
            name: "old.txt".to_string(),
            size: 7,
            legacy_flag: true,
        };
        let stored = legacy_codec.serialize(&legacy).unwrap();
        let current = new_codec.deserialize(&stored).unwrap();
        assert_eq!(current.file_name.as_deref(), Some("old.txt"));
        assert_eq!(current.size, 7);
        assert_eq!(current.id, Uuid::nil());
        assert!(!current.published);

        let stored = new_codec.serialize(&sample()).unwrap();
        let back = legacy_codec.deserialize(&stored).unwrap();
        assert_eq!(back.name, "Test");
        assert_eq!(back.size, 100);
        assert!(!back.legacy_flag);
    }

    #[test]
    fn test_header_transport_encodes_text_only() {
        let codec = codec::<TestFile>().with_transport(MetadataTransport::Header);
        let value = sample();

        let map = codec.serialize(&value).unwrap();
        let city = map.get("Address.City").unwrap();
        assert!(city.starts_with(HEX_PREFIX));
        assert!(city.bytes().all(|b| b.is_ascii_graphic()));
        assert_eq!(map.get("Size").map(String::as_str), Some("100"));

        assert_eq!(codec.deserialize(&map).unwrap(), value);
    }

    #[test]
    fn test_decode_header_value_passes_plain_values() {
        assert_eq!(decode_header_value("plain").unwrap(), "plain");
        assert!(decode_header_value("hex:zz").is_err());
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            name in "\\PC{1,40}",
            size in any::<i64>(),
            ratio in any::<f64>().prop_filter("NaN never compares equal", |r| !r.is_nan()),
            published in any::<bool>(),
            city in "\\PC{0,20}",
            zip in proptest::option::of(any::<u32>()),
            header in any::<bool>(),
        ) {
            let transport = if header {
                MetadataTransport::Header
            } else {
                MetadataTransport::Native
            };
            let codec = codec::<TestFile>().with_transport(transport);
            let value = TestFile {
                file_name: Some(name),
                size,
                id: Uuid::new_v4(),
                created_date: None,
                day: None,
                ratio,
                published,
                address: Address { city, zip },
                ignore: None,
            };

            let restored = codec.deserialize(&codec.serialize(&value).unwrap()).unwrap();
            prop_assert_eq!(restored, value);
        }
    }
}
