//! Scalar conversions between metadata field values and their stored strings.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use uuid::Uuid;

use filestore_common::BoxError;

/// A field type that can be stored as one flat metadata value.
///
/// Conversions are culture-invariant and round-trip exactly:
/// `from_metadata(&to_metadata()?)` yields an equal value.
pub trait MetadataValue: Sized + Send + Sync + 'static {
    /// Whether stored values are free-form text.
    ///
    /// Text values are the only ones that may need encoding for
    /// header-like transports.
    const TEXT: bool = false;

    /// Convert to the stored form; `None` means the value is null.
    fn to_metadata(&self) -> Option<String>;

    /// Parse the stored form back into a value.
    fn from_metadata(value: &str) -> Result<Self, BoxError>;
}

impl MetadataValue for String {
    const TEXT: bool = true;

    fn to_metadata(&self) -> Option<String> {
        Some(self.clone())
    }

    fn from_metadata(value: &str) -> Result<Self, BoxError> {
        Ok(value.to_string())
    }
}

impl MetadataValue for bool {
    fn to_metadata(&self) -> Option<String> {
        Some(self.to_string())
    }

    fn from_metadata(value: &str) -> Result<Self, BoxError> {
        Ok(value.trim().to_ascii_lowercase().parse()?)
    }
}

macro_rules! display_metadata_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl MetadataValue for $ty {
                fn to_metadata(&self) -> Option<String> {
                    Some(self.to_string())
                }

                fn from_metadata(value: &str) -> Result<Self, BoxError> {
                    Ok(value.trim().parse()?)
                }
            }
        )*
    };
}

// Display for floats prints the shortest representation that parses back
// to the same bits.
display_metadata_value!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl MetadataValue for Uuid {
    fn to_metadata(&self) -> Option<String> {
        Some(self.hyphenated().to_string())
    }

    fn from_metadata(value: &str) -> Result<Self, BoxError> {
        Ok(Uuid::parse_str(value.trim())?)
    }
}

impl MetadataValue for DateTime<Utc> {
    fn to_metadata(&self) -> Option<String> {
        Some(self.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    fn from_metadata(value: &str) -> Result<Self, BoxError> {
        Ok(DateTime::parse_from_rfc3339(value.trim())?.with_timezone(&Utc))
    }
}

impl MetadataValue for NaiveDate {
    fn to_metadata(&self) -> Option<String> {
        Some(self.format("%Y-%m-%d").to_string())
    }

    fn from_metadata(value: &str) -> Result<Self, BoxError> {
        Ok(NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")?)
    }
}

impl<V: MetadataValue> MetadataValue for Option<V> {
    const TEXT: bool = V::TEXT;

    fn to_metadata(&self) -> Option<String> {
        self.as_ref().and_then(|value| value.to_metadata())
    }

    fn from_metadata(value: &str) -> Result<Self, BoxError> {
        V::from_metadata(value).map(Some)
    }
}
