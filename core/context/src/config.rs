//! Context configuration and settings files.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use filestore_common::{Error, Result};

/// Collection alias table for one context.
///
/// Maps the logical collection keys used in code to the physical bucket
/// names a provider stores under.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextConfiguration {
    collections: BTreeMap<String, String>,
}

impl ContextConfiguration {
    /// Create an empty alias table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an alias table from `key -> physical name` pairs.
    pub fn from_map<I, K, V>(collections: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut config = Self::new();
        for (key, physical) in collections {
            config.add_collection(key, physical);
        }
        config
    }

    /// Map a logical key to a physical name.
    ///
    /// The first mapping for a key wins; later ones are ignored.
    pub fn add_collection(
        &mut self,
        key: impl Into<String>,
        physical: impl Into<String>,
    ) -> &mut Self {
        self.collections.entry(key.into()).or_insert_with(|| physical.into());
        self
    }

    /// Physical name for a logical key.
    ///
    /// Tries the exact key first, then a case-insensitive match.
    pub fn resolve(&self, key: &str) -> Option<&str> {
        if let Some(physical) = self.collections.get(key) {
            return Some(physical.as_str());
        }
        self.collections
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(key))
            .map(|(_, physical)| physical.as_str())
    }

    /// All mappings, ordered by key.
    pub fn collections(&self) -> impl Iterator<Item = (&str, &str)> {
        self.collections.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of mappings.
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

/// One provider configuration in a settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Provider kind, e.g. `"memory"` or `"folder"`.
    pub kind: String,
    /// Kind-specific options.
    #[serde(default)]
    pub options: Value,
}

/// One named context in a settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSettings {
    /// Name of the provider configuration the context uses.
    pub provider: String,
    /// Collection aliases.
    #[serde(default)]
    pub collections: HashMap<String, String>,
}

impl ContextSettings {
    /// Alias table described by these settings.
    pub fn configuration(&self) -> ContextConfiguration {
        ContextConfiguration::from_map(self.collections.clone())
    }
}

/// Storage settings loaded from JSON.
///
/// ```json
/// {
///   "providers": {
///     "local": {
///       "kind": "folder",
///       "options": { "content_path": "data", "metadata_path": "meta" }
///     }
///   },
///   "contexts": {
///     "uploads": { "provider": "local", "collections": { "Photos": "photos-v2" } }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub providers: BTreeMap<String, ProviderSettings>,
    pub contexts: BTreeMap<String, ContextSettings>,
}

impl StorageSettings {
    /// Serialize settings to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("Cannot encode storage settings: {}", e)))
    }

    /// Deserialize settings from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("Invalid storage settings: {}", e)))
    }
}

/// Read storage settings from a JSON file.
///
/// # Errors
/// - `NotFound` if the file does not exist
/// - `Configuration` if the file is not valid settings JSON
pub fn load_settings(path: impl AsRef<Path>) -> Result<StorageSettings> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(format!("Settings file {}", path.display()))
        } else {
            Error::from_io(e, format!("Failed to read {}", path.display()))
        }
    })?;
    StorageSettings::from_json(&json)
}
