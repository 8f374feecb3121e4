//! Persistent per-project store: discovered field mappings, the discovery
//! timestamp, and user defaults for custom and system fields.
//!
//! Everything lives in a single `defaults.json` inside the data directory
//! so users can inspect and hand-edit it.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::fields::alias;
use crate::fields::FieldMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Store {
    /// Discovered field metadata, keyed by normalized field name
    #[serde(default)]
    pub field_mappings: FieldMap,

    /// RFC3339 timestamp of the last successful discovery
    #[serde(default)]
    pub field_cache_timestamp: Option<String>,

    /// Remembered values for custom fields, keyed by normalized name
    #[serde(default)]
    pub custom_field_defaults: BTreeMap<String, Value>,

    /// Remembered values for system fields, keyed by wire id
    /// (e.g. "components", "priority", "labels")
    #[serde(default)]
    pub system_field_defaults: BTreeMap<String, Value>,

    #[serde(skip)]
    store_path: PathBuf,
}

impl Store {
    pub fn load(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir).context("Failed to create data directory")?;

        let store_file = data_dir.join("defaults.json");

        if store_file.exists() {
            let contents =
                fs::read_to_string(&store_file).context("Failed to read defaults file")?;
            let mut store: Store =
                serde_json::from_str(&contents).context("Failed to parse defaults file")?;
            store.store_path = data_dir.to_path_buf();
            Ok(store)
        } else {
            Ok(Self {
                store_path: data_dir.to_path_buf(),
                ..Self::default()
            })
        }
    }

    pub fn save(&self) -> Result<()> {
        let store_file = self.store_path.join("defaults.json");
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(store_file, contents).context("Failed to write defaults file")?;
        Ok(())
    }

    /// Look up a stored default for a field name, checking custom defaults
    /// first, then system defaults. Alias spellings resolve to the same entry.
    pub fn default_for(&self, name: &str) -> Option<&Value> {
        alias::field_with_alias(&self.custom_field_defaults, name)
            .or_else(|| alias::field_with_alias(&self.system_field_defaults, name))
    }

    pub fn set_custom_default(&mut self, name: &str, value: Value) {
        self.custom_field_defaults.insert(name.to_string(), value);
    }

    pub fn set_system_default(&mut self, id: &str, value: Value) {
        self.system_field_defaults.insert(id.to_string(), value);
    }

    /// Remove a stored default by name. Returns true if an entry
    /// (under the name itself or an alias) was removed.
    pub fn unset_default(&mut self, name: &str) -> bool {
        if let Some(key) = alias::resolve_key(&self.custom_field_defaults, name) {
            self.custom_field_defaults.remove(&key);
            return true;
        }
        if let Some(key) = alias::resolve_key(&self.system_field_defaults, name) {
            self.system_field_defaults.remove(&key);
            return true;
        }
        false
    }

    /// Replace the field mapping and stamp the discovery time
    pub fn record_mapping(&mut self, mapping: FieldMap) {
        self.field_mappings = mapping;
        self.field_cache_timestamp = Some(Utc::now().to_rfc3339());
    }
}
