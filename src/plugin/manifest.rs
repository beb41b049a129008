//! Plugin manifests
//!
//! A manifest is a JSON file next to the plugin's macro files:
//!
//! ```json
//! {
//!   "name": "labels",
//!   "description": "Cross references",
//!   "requires": ["core"],
//!   "macro_files": ["labels.tex"],
//!   "code": "builtin.labels",
//!   "auto_load": true,
//!   "data": {}
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::PluginError;

fn default_auto_load() -> bool {
    true
}

/// Declared shape of a plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Unique plugin name; the file stem when omitted
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Plugins that must be loaded first, in order
    #[serde(default)]
    pub requires: Vec<String>,

    /// Macro file names, relative to the plugin's location
    #[serde(default)]
    pub macro_files: Vec<String>,

    /// Key of the code object in the code registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default = "default_auto_load")]
    pub auto_load: bool,

    /// Configuration handed to the code object as-is
    #[serde(default)]
    pub data: serde_json::Value,
}

impl PluginManifest {
    /// Creates a manifest with defaults
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            requires: Vec::new(),
            macro_files: Vec::new(),
            code: None,
            auto_load: true,
            data: serde_json::Value::Null,
        }
    }

    /// Parses a manifest; `stem` names it if the file does not
    pub fn parse(text: &str, stem: &str, path: &Path) -> Result<Self, PluginError> {
        let mut manifest: PluginManifest =
            serde_json::from_str(text).map_err(|source| PluginError::ManifestParse {
                path: path.to_path_buf(),
                source,
            })?;

        if manifest.name.is_empty() {
            manifest.name = stem.to_string();
        }

        // requires is an ordered set
        let mut seen = std::collections::HashSet::new();
        manifest.requires.retain(|r| seen.insert(r.clone()));

        Ok(manifest)
    }

    pub fn requires(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.requires = names.into_iter().map(Into::into).collect();
        self
    }
}
