//! Build configuration
//!
//! Parsed from a `trellis.json` file. Every key is optional:
//!
//! ```json
//! {
//!   "outDir": "dist",
//!   "assetsDir": "assets",
//!   "hashLength": 8,
//!   "fileNames": "[name].[hash:8][ext]",
//!   "entryNames": { "/pages/about.html": "about/index.html" },
//!   "unversioned": ["/robots.txt"],
//!   "versionTimeoutMs": 30000
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::graph::ResourceId;
use crate::naming::{FileNameTemplate, NamingOptions, DEFAULT_TEMPLATE, MAX_HASH_LENGTH, MIN_HASH_LENGTH};

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "trellis.json";

/// Build configuration parsed from trellis.json
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildConfig {
    /// Directory output paths are relative to
    pub out_dir: String,
    /// Directory for generic assets, relative to `out_dir`
    pub assets_dir: String,
    /// Hash length for `[hash]` tokens without an explicit length
    pub hash_length: usize,
    /// Template for hashed file names
    pub file_names: String,
    /// Explicit output paths for entry documents
    pub entry_names: BTreeMap<String, String>,
    /// Generic assets that keep their plain name across builds
    pub unversioned: Vec<String>,
    /// How long one resource may wait for a dependency before the build fails
    pub version_timeout_ms: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            out_dir: "dist".to_string(),
            assets_dir: "assets".to_string(),
            hash_length: 8,
            file_names: DEFAULT_TEMPLATE.to_string(),
            entry_names: BTreeMap::new(),
            unversioned: Vec::new(),
            version_timeout_ms: 30_000,
        }
    }
}

impl BuildConfig {
    /// Load a BuildConfig from a JSON string
    pub fn load(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", CONFIG_FILE_NAME, e)))?;
        config.check()?;
        Ok(config)
    }

    /// Load a BuildConfig from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::load(&json)
    }

    pub fn version_timeout(&self) -> Duration {
        Duration::from_millis(self.version_timeout_ms)
    }

    /// Non-fatal problems worth telling the user about
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Ok(template) = FileNameTemplate::parse(&self.file_names) {
            if !template.has_hash() {
                warnings.push(format!(
                    "fileNames {:?} has no [hash]; hashed outputs will not change between builds",
                    self.file_names
                ));
            }
        }
        if self.assets_dir.trim_matches('/').is_empty() {
            warnings.push("assetsDir is empty; assets share the root with scripts".to_string());
        }
        if self.version_timeout_ms < 100 {
            warnings.push(format!(
                "versionTimeoutMs {} is very short; slow cook steps will fail the build",
                self.version_timeout_ms
            ));
        }
        for output in self.entry_names.values() {
            if output.contains("..") {
                warnings.push(format!("entry output {:?} escapes outDir", output));
            }
        }
        warnings
    }

    /// Naming options derived from this config
    pub fn naming_options(&self) -> Result<NamingOptions> {
        Ok(NamingOptions {
            assets_dir: self.assets_dir.clone(),
            template: FileNameTemplate::parse(&self.file_names)?,
            hash_length: self.hash_length,
            entry_names: self
                .entry_names
                .iter()
                .map(|(id, output)| (ResourceId::from(id.as_str()), output.clone()))
                .collect(),
            unversioned: self.unversioned.iter().map(|id| ResourceId::from(id.as_str())).collect(),
        })
    }

    fn check(&self) -> Result<()> {
        if !(MIN_HASH_LENGTH..=MAX_HASH_LENGTH).contains(&self.hash_length) {
            return Err(Error::Config(format!(
                "hashLength {} must be between {} and {}",
                self.hash_length, MIN_HASH_LENGTH, MAX_HASH_LENGTH
            )));
        }
        if self.version_timeout_ms == 0 {
            return Err(Error::Config("versionTimeoutMs must be positive".to_string()));
        }
        FileNameTemplate::parse(&self.file_names)
            .map_err(|e| Error::Config(format!("fileNames: {}", e)))?;
        Ok(())
    }
}
