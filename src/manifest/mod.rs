//! Cooked-resource manifests
//!
//! A JSON stand-in for the transform pipeline, used by the CLI and tests:
//!
//! ```json
//! {
//!   "entries": ["/index.html"],
//!   "resources": [
//!     {
//!       "id": "/index.html",
//!       "category": "entry-document",
//!       "content": "<script type=module src=/main.js></script>",
//!       "contentType": "text/html",
//!       "dependencies": ["/main.js"]
//!     },
//!     { "id": "/main.js", "category": "script-module", "hot": { "selfAccept": true } }
//!   ]
//! }
//! ```
//!
//! When `entries` is empty every resource is treated as an entry.

use std::path::Path;

use rustc_hash::FxHashMap as HashMap;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::graph::{HotFlags, ResourceCategory, ResourceId};
use crate::project::{Cook, CookedResource};

/// One resource as written in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestResource {
    pub id: ResourceId,
    #[serde(default)]
    pub category: ResourceCategory,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<ResourceId>,
    #[serde(default)]
    pub hot: HotFlags,
}

impl ManifestResource {
    pub fn to_cooked(&self) -> CookedResource {
        CookedResource {
            id: self.id.clone(),
            category: self.category,
            content: self.content.as_bytes().to_vec(),
            content_type: self.content_type.clone(),
            dependencies: self.dependencies.clone(),
            hot: self.hot.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    #[serde(default)]
    entries: Vec<ResourceId>,
    #[serde(default)]
    resources: Vec<ManifestResource>,
}

/// Pre-cooked resources keyed by id
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: Vec<ResourceId>,
    resources: Vec<ManifestResource>,
    index: HashMap<ResourceId, usize>,
}

impl Manifest {
    /// Parse a manifest from a JSON string
    pub fn load(json: &str) -> Result<Self> {
        let raw: RawManifest =
            serde_json::from_str(json).map_err(|e| Error::Manifest(format!("invalid manifest: {}", e)))?;

        let mut index = HashMap::default();
        for (position, resource) in raw.resources.iter().enumerate() {
            if resource.id.is_empty() {
                return Err(Error::Manifest(format!("resource #{} has an empty id", position)));
            }
            if index.insert(resource.id.clone(), position).is_some() {
                return Err(Error::Manifest(format!("duplicate resource {}", resource.id)));
            }
        }
        for entry in &raw.entries {
            if !index.contains_key(entry) {
                return Err(Error::Manifest(format!("entry {} is not a listed resource", entry)));
            }
        }

        Ok(Self {
            entries: raw.entries,
            resources: raw.resources,
            index,
        })
    }

    /// Read and parse a manifest file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::load(&json)
    }

    /// Declared entries, or every resource when none are declared
    pub fn entries(&self) -> Vec<ResourceId> {
        if self.entries.is_empty() {
            self.resources.iter().map(|r| r.id.clone()).collect()
        } else {
            self.entries.clone()
        }
    }

    pub fn resources(&self) -> &[ManifestResource] {
        &self.resources
    }

    pub fn get(&self, id: &str) -> Option<&ManifestResource> {
        self.index.get(id).map(|&position| &self.resources[position])
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl Cook for Manifest {
    fn cook(&self, id: &ResourceId) -> Result<Option<CookedResource>> {
        Ok(self.get(id).map(ManifestResource::to_cooked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SITE: &str = r#"{
        "entries": ["/index.html"],
        "resources": [
            {
                "id": "/index.html",
                "category": "entry-document",
                "content": "<script src=/main.js></script>",
                "dependencies": ["/main.js"]
            },
            {
                "id": "/main.js",
                "category": "script-module",
                "contentType": "text/javascript",
                "hot": { "selfAccept": true }
            }
        ]
    }"#;

    #[test]
    fn test_load_manifest() {
        let manifest = Manifest::load(SITE).unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.entries(), vec![ResourceId::from("/index.html")]);

        let main = manifest.get("/main.js").unwrap();
        assert_eq!(main.category, ResourceCategory::ScriptModule);
        assert_eq!(main.hot.self_accept, Some(true));
        assert_eq!(main.hot.decline, None);

        let cooked = manifest.cook(&ResourceId::from("/index.html")).unwrap().unwrap();
        assert_eq!(cooked.content, b"<script src=/main.js></script>".to_vec());
        assert_eq!(cooked.dependencies, vec![ResourceId::from("/main.js")]);
        assert!(manifest.cook(&ResourceId::from("/missing.js")).unwrap().is_none());
    }

    #[test]
    fn test_entries_default_to_all_resources() {
        let manifest = Manifest::load(r#"{"resources": [{"id": "/a.css"}, {"id": "/b.png"}]}"#).unwrap();
        assert_eq!(
            manifest.entries(),
            vec![ResourceId::from("/a.css"), ResourceId::from("/b.png")]
        );
        assert_eq!(manifest.get("/a.css").unwrap().category, ResourceCategory::GenericAsset);
    }

    #[test]
    fn test_rejects_bad_manifests() {
        let duplicate = r#"{"resources": [{"id": "/a.js"}, {"id": "/a.js"}]}"#;
        assert!(matches!(Manifest::load(duplicate), Err(Error::Manifest(_))));

        let unknown_entry = r#"{"entries": ["/x.html"], "resources": []}"#;
        assert!(matches!(Manifest::load(unknown_entry), Err(Error::Manifest(_))));

        let empty_id = r#"{"resources": [{"id": ""}]}"#;
        assert!(matches!(Manifest::load(empty_id), Err(Error::Manifest(_))));

        assert!(matches!(Manifest::load("[]"), Err(Error::Manifest(_))));
    }
}
