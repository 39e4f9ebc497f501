//! Resource nodes and the identifiers that key them

use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::version::Version;

/// Resource identifier (URL-like string)
///
/// Cheap to clone; two ids are equal when their strings are equal.
#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(Arc<str>);

impl ResourceId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl Deref for ResourceId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ResourceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ResourceId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl From<&ResourceId> for ResourceId {
    fn from(id: &ResourceId) -> Self {
        id.clone()
    }
}

/// Kind of resource, drives output placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceCategory {
    /// Top-level HTML document
    EntryDocument,
    /// Script or style extracted from inside a document
    InlineFragment,
    /// Import map document
    ImportMap,
    /// Service worker script (must keep a stable URL)
    ServiceWorker,
    /// Dedicated or shared worker script
    Worker,
    /// ES module script
    ScriptModule,
    /// Anything else: images, fonts, stylesheets, data files
    #[default]
    GenericAsset,
}

impl ResourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntryDocument => "entry-document",
            Self::InlineFragment => "inline-fragment",
            Self::ImportMap => "import-map",
            Self::ServiceWorker => "service-worker",
            Self::Worker => "worker",
            Self::ScriptModule => "script-module",
            Self::GenericAsset => "generic-asset",
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hot-reload declarations reported by the cook step
///
/// Every field is optional: `None` leaves the stored value untouched, so a
/// partial re-cook only overwrites the facets it actually rediscovered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotFlags {
    #[serde(default)]
    pub self_accept: Option<bool>,
    #[serde(default)]
    pub decline: Option<bool>,
    #[serde(default)]
    pub accepted_dependencies: Option<Vec<ResourceId>>,
}

impl HotFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn self_accepting() -> Self {
        Self::new().with_self_accept(true)
    }

    pub fn declining() -> Self {
        Self::new().with_decline(true)
    }

    pub fn with_self_accept(mut self, accept: bool) -> Self {
        self.self_accept = Some(accept);
        self
    }

    pub fn with_decline(mut self, decline: bool) -> Self {
        self.decline = Some(decline);
        self
    }

    pub fn with_accepted<I, T>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ResourceId>,
    {
        self.accepted_dependencies = Some(dependencies.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.self_accept.is_none() && self.decline.is_none() && self.accepted_dependencies.is_none()
    }
}

/// One trackable unit of the build graph
#[derive(Debug, Clone)]
pub struct ResourceNode {
    pub id: ResourceId,
    pub category: ResourceCategory,
    pub content: Vec<u8>,
    pub content_type: Option<String>,
    /// Outgoing edges, in declaration order
    pub(crate) dependencies: Vec<ResourceId>,
    /// Incoming edges
    pub(crate) dependents: BTreeSet<ResourceId>,
    pub(crate) version: Option<Version>,
    pub hot_self_accept: bool,
    pub hot_accepted_dependencies: BTreeSet<ResourceId>,
    pub hot_decline: bool,
}

impl ResourceNode {
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            category: ResourceCategory::default(),
            content: Vec::new(),
            content_type: None,
            dependencies: Vec::new(),
            dependents: BTreeSet::new(),
            version: None,
            hot_self_accept: false,
            hot_accepted_dependencies: BTreeSet::new(),
            hot_decline: false,
        }
    }

    pub fn dependencies(&self) -> &[ResourceId] {
        &self.dependencies
    }

    pub fn dependents(&self) -> &BTreeSet<ResourceId> {
        &self.dependents
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn depends_on(&self, id: &str) -> bool {
        self.dependencies.iter().any(|dep| dep.as_str() == id)
    }

    /// Whether this node absorbs updates coming from `dependency`
    pub fn accepts_update_from(&self, dependency: &str) -> bool {
        self.hot_accepted_dependencies.contains(dependency)
    }

    pub(crate) fn apply_hot_flags(&mut self, flags: &HotFlags) {
        if let Some(accept) = flags.self_accept {
            self.hot_self_accept = accept;
        }
        if let Some(decline) = flags.decline {
            self.hot_decline = decline;
        }
        if let Some(accepted) = &flags.accepted_dependencies {
            self.hot_accepted_dependencies = accepted.iter().cloned().collect();
        }
    }
}
