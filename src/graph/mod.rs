//! Resource Graph
//!
//! The registry of every resource a build or dev server knows about, plus the
//! edges between them. Nodes are created lazily the first time either side of
//! an edge mentions them, and are only ever removed by an explicit
//! [`ResourceGraph::dispose`].
//!
//! Edges are plain id references: `a` lists `b` in its dependencies exactly
//! when `b` lists `a` in its dependents.
//!
//! # Example
//! ```
//! use trellis::graph::{HotFlags, ResourceGraph, ResourceId};
//!
//! let mut graph = ResourceGraph::new();
//! let app = ResourceId::from("src/app.js");
//! let util = ResourceId::from("src/util.js");
//!
//! graph.update_dependencies(&app, &[util.clone()], &HotFlags::new()).unwrap();
//! assert!(graph.get("src/util.js").unwrap().dependents().contains(&app));
//! ```

mod edges;
mod node;

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use tracing::trace;

use crate::version::Version;

pub use node::{HotFlags, ResourceCategory, ResourceId, ResourceNode};

/// Graph handle shared between the versioning engine and its callers
pub type SharedGraph = Arc<Mutex<ResourceGraph>>;

/// Registry of resource nodes keyed by id
#[derive(Debug, Default)]
pub struct ResourceGraph {
    nodes: HashMap<ResourceId, ResourceNode>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap this graph for use by a [`VersionEngine`](crate::version::VersionEngine)
    pub fn into_shared(self) -> SharedGraph {
        Arc::new(Mutex::new(self))
    }

    /// Get the node for `id`, creating an empty one if it does not exist yet
    pub fn get_or_create(&mut self, id: &ResourceId) -> &mut ResourceNode {
        self.nodes.entry(id.clone()).or_insert_with(|| {
            trace!(resource = %id, "materialized node");
            ResourceNode::new(id.clone())
        })
    }

    pub fn get(&self, id: &str) -> Option<&ResourceNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ResourceNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Store the payload produced by the cook step
    pub fn set_content(
        &mut self,
        id: &ResourceId,
        category: ResourceCategory,
        content: impl Into<Vec<u8>>,
        content_type: Option<String>,
    ) -> &mut ResourceNode {
        let node = self.get_or_create(id);
        node.category = category;
        node.content = content.into();
        node.content_type = content_type;
        node
    }

    pub fn version(&self, id: &str) -> Option<&Version> {
        self.get(id).and_then(|node| node.version())
    }

    pub(crate) fn set_version(&mut self, id: &str, version: Version) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.version = Some(version);
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear_version(&mut self, id: &str) -> Option<Version> {
        self.nodes.get_mut(id).and_then(|node| node.version.take())
    }

    /// Every node that transitively depends on `id`, excluding `id` itself
    /// unless it sits on a cycle through its own dependents.
    pub fn ancestors(&self, id: &str) -> HashSet<ResourceId> {
        let mut seen = HashSet::default();
        let mut queue: VecDeque<&ResourceId> = VecDeque::new();

        if let Some(node) = self.nodes.get(id) {
            queue.extend(node.dependents.iter());
        }
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(current) {
                queue.extend(node.dependents.iter().filter(|d| !seen.contains(*d)));
            }
        }
        seen
    }

    /// Every node `id` transitively depends on, excluding `id` itself unless
    /// it sits on a cycle through its own dependencies.
    pub fn descendants(&self, id: &str) -> HashSet<ResourceId> {
        let mut seen = HashSet::default();
        let mut queue: VecDeque<&ResourceId> = VecDeque::new();

        if let Some(node) = self.nodes.get(id) {
            queue.extend(node.dependencies.iter());
        }
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(current) {
                queue.extend(node.dependencies.iter().filter(|d| !seen.contains(*d)));
            }
        }
        seen
    }

    /// The strongly connected component holding `id`: nodes that both reach
    /// `id` and are reached from it. Includes `id` itself only when it sits
    /// on a cycle, and is empty otherwise.
    pub fn cycle_members(&self, id: &str) -> HashSet<ResourceId> {
        let ancestors = self.ancestors(id);
        self.descendants(id)
            .into_iter()
            .filter(|node| ancestors.contains(node))
            .collect()
    }

    /// All nodes, in no particular order
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.values()
    }

    /// All ids, sorted
    pub fn ids(&self) -> Vec<ResourceId> {
        let mut ids: Vec<ResourceId> = self.nodes.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
