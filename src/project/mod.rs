//! Project facade
//!
//! Ties one [`ResourceGraph`](crate::graph::ResourceGraph), its
//! [`VersionEngine`] and an [`OutputNamer`] together behind the operations a
//! build writer and a dev server need:
//!
//! - the cook pipeline feeds [`CookedResource`]s in through [`Project::ingest`]
//! - the build writer asks for [`Project::get_version`] and
//!   [`Project::reserve_output_path`], or runs [`Project::build`]
//! - the dev server reports edits through [`Project::on_resource_changed`]

use std::collections::VecDeque;

use parking_lot::Mutex;
use rustc_hash::FxHashSet as HashSet;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::BuildConfig;
use crate::error::{Error, Result};
use crate::graph::{HotFlags, ResourceCategory, ResourceGraph, ResourceId, SharedGraph};
use crate::hmr::ReloadInstruction;
use crate::naming::{OutputNamer, OutputPath};
use crate::version::{Version, VersionEngine, VersionState};

/// Output of the cook step for one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookedResource {
    pub id: ResourceId,
    pub category: ResourceCategory,
    pub content: Vec<u8>,
    pub content_type: Option<String>,
    /// Already-resolved dependency ids, in source order
    pub dependencies: Vec<ResourceId>,
    pub hot: HotFlags,
}

impl CookedResource {
    pub fn new(id: impl Into<ResourceId>, category: ResourceCategory) -> Self {
        Self {
            id: id.into(),
            category,
            content: Vec::new(),
            content_type: None,
            dependencies: Vec::new(),
            hot: HotFlags::default(),
        }
    }

    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_dependencies<I, T>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ResourceId>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_hot(mut self, hot: HotFlags) -> Self {
        self.hot = hot;
        self
    }
}

/// Source of cooked resources (the transform pipeline)
pub trait Cook {
    /// Cook `id`. `Ok(None)` means the resource is not available; anything
    /// depending on it will stall when versioned.
    fn cook(&self, id: &ResourceId) -> Result<Option<CookedResource>>;
}

/// One written output of a build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildEntry {
    pub id: ResourceId,
    pub category: ResourceCategory,
    pub version: Version,
    pub output: OutputPath,
}

/// A resource graph plus everything needed to version and name it
#[derive(Debug)]
pub struct Project {
    config: BuildConfig,
    engine: VersionEngine,
    namer: Mutex<OutputNamer>,
}

impl Project {
    pub fn new(config: BuildConfig) -> Result<Self> {
        let namer = OutputNamer::new(config.naming_options()?);
        let engine = VersionEngine::with_timeout(
            ResourceGraph::new().into_shared(),
            config.version_timeout(),
        );
        Ok(Self {
            config,
            engine,
            namer: Mutex::new(namer),
        })
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn graph(&self) -> &SharedGraph {
        self.engine.graph()
    }

    pub fn engine(&self) -> &VersionEngine {
        &self.engine
    }

    /// Abort any versioning in progress
    pub fn cancel(&self) {
        self.engine.cancel();
    }

    /// Feed the result of one cook step into the graph.
    ///
    /// Returns resources that lost their last dependent.
    pub fn ingest(&self, cooked: CookedResource) -> Result<Vec<ResourceId>> {
        let CookedResource {
            id,
            category,
            content,
            content_type,
            dependencies,
            hot,
        } = cooked;

        self.graph().lock().set_content(&id, category, content, content_type);
        let disposal_candidates = self.engine.declare_dependencies(&id, &dependencies, &hot)?;
        debug!(resource = %id, %category, dependencies = dependencies.len(), "ingested");
        Ok(disposal_candidates)
    }

    /// Cook `entries` and everything they reach, breadth first.
    ///
    /// Returns the number of resources cooked.
    pub fn cook_all(&self, cook: &dyn Cook, entries: &[ResourceId]) -> Result<usize> {
        let mut queue: VecDeque<ResourceId> = entries.iter().cloned().collect();
        let mut seen: HashSet<ResourceId> = entries.iter().cloned().collect();
        let mut cooked = 0;

        while let Some(id) = queue.pop_front() {
            let Some(resource) = cook.cook(&id)? else {
                debug!(resource = %id, "not available to cook");
                continue;
            };
            for dep in &resource.dependencies {
                if seen.insert(dep.clone()) {
                    queue.push_back(dep.clone());
                }
            }
            self.ingest(resource)?;
            cooked += 1;
        }
        Ok(cooked)
    }

    /// `None` when the graph has never seen `id`
    pub fn get_version(&self, id: &str) -> Option<VersionState> {
        self.engine.version_state(id)
    }

    pub async fn version_all(&self) -> Result<Vec<(ResourceId, Version)>> {
        self.engine.version_all().await
    }

    /// Reserve the output path of `id`, resolving its hash from the current
    /// version.
    pub fn reserve_output_path(&self, id: &str) -> Result<OutputPath> {
        let (resource, category, version) = {
            let graph = self.graph().lock();
            let node = graph
                .get(id)
                .ok_or_else(|| Error::UnknownResource(ResourceId::from(id)))?;
            (node.id.clone(), node.category, node.version().copied())
        };
        self.namer
            .lock()
            .reserve_output_path(&resource, category, version.as_ref())
    }

    /// Version every cooked resource and reserve its output path.
    ///
    /// Fails with the first stalled dependency instead of emitting a
    /// partially versioned build.
    pub async fn build(&self) -> Result<Vec<BuildEntry>> {
        let versions = self.version_all().await?;

        let mut entries = Vec::with_capacity(versions.len());
        for (id, version) in versions {
            let category = self
                .graph()
                .lock()
                .get(&id)
                .map(|node| node.category)
                .ok_or_else(|| Error::UnknownResource(id.clone()))?;
            let output = self.reserve_output_path(&id)?;
            entries.push(BuildEntry {
                id,
                category,
                version,
                output,
            });
        }

        info!(
            out_dir = %self.config.out_dir,
            outputs = entries.len(),
            "build complete"
        );
        Ok(entries)
    }

    /// Record new content for `id` and decide how clients pick it up.
    ///
    /// Versions of `id` and everything above it are invalidated. Returns
    /// `None` when the graph has never seen `id`.
    pub fn on_resource_changed(&self, id: &str, content: Option<Vec<u8>>) -> Option<ReloadInstruction> {
        {
            let mut graph = self.graph().lock();
            let node = graph.get_mut(id)?;
            if let Some(content) = content {
                node.content = content;
            }
        }
        self.engine.invalidate(id);
        self.graph().lock().on_resource_changed(id)
    }

    /// Remove a resource nothing depends on any more.
    ///
    /// Returns resources that lost their last dependent as a result.
    pub fn dispose(&self, id: &str) -> Result<Vec<ResourceId>> {
        let candidates = self.graph().lock().dispose(id)?;
        self.engine.forget(id);
        Ok(candidates)
    }
}
