//! Readiness tracking and version computation.
//!
//! Each node moves through three readiness states:
//! `UnknownDependencies -> DependenciesKnown -> Versioned`. The state lives
//! in a `watch` channel per node, so any number of `compute_version` futures
//! can wait on other nodes without recursion or callback bookkeeping.
//!
//! `compute_version(id)` first waits until everything reachable from `id`
//! has declared its dependencies. It then waits for every dependency to be
//! `Versioned`, except dependencies that lead back to `id` (cycles): those
//! contribute their raw content instead of their version. A node on a cycle
//! also folds in the content of the other members and the versions of
//! whatever the cycle imports from outside itself. Waits that cannot be
//! satisfied end in
//! [`Error::StalledDependency`] after the configured timeout, or in
//! [`Error::Cancelled`] when the engine's cancellation token fires.

use std::collections::BTreeSet;
use std::time::Duration;

use futures::future::try_join_all;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{combine, DependencyInput, Version};
use crate::error::{Error, Result};
use crate::graph::{HotFlags, ResourceGraph, ResourceId, SharedGraph};

/// Default bound on how long one readiness wait may take.
pub const DEFAULT_VERSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Readiness of a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Readiness {
    UnknownDependencies,
    DependenciesKnown,
    Versioned,
}

/// Answer to "what is the version of this resource right now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionState {
    Versioned(Version),
    Pending,
}

impl VersionState {
    pub fn version(&self) -> Option<&Version> {
        match self {
            Self::Versioned(version) => Some(version),
            Self::Pending => None,
        }
    }
}

/// Inputs of one version computation, fixed once every node reachable from
/// the versioned node has declared its dependencies.
///
/// A node on a cycle folds the raw content of the other members and the
/// versions of everything the cycle depends on outside itself, so a change
/// anywhere below the cycle reaches every member.
#[derive(Debug)]
struct VersionPlan {
    /// Direct dependencies in declaration order, flagged when cyclic
    dependencies: Vec<(ResourceId, bool)>,
    /// Other cycle members that are not direct dependencies, sorted
    cycle_members: Vec<ResourceId>,
    /// Dependencies leaving the cycle that are not direct dependencies, sorted
    exits: Vec<ResourceId>,
}

impl VersionPlan {
    /// Nodes that must be `Versioned` before combining
    fn awaited(&self) -> impl Iterator<Item = &ResourceId> {
        self.dependencies
            .iter()
            .filter(|(_, cyclic)| !*cyclic)
            .map(|(dep, _)| dep)
            .chain(self.exits.iter())
    }

    fn cycle_size(&self) -> usize {
        self.dependencies.iter().filter(|(_, cyclic)| *cyclic).count() + self.cycle_members.len()
    }
}

/// Computes versions over a shared [`ResourceGraph`](crate::graph::ResourceGraph).
///
/// The engine is the only writer of node versions. Graph locks are only
/// held for synchronous sections, never across an await.
#[derive(Debug)]
pub struct VersionEngine {
    graph: SharedGraph,
    slots: Mutex<HashMap<ResourceId, watch::Sender<Readiness>>>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl VersionEngine {
    pub fn new(graph: SharedGraph) -> Self {
        Self::with_timeout(graph, DEFAULT_VERSION_TIMEOUT)
    }

    pub fn with_timeout(graph: SharedGraph, timeout: Duration) -> Self {
        Self {
            graph,
            slots: Mutex::new(HashMap::default()),
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned token, e.g. a child of the build's root token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Abort every pending and future readiness wait
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn readiness(&self, id: &str) -> Readiness {
        self.slots
            .lock()
            .get(id)
            .map(|slot| *slot.borrow())
            .unwrap_or(Readiness::UnknownDependencies)
    }

    /// `None` when the graph has never seen `id`
    pub fn version_state(&self, id: &str) -> Option<VersionState> {
        let graph = self.graph.lock();
        let node = graph.get(id)?;
        Some(match node.version() {
            Some(version) if self.readiness(id) == Readiness::Versioned => {
                VersionState::Versioned(*version)
            }
            _ => VersionState::Pending,
        })
    }

    /// Record the dependency set of `id` and mark it `DependenciesKnown`.
    ///
    /// Every (re)declaration invalidates `id` and every node that reaches it,
    /// whatever the readiness of `id`: a dependent in the same cycle may
    /// already have folded in its old content. Returns the disposal
    /// candidates of the edge update.
    pub fn declare_dependencies(
        &self,
        id: &ResourceId,
        dependencies: &[ResourceId],
        hot: &HotFlags,
    ) -> Result<Vec<ResourceId>> {
        let disposal_candidates = self.graph.lock().update_dependencies(id, dependencies, hot)?;

        self.invalidate(id);
        self.transition(id, Readiness::DependenciesKnown);
        Ok(disposal_candidates)
    }

    /// Drop the version of `id` and of every node that reaches it.
    ///
    /// Invalidated nodes fall back to `DependenciesKnown`. Returns the
    /// invalidated ids, sorted.
    pub fn invalidate(&self, id: &str) -> Vec<ResourceId> {
        let mut affected: Vec<ResourceId> = {
            let mut graph = self.graph.lock();
            if !graph.contains(id) {
                return Vec::new();
            }
            let mut affected: Vec<ResourceId> = graph.ancestors(id).into_iter().collect();
            if !affected.iter().any(|a| a.as_str() == id) {
                affected.push(ResourceId::from(id));
            }
            for node in &affected {
                graph.clear_version(node);
            }
            affected
        };
        affected.sort();

        let slots = self.slots.lock();
        for node in &affected {
            if let Some(slot) = slots.get(node) {
                slot.send_if_modified(|state| {
                    if *state == Readiness::Versioned {
                        *state = Readiness::DependenciesKnown;
                        true
                    } else {
                        false
                    }
                });
            }
        }
        debug!(resource = %id, invalidated = affected.len(), "invalidated versions");
        affected
    }

    /// Forget readiness for a node the caller has disposed of.
    ///
    /// Anything still waiting on it fails with a structural error.
    pub fn forget(&self, id: &str) {
        self.slots.lock().remove(id);
    }

    /// Compute (or return the cached) version of `id`.
    pub async fn compute_version(&self, id: &ResourceId) -> Result<Version> {
        self.wait_for(id, id, Readiness::DependenciesKnown).await?;

        if self.readiness(id) == Readiness::Versioned {
            if let Some(version) = self.graph.lock().version(id) {
                return Ok(*version);
            }
        }

        self.wait_for_declarations(id).await?;
        let plan = self.plan(id)?;

        try_join_all(plan.awaited().map(|dep| self.wait_for(id, dep, Readiness::Versioned))).await?;

        let version = {
            let mut graph = self.graph.lock();
            let version = {
                let node = graph
                    .get(id)
                    .ok_or_else(|| Error::structural(format!("{} vanished while versioning", id)))?;
                let mut inputs = Vec::with_capacity(
                    plan.dependencies.len() + plan.cycle_members.len() + plan.exits.len(),
                );
                for (dep, cyclic) in &plan.dependencies {
                    inputs.push(dependency_input(&graph, id, dep, *cyclic)?);
                }
                for member in &plan.cycle_members {
                    inputs.push(dependency_input(&graph, id, member, true)?);
                }
                for exit in &plan.exits {
                    inputs.push(dependency_input(&graph, id, exit, false)?);
                }
                combine(&node.content, inputs)
            };
            graph.set_version(id, version);
            version
        };

        self.transition(id, Readiness::Versioned);
        debug!(
            resource = %id,
            version = %version.short(12),
            cycle = plan.cycle_size(),
            "versioned"
        );
        Ok(version)
    }

    /// Version every node whose dependencies are known.
    ///
    /// Fails on the first stalled or cancelled wait.
    pub async fn version_all(&self) -> Result<Vec<(ResourceId, Version)>> {
        let ids: Vec<ResourceId> = {
            let slots = self.slots.lock();
            let mut ids: Vec<ResourceId> = slots
                .iter()
                .filter(|(_, slot)| *slot.borrow() >= Readiness::DependenciesKnown)
                .map(|(id, _)| id.clone())
                .collect();
            ids.sort();
            ids
        };

        let versions = try_join_all(ids.iter().map(|id| self.compute_version(id))).await?;
        Ok(ids.into_iter().zip(versions).collect())
    }

    /// Wait until every node reachable from `id` has declared its
    /// dependencies, so the cycle `id` sits on is fully known.
    async fn wait_for_declarations(&self, id: &ResourceId) -> Result<()> {
        loop {
            let reachable = self.graph.lock().descendants(id);
            let mut undeclared: Vec<ResourceId> = {
                let slots = self.slots.lock();
                reachable
                    .into_iter()
                    .filter(|node| {
                        slots
                            .get(node)
                            .map_or(true, |slot| *slot.borrow() < Readiness::DependenciesKnown)
                    })
                    .collect()
            };
            if undeclared.is_empty() {
                return Ok(());
            }
            undeclared.sort();
            try_join_all(
                undeclared
                    .iter()
                    .map(|node| self.wait_for(id, node, Readiness::DependenciesKnown)),
            )
            .await?;
        }
    }

    fn plan(&self, id: &ResourceId) -> Result<VersionPlan> {
        let graph = self.graph.lock();
        let node = graph
            .get(id)
            .ok_or_else(|| Error::structural(format!("{} has readiness but no node", id)))?;

        let members = graph.cycle_members(id);
        let cyclic = |dep: &ResourceId| dep == id || members.contains(dep);
        let direct: HashSet<ResourceId> = node.dependencies().iter().cloned().collect();

        let dependencies = node
            .dependencies()
            .iter()
            .map(|dep| (dep.clone(), cyclic(dep)))
            .collect();

        let mut cycle_members: Vec<ResourceId> = members
            .iter()
            .filter(|member| *member != id && !direct.contains(*member))
            .cloned()
            .collect();
        cycle_members.sort();

        let mut exits = BTreeSet::new();
        for member in &members {
            let Some(member_node) = graph.get(member) else {
                continue;
            };
            for dep in member_node.dependencies() {
                if !cyclic(dep) && !direct.contains(dep) {
                    exits.insert(dep.clone());
                }
            }
        }

        Ok(VersionPlan {
            dependencies,
            cycle_members,
            exits: exits.into_iter().collect(),
        })
    }

    fn transition(&self, id: &ResourceId, state: Readiness) {
        let mut slots = self.slots.lock();
        let slot = slots
            .entry(id.clone())
            .or_insert_with(|| watch::channel(Readiness::UnknownDependencies).0);
        let previous = slot.send_replace(state);
        trace!(resource = %id, from = ?previous, to = ?state, "readiness");
    }

    fn subscribe(&self, id: &ResourceId) -> watch::Receiver<Readiness> {
        self.slots
            .lock()
            .entry(id.clone())
            .or_insert_with(|| watch::channel(Readiness::UnknownDependencies).0)
            .subscribe()
    }

    async fn wait_for(&self, waiter: &ResourceId, id: &ResourceId, target: Readiness) -> Result<()> {
        let mut rx = self.subscribe(id);

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!(resource = %waiter, dependency = %id, "versioning cancelled");
                Err(Error::Cancelled { resource: waiter.clone() })
            }
            waited = tokio::time::timeout(self.timeout, rx.wait_for(|state| *state >= target)) => {
                match waited {
                    Ok(Ok(_)) => Ok(()),
                    Ok(Err(_)) => Err(Error::structural(format!(
                        "{} was disposed while {} waited on it",
                        id, waiter
                    ))),
                    Err(_) => {
                        warn!(resource = %waiter, dependency = %id, timeout = ?self.timeout, "dependency stalled");
                        Err(Error::StalledDependency {
                            resource: waiter.clone(),
                            dependency: id.clone(),
                            waited: self.timeout,
                        })
                    }
                }
            }
        }
    }
}

/// Raw content for a cyclic input, otherwise the version (or content when a
/// version is somehow absent).
fn dependency_input<'g>(
    graph: &'g ResourceGraph,
    id: &ResourceId,
    dep: &ResourceId,
    cyclic: bool,
) -> Result<DependencyInput<'g>> {
    let node = graph
        .get(dep)
        .ok_or_else(|| Error::structural(format!("{} depends on missing {}", id, dep)))?;
    Ok(match node.version() {
        Some(version) if !cyclic => DependencyInput::Version(version),
        _ => DependencyInput::Content(&node.content),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ResourceCategory;

    fn id(s: &str) -> ResourceId {
        ResourceId::from(s)
    }

    fn engine() -> VersionEngine {
        VersionEngine::with_timeout(ResourceGraph::new().into_shared(), Duration::from_secs(5))
    }

    fn cook(engine: &VersionEngine, name: &str, content: &str, deps: &[&str]) {
        engine.graph().lock().set_content(
            &id(name),
            ResourceCategory::ScriptModule,
            content,
            Some("text/javascript".to_string()),
        );
        let deps: Vec<ResourceId> = deps.iter().map(|d| id(d)).collect();
        engine.declare_dependencies(&id(name), &deps, &HotFlags::new()).unwrap();
    }

    #[tokio::test]
    async fn test_leaf_version_matches_combine() {
        let engine = engine();
        cook(&engine, "leaf.js", "export default 1", &[]);

        let version = engine.compute_version(&id("leaf.js")).await.unwrap();
        assert_eq!(version, combine(b"export default 1", []));
        assert_eq!(engine.readiness("leaf.js"), Readiness::Versioned);
        assert_eq!(engine.version_state("leaf.js"), Some(VersionState::Versioned(version)));
    }

    #[tokio::test]
    async fn test_dependent_waits_for_dependency() {
        let engine = engine();
        cook(&engine, "main.js", "import './dep.js'", &["dep.js"]);
        cook(&engine, "dep.js", "export {}", &[]);

        let (main_id, dep_id) = (id("main.js"), id("dep.js"));
        let (main, dep) = tokio::join!(
            engine.compute_version(&main_id),
            engine.compute_version(&dep_id),
        );
        let (main, dep) = (main.unwrap(), dep.unwrap());
        assert_eq!(main, combine(b"import './dep.js'", [DependencyInput::Version(&dep)]));
    }

    #[tokio::test]
    async fn test_mutual_cycle_versions_without_deadlock() {
        let engine = engine();
        cook(&engine, "a.js", "import './b.js'", &["b.js"]);
        cook(&engine, "b.js", "import './a.js'", &["a.js"]);

        let versions = engine.version_all().await.unwrap();
        assert_eq!(versions.len(), 2);

        let a = engine.graph().lock().version("a.js").copied().unwrap();
        let b = engine.graph().lock().version("b.js").copied().unwrap();
        assert_eq!(a, combine(b"import './b.js'", [DependencyInput::Content(b"import './a.js'")]));
        assert_eq!(b, combine(b"import './a.js'", [DependencyInput::Content(b"import './b.js'")]));
    }

    #[tokio::test]
    async fn test_self_import_uses_own_content() {
        let engine = engine();
        cook(&engine, "self.js", "import './self.js'", &["self.js"]);
        let version = engine.compute_version(&id("self.js")).await.unwrap();
        assert_eq!(
            version,
            combine(b"import './self.js'", [DependencyInput::Content(b"import './self.js'")])
        );
    }

    #[tokio::test]
    async fn test_cycle_member_folds_what_the_cycle_imports() {
        let engine = engine();
        cook(&engine, "a.js", "import './b.js'", &["b.js"]);
        cook(&engine, "b.js", "import './a.js'; import './leaf.js'", &["a.js", "leaf.js"]);
        cook(&engine, "leaf.js", "export {}", &[]);

        engine.version_all().await.unwrap();
        let leaf = engine.graph().lock().version("leaf.js").copied().unwrap();
        let a = engine.graph().lock().version("a.js").copied().unwrap();
        assert_eq!(
            a,
            combine(
                b"import './b.js'",
                [
                    DependencyInput::Content(b"import './a.js'; import './leaf.js'"),
                    DependencyInput::Version(&leaf),
                ]
            )
        );
    }

    #[tokio::test]
    async fn test_redeclaring_unversioned_node_invalidates_cycle_partner() {
        let engine = engine();
        cook(&engine, "a.js", "import './b.js'", &["b.js"]);
        cook(&engine, "b.js", "import './a.js'", &["a.js"]);
        let before = engine.compute_version(&id("a.js")).await.unwrap();
        assert_eq!(engine.readiness("b.js"), Readiness::DependenciesKnown);

        cook(&engine, "b.js", "import './a.js'; export const b = 2", &["a.js"]);
        assert_eq!(engine.version_state("a.js"), Some(VersionState::Pending));
        assert_ne!(engine.compute_version(&id("a.js")).await.unwrap(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncooked_dependency_stalls() {
        let engine = engine();
        cook(&engine, "main.js", "import './ghost.js'", &["ghost.js"]);

        let err = engine.compute_version(&id("main.js")).await.unwrap_err();
        match err {
            Error::StalledDependency { resource, dependency, .. } => {
                assert_eq!(resource.as_str(), "main.js");
                assert_eq!(dependency.as_str(), "ghost.js");
            }
            other => panic!("expected stall, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancellation_aborts_waiters() {
        let engine = engine();
        cook(&engine, "main.js", "import './ghost.js'", &["ghost.js"]);
        engine.cancel();

        let err = engine.compute_version(&id("main.js")).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_invalidate_resets_ancestors() {
        let engine = engine();
        cook(&engine, "main.js", "import './dep.js'", &["dep.js"]);
        cook(&engine, "dep.js", "export {}", &[]);
        cook(&engine, "side.js", "export {}", &[]);
        engine.version_all().await.unwrap();

        let invalidated = engine.invalidate("dep.js");
        assert_eq!(invalidated, vec![id("dep.js"), id("main.js")]);
        assert_eq!(engine.readiness("main.js"), Readiness::DependenciesKnown);
        assert_eq!(engine.readiness("side.js"), Readiness::Versioned);
        assert_eq!(engine.version_state("main.js"), Some(VersionState::Pending));
        assert!(engine.invalidate("unknown.js").is_empty());
    }

    #[tokio::test]
    async fn test_redeclaring_versioned_node_invalidates_it() {
        let engine = engine();
        cook(&engine, "main.js", "import './a.js'", &["a.js"]);
        cook(&engine, "a.js", "export {}", &[]);
        cook(&engine, "b.js", "export {}", &[]);
        let before = engine.compute_version(&id("a.js")).await.unwrap();
        let main_before = engine.compute_version(&id("main.js")).await.unwrap();

        engine
            .declare_dependencies(&id("main.js"), &[id("a.js"), id("b.js")], &HotFlags::new())
            .unwrap();
        assert_eq!(engine.readiness("main.js"), Readiness::DependenciesKnown);

        let (main_id, b_id) = (id("main.js"), id("b.js"));
        let (main_after, _) = tokio::join!(
            engine.compute_version(&main_id),
            engine.compute_version(&b_id),
        );
        assert_ne!(main_after.unwrap(), main_before);
        assert_eq!(engine.compute_version(&id("a.js")).await.unwrap(), before);
    }

    #[test]
    fn test_unknown_resource_has_no_version_state() {
        let engine = engine();
        assert_eq!(engine.version_state("nope.js"), None);
        assert_eq!(engine.readiness("nope.js"), Readiness::UnknownDependencies);
    }
}
