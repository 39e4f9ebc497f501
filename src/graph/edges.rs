//! Edge maintenance: diffing a node's dependency set and keeping both edge
//! directions consistent.

use rustc_hash::FxHashSet as HashSet;
use tracing::{debug, trace};

use super::{HotFlags, ResourceGraph, ResourceId};
use crate::error::{Error, Result};

impl ResourceGraph {
    /// Replace the dependency set of `id` with `dependencies`.
    ///
    /// Duplicates are dropped, first occurrence wins. Returns the former
    /// dependencies that no longer have any dependent; they stay in the graph
    /// until the caller disposes of them.
    pub fn update_dependencies(
        &mut self,
        id: &ResourceId,
        dependencies: &[ResourceId],
        hot: &HotFlags,
    ) -> Result<Vec<ResourceId>> {
        let previous = std::mem::take(&mut self.get_or_create(id).dependencies);

        let mut seen = HashSet::default();
        let next: Vec<ResourceId> = dependencies
            .iter()
            .filter(|dep| seen.insert((*dep).clone()))
            .cloned()
            .collect();

        let mut disposal_candidates = Vec::new();
        for removed in previous.iter().filter(|dep| !seen.contains(*dep)) {
            let node = self.nodes.get_mut(removed).ok_or_else(|| {
                Error::structural(format!("{} lists missing dependency {}", id, removed))
            })?;
            node.dependents.remove(id);
            trace!(resource = %id, dependency = %removed, "removed edge");
            if node.dependents.is_empty() {
                disposal_candidates.push(removed.clone());
            }
        }

        for dep in &next {
            self.get_or_create(dep).dependents.insert(id.clone());
        }

        let node = self.get_or_create(id);
        node.dependencies = next;
        node.apply_hot_flags(hot);

        debug!(
            resource = %id,
            dependencies = node.dependencies.len(),
            disposal_candidates = disposal_candidates.len(),
            "updated dependencies"
        );
        Ok(disposal_candidates)
    }

    /// Remove a node that no longer has dependents.
    ///
    /// Its outgoing edges are dropped with it; dependencies left without any
    /// dependent are returned as the next round of disposal candidates.
    pub fn dispose(&mut self, id: &str) -> Result<Vec<ResourceId>> {
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| Error::UnknownResource(ResourceId::from(id)))?;
        if node.dependents.iter().any(|dependent| dependent.as_str() != id) {
            return Err(Error::structural(format!(
                "cannot dispose {}: still required by {} resource(s)",
                id,
                node.dependents.len()
            )));
        }

        let node = match self.nodes.remove(id) {
            Some(node) => node,
            None => return Ok(Vec::new()),
        };

        let mut disposal_candidates = Vec::new();
        for dep in node.dependencies.iter().filter(|dep| dep.as_str() != id) {
            if let Some(dep_node) = self.nodes.get_mut(dep) {
                dep_node.dependents.remove(id);
                if dep_node.dependents.is_empty() {
                    disposal_candidates.push(dep.clone());
                }
            }
        }

        debug!(resource = %id, cascade = disposal_candidates.len(), "disposed node");
        Ok(disposal_candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> ResourceId {
        ResourceId::from(s)
    }

    fn ids(list: &[&str]) -> Vec<ResourceId> {
        list.iter().map(|s| id(s)).collect()
    }

    fn assert_consistent(graph: &ResourceGraph) {
        for node in graph.nodes() {
            for dep in node.dependencies() {
                assert!(
                    graph.get(dep).unwrap().dependents().contains(&node.id),
                    "{} -> {} missing back edge",
                    node.id,
                    dep
                );
            }
            for dependent in node.dependents() {
                assert!(
                    graph.get(dependent).unwrap().depends_on(node.id.as_str()),
                    "{} <- {} missing forward edge",
                    node.id,
                    dependent
                );
            }
        }
    }

    #[test]
    fn test_edges_are_bidirectional() {
        let mut graph = ResourceGraph::new();
        let removed = graph
            .update_dependencies(&id("app.js"), &ids(&["a.js", "b.js"]), &HotFlags::new())
            .unwrap();

        assert!(removed.is_empty());
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.get("app.js").unwrap().dependencies(), &ids(&["a.js", "b.js"])[..]);
        assert_consistent(&graph);
    }

    #[test]
    fn test_duplicate_dependencies_collapse() {
        let mut graph = ResourceGraph::new();
        graph
            .update_dependencies(&id("app.js"), &ids(&["b.js", "a.js", "b.js"]), &HotFlags::new())
            .unwrap();
        assert_eq!(graph.get("app.js").unwrap().dependencies(), &ids(&["b.js", "a.js"])[..]);
    }

    #[test]
    fn test_removing_only_dependent_reports_disposal_candidate() {
        let mut graph = ResourceGraph::new();
        graph
            .update_dependencies(&id("app.js"), &ids(&["x.js", "y.js"]), &HotFlags::new())
            .unwrap();
        graph
            .update_dependencies(&id("other.js"), &ids(&["y.js"]), &HotFlags::new())
            .unwrap();

        let removed = graph
            .update_dependencies(&id("app.js"), &[], &HotFlags::new())
            .unwrap();

        // y.js is still used by other.js
        assert_eq!(removed, ids(&["x.js"]));
        assert!(graph.contains("x.js"), "candidates are reported, not deleted");
        assert!(graph.get("x.js").unwrap().dependents().is_empty());
        assert_consistent(&graph);
    }

    #[test]
    fn test_unchanged_dependencies_report_nothing() {
        let mut graph = ResourceGraph::new();
        let deps = ids(&["a.js"]);
        graph.update_dependencies(&id("app.js"), &deps, &HotFlags::new()).unwrap();
        let removed = graph.update_dependencies(&id("app.js"), &deps, &HotFlags::new()).unwrap();
        assert!(removed.is_empty());
        assert_consistent(&graph);
    }

    #[test]
    fn test_hot_flags_are_stored_partially() {
        let mut graph = ResourceGraph::new();
        graph
            .update_dependencies(
                &id("app.js"),
                &ids(&["a.js"]),
                &HotFlags::self_accepting().with_accepted(["a.js"]),
            )
            .unwrap();
        graph
            .update_dependencies(&id("app.js"), &ids(&["a.js"]), &HotFlags::declining())
            .unwrap();

        let node = graph.get("app.js").unwrap();
        assert!(node.hot_self_accept);
        assert!(node.hot_decline);
        assert!(node.accepts_update_from("a.js"));
    }

    #[test]
    fn test_self_dependency() {
        let mut graph = ResourceGraph::new();
        graph.update_dependencies(&id("a.js"), &ids(&["a.js"]), &HotFlags::new()).unwrap();
        assert!(graph.get("a.js").unwrap().dependents().contains("a.js"));

        let removed = graph.update_dependencies(&id("a.js"), &[], &HotFlags::new()).unwrap();
        assert_eq!(removed, ids(&["a.js"]));
        assert_consistent(&graph);
    }

    #[test]
    fn test_dispose_cascades_candidates() {
        let mut graph = ResourceGraph::new();
        graph.update_dependencies(&id("page.js"), &ids(&["widget.js"]), &HotFlags::new()).unwrap();
        graph.update_dependencies(&id("widget.js"), &ids(&["icon.svg"]), &HotFlags::new()).unwrap();

        let removed = graph.update_dependencies(&id("page.js"), &[], &HotFlags::new()).unwrap();
        assert_eq!(removed, ids(&["widget.js"]));

        let cascade = graph.dispose("widget.js").unwrap();
        assert_eq!(cascade, ids(&["icon.svg"]));
        assert!(!graph.contains("widget.js"));
        assert_consistent(&graph);
    }

    #[test]
    fn test_dispose_refuses_required_node() {
        let mut graph = ResourceGraph::new();
        graph.update_dependencies(&id("page.js"), &ids(&["widget.js"]), &HotFlags::new()).unwrap();

        assert!(matches!(graph.dispose("widget.js"), Err(Error::Structural(_))));
        assert!(matches!(graph.dispose("nope.js"), Err(Error::UnknownResource(_))));
        assert!(graph.contains("widget.js"));
    }
}
