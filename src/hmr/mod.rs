//! Hot Update Propagation
//!
//! Decides, when a resource changes, whether a running client can patch
//! itself in place or has to reload the whole page.
//!
//! Starting from the changed resource, the update bubbles up through its
//! dependents until it reaches a **boundary**: a resource that accepts
//! updates to itself, or that lists the resource below it as an accepted
//! dependency.
//!
//! # Example
//! ```text
//! // In widget.js
//! import { render } from './render.js';
//!
//! if (import.meta.hot) {
//!   // render.js changes stop here instead of reloading the page
//!   import.meta.hot.accept('./render.js', (mod) => mod.render());
//! }
//! ```
//!
//! Outcomes:
//! - a decline anywhere on the way up ends propagation with a full reload,
//!   discarding boundaries already found;
//! - revisiting a resource already on the current path is a circular
//!   dependency and also forces a full reload;
//! - a path that reaches a resource with no dependents without meeting a
//!   boundary means nothing accepts the update: full reload;
//! - a dependent edge to a resource the graph no longer holds is reported
//!   as a broken edge: full reload;
//! - otherwise every boundary found is reported once, in discovery order.
//!
//! Dependents are visited in sorted id order, so the result is deterministic.
//! Each resource is walked at most once per change.

use std::fmt;

use rustc_hash::FxHashSet as HashSet;
use serde::Serialize;
use tracing::{debug, warn};

use crate::graph::{ResourceGraph, ResourceId, ResourceNode};

/// Why a change cannot be applied in place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadReason {
    ExplicitDecline,
    CircularDependency,
    NothingAccepts,
    /// A dependent edge points at a resource the graph no longer holds
    BrokenEdge,
}

impl ReloadReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExplicitDecline => "explicit decline",
            Self::CircularDependency => "circular dependency",
            Self::NothingAccepts => "nothing accepts the update",
            Self::BrokenEdge => "broken dependency edge",
        }
    }
}

impl fmt::Display for ReloadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the client should apply an update at a boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateKind {
    JsUpdate,
    CssUpdate,
}

impl UpdateKind {
    fn of(node: &ResourceNode) -> Self {
        let is_css = node
            .content_type
            .as_deref()
            .map(|ct| ct.starts_with("text/css"))
            .unwrap_or_else(|| node.id.as_str().ends_with(".css"));
        if is_css {
            Self::CssUpdate
        } else {
            Self::JsUpdate
        }
    }
}

/// A resource that absorbs an update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotBoundary {
    #[serde(rename = "boundaryId")]
    pub boundary: ResourceId,
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    pub accepted_by: ResourceId,
}

/// What the dev server should tell the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReloadInstruction {
    #[serde(rename_all = "camelCase")]
    FullReload {
        reason: ReloadReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        declined_by: Option<ResourceId>,
        /// Path from the changed resource to where propagation stopped
        chain: Vec<ResourceId>,
    },
    HotReload { updates: Vec<HotBoundary> },
}

impl ReloadInstruction {
    pub fn is_full_reload(&self) -> bool {
        matches!(self, Self::FullReload { .. })
    }

    pub fn updates(&self) -> &[HotBoundary] {
        match self {
            Self::HotReload { updates } => updates,
            Self::FullReload { .. } => &[],
        }
    }

    /// One-line summary for logs and the dev overlay
    pub fn describe(&self) -> String {
        match self {
            Self::FullReload { reason, declined_by, chain } => {
                let path = chain.iter().map(ResourceId::as_str).collect::<Vec<_>>().join(" -> ");
                match declined_by {
                    Some(by) => format!("full reload ({} by {}): {}", reason, by, path),
                    None => format!("full reload ({}): {}", reason, path),
                }
            }
            Self::HotReload { updates } => {
                let boundaries = updates
                    .iter()
                    .map(|u| u.boundary.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("hot update via {}", boundaries)
            }
        }
    }
}

/// Why propagation stopped short of a boundary
struct Rejection {
    reason: ReloadReason,
    declined_by: Option<ResourceId>,
    chain: Vec<ResourceId>,
}

/// Depth-first walk up the dependents of a changed resource.
///
/// A resource whose walk finished without rejection is never walked again:
/// its boundaries are already recorded, so each node and edge is visited
/// once. Only resources on the current path count as circular.
struct Walk<'g> {
    graph: &'g ResourceGraph,
    trace: Vec<ResourceId>,
    on_trace: HashSet<ResourceId>,
    finished: HashSet<ResourceId>,
    boundaries: Vec<HotBoundary>,
}

impl<'g> Walk<'g> {
    fn new(graph: &'g ResourceGraph) -> Self {
        Self {
            graph,
            trace: Vec::new(),
            on_trace: HashSet::default(),
            finished: HashSet::default(),
            boundaries: Vec::new(),
        }
    }

    fn reject(&self, reason: ReloadReason, at: &ResourceId) -> Rejection {
        let mut chain = self.trace.clone();
        chain.push(at.clone());
        Rejection {
            reason,
            declined_by: Some(at.clone()),
            chain,
        }
    }

    fn propagate(&mut self, node: &'g ResourceNode) -> Result<(), Rejection> {
        if node.hot_self_accept {
            self.boundaries.push(HotBoundary {
                boundary: node.id.clone(),
                kind: UpdateKind::of(node),
                accepted_by: node.id.clone(),
            });
            return Ok(());
        }

        self.trace.push(node.id.clone());
        self.on_trace.insert(node.id.clone());

        if node.dependents().is_empty() {
            return Err(Rejection {
                reason: ReloadReason::NothingAccepts,
                declined_by: None,
                chain: self.trace.clone(),
            });
        }

        for dependent_id in node.dependents() {
            let Some(dependent) = self.graph.get(dependent_id) else {
                warn!(resource = %node.id, dependent = %dependent_id, "dangling dependent edge");
                return Err(self.reject(ReloadReason::BrokenEdge, dependent_id));
            };

            if dependent.hot_decline {
                return Err(self.reject(ReloadReason::ExplicitDecline, dependent_id));
            }

            if dependent.accepts_update_from(node.id.as_str()) {
                self.boundaries.push(HotBoundary {
                    boundary: dependent_id.clone(),
                    kind: UpdateKind::of(dependent),
                    accepted_by: node.id.clone(),
                });
                continue;
            }

            if self.on_trace.contains(dependent_id) {
                return Err(self.reject(ReloadReason::CircularDependency, dependent_id));
            }

            if self.finished.contains(dependent_id) {
                continue;
            }

            self.propagate(dependent)?;
        }

        self.trace.pop();
        self.on_trace.remove(&node.id);
        self.finished.insert(node.id.clone());
        Ok(())
    }
}

impl ResourceGraph {
    /// Work out how a change to `id` reaches running clients.
    ///
    /// Returns `None` when the graph has never seen `id`.
    pub fn on_resource_changed(&self, id: &str) -> Option<ReloadInstruction> {
        let node = self.get(id)?;

        // Decline wins over self-accept on the changed resource itself
        let instruction = if node.hot_decline {
            ReloadInstruction::FullReload {
                reason: ReloadReason::ExplicitDecline,
                declined_by: Some(node.id.clone()),
                chain: vec![node.id.clone()],
            }
        } else {
            let mut walk = Walk::new(self);
            match walk.propagate(node) {
                Ok(()) if walk.boundaries.is_empty() => ReloadInstruction::FullReload {
                    reason: ReloadReason::NothingAccepts,
                    declined_by: None,
                    chain: vec![node.id.clone()],
                },
                Ok(()) => ReloadInstruction::HotReload {
                    updates: dedup_boundaries(walk.boundaries),
                },
                Err(Rejection {
                    reason,
                    declined_by,
                    chain,
                }) => ReloadInstruction::FullReload {
                    reason,
                    declined_by,
                    chain,
                },
            }
        };

        if instruction.is_full_reload() {
            warn!(resource = %id, "{}", instruction.describe());
        } else {
            debug!(resource = %id, "{}", instruction.describe());
        }
        Some(instruction)
    }
}

fn dedup_boundaries(boundaries: Vec<HotBoundary>) -> Vec<HotBoundary> {
    let mut seen = HashSet::default();
    boundaries
        .into_iter()
        .filter(|b| seen.insert(b.boundary.clone()))
        .collect()
}
