//! Error types for the Trellis resource graph

use std::time::Duration;
use thiserror::Error;

use crate::graph::ResourceId;

/// Main error type for graph, versioning and naming operations
///
/// Absence of a resource is never an error (lookups return `Option`), and a
/// declined hot update is a normal outcome reported as a
/// [`ReloadInstruction`](crate::hmr::ReloadInstruction).
#[derive(Error, Debug)]
pub enum Error {
    /// A dependency was declared but never reached the state its dependent waits for
    #[error("StalledDependency: {resource} waited {waited:?} for {dependency}, which was never cooked")]
    StalledDependency {
        resource: ResourceId,
        dependency: ResourceId,
        waited: Duration,
    },

    /// The build was aborted while a version was being computed
    #[error("Cancelled: versioning of {resource} was cancelled")]
    Cancelled { resource: ResourceId },

    /// The graph lost track of a node it had referenced
    #[error("StructuralError: {0}")]
    Structural(String),

    /// An operation required a resource the graph has never seen
    #[error("UnknownResource: {0}")]
    UnknownResource(ResourceId),

    /// A hashed output path was requested before the resource was versioned
    #[error("VersionPending: {0} has no version yet")]
    VersionPending(ResourceId),

    /// Invalid build configuration
    #[error("ConfigError: {0}")]
    Config(String),

    /// Invalid resource manifest
    #[error("ManifestError: {0}")]
    Manifest(String),

    /// Invalid output file name template
    #[error("TemplateError: {0}")]
    Template(String),

    /// IO error
    #[error("IOError: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON error
    #[error("JsonError: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl Error {
    /// Create a structural error
    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural(message.into())
    }

    /// The resource this error should be reported against, if any
    pub fn resource(&self) -> Option<&ResourceId> {
        match self {
            Self::StalledDependency { dependency, .. } => Some(dependency),
            Self::Cancelled { resource } => Some(resource),
            Self::UnknownResource(id) | Self::VersionPending(id) => Some(id),
            _ => None,
        }
    }

    /// Whether the error came from a stuck or aborted readiness wait
    pub fn is_readiness_fault(&self) -> bool {
        matches!(self, Self::StalledDependency { .. } | Self::Cancelled { .. })
    }
}

/// Result type for Trellis operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stalled_dependency_names_the_dependency() {
        let err = Error::StalledDependency {
            resource: ResourceId::from("main.js"),
            dependency: ResourceId::from("missing.js"),
            waited: Duration::from_millis(250),
        };
        let message = err.to_string();
        assert!(message.contains("missing.js"), "got: {}", message);
        assert!(message.contains("main.js"), "got: {}", message);
        assert_eq!(err.resource().map(|id| id.as_str()), Some("missing.js"));
        assert!(err.is_readiness_fault());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "trellis.json");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io { .. }));
        assert!(!err.is_readiness_fault());
        assert!(err.resource().is_none());
    }
}
