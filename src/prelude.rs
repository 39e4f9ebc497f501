//! Prelude module for convenient imports
//!
//! ```no_run
//! use trellis::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let project = Project::new(BuildConfig::default())?;
//!     project.ingest(CookedResource::new("/logo.png", ResourceCategory::GenericAsset))?;
//!     Ok(())
//! }
//! ```

// Graph
pub use crate::graph::{HotFlags, ResourceCategory, ResourceGraph, ResourceId, ResourceNode};

// Error handling
pub use crate::error::{Error, Result};

// Versioning
pub use crate::version::{Readiness, Version, VersionEngine, VersionState};

// Output naming
pub use crate::naming::{FileNameTemplate, OutputNamer, OutputPath};

// Hot updates
pub use crate::hmr::{HotBoundary, ReloadInstruction, ReloadReason, UpdateKind};

// Project facade
pub use crate::config::BuildConfig;
pub use crate::manifest::Manifest;
pub use crate::project::{BuildEntry, Cook, CookedResource, Project};
