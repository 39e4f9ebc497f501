//! Trellis: the resource graph behind a web build tool and dev server
//!
//! Trellis tracks every resource a web project is made of (documents, inline
//! fragments, scripts, workers and assets) together with the dependency edges
//! the transform pipeline discovers between them. On top of that graph it
//! provides three services:
//!
//! - **Versioning**: a content version per resource that changes whenever the
//!   resource or anything it transitively depends on changes, including
//!   through import cycles
//! - **Naming**: unique, placement-aware output paths with content hashes
//! - **Hot updates**: deciding whether an edit can be patched into a running
//!   page or needs a full reload
//!
//! # Quick Start
//!
//! ```no_run
//! use trellis::prelude::*;
//!
//! # async fn run() -> trellis::Result<()> {
//! let project = Project::new(BuildConfig::default())?;
//! project.ingest(
//!     CookedResource::new("/index.html", ResourceCategory::EntryDocument)
//!         .with_content("<script type=module src=/main.js></script>")
//!         .with_dependencies(["/main.js"]),
//! )?;
//! project.ingest(
//!     CookedResource::new("/main.js", ResourceCategory::ScriptModule)
//!         .with_content("console.log('hi')")
//!         .with_hot(HotFlags::self_accepting()),
//! )?;
//!
//! for entry in project.build().await? {
//!     println!("{} -> {}", entry.id, entry.output);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Module Overview
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Core** | [`graph`], [`version`], [`error`](Error) |
//! | **Output** | [`naming`], [`project`] |
//! | **Dev server** | [`hmr`] |
//! | **Inputs** | [`config`], [`manifest`] |

pub mod config;
pub mod graph;
pub mod hmr;
pub mod manifest;
pub mod naming;
pub mod prelude;
pub mod project;
pub mod version;

mod error;

pub use error::{Error, Result};
pub use project::{BuildEntry, Cook, CookedResource, Project};

/// Trellis version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
