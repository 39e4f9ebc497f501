//! Output Naming
//!
//! Turns a resource's category and version into a collision-free output path.
//!
//! Two steps:
//! 1. **Placement**: a fixed table decides the directory and whether the
//!    name carries a content hash (see [`OutputNamer::plan`]).
//! 2. **Reservation**: the plain file name is reserved in a per-directory
//!    registry. A taken name gets a numeric suffix (`logo.png`,
//!    `logo2.png`, `logo3.png`, ...). Registries only grow during a build.
//!
//! Hashed names keep a placeholder until the resource is versioned; see
//! [`PendingOutput::resolve`].
//!
//! | category | directory | hashed |
//! |----------|-----------|--------|
//! | entry document | configured mapping, else root | no |
//! | inline fragment | root, `.inline` before the extension | yes |
//! | import map | root | yes |
//! | service worker | root | no |
//! | worker | root | yes |
//! | script module | root | yes |
//! | generic asset | assets dir | yes, unless listed as unversioned |

mod template;

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::{ResourceCategory, ResourceId};
use crate::version::Version;

pub use template::{FileNameTemplate, Piece, DEFAULT_TEMPLATE, MAX_HASH_LENGTH, MIN_HASH_LENGTH};

/// Per-directory registry of names already handed out
#[derive(Debug, Default)]
pub struct NameRegistry {
    directories: HashMap<String, HashSet<String>>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `desired` in `directory`, or the first free suffixed variant.
    pub fn reserve(&mut self, directory: &str, desired: &str) -> String {
        let names = self.directories.entry(normalize_dir(directory)).or_default();
        if names.insert(desired.to_string()) {
            return desired.to_string();
        }

        let (stem, ext) = split_extension(desired);
        let mut n: u32 = 2;
        loop {
            let candidate = format!("{}{}{}", stem, n, ext);
            if names.insert(candidate.clone()) {
                debug!(directory, desired, reserved = %candidate, "name collision");
                return candidate;
            }
            n += 1;
        }
    }

    pub fn is_reserved(&self, directory: &str, name: &str) -> bool {
        self.directories
            .get(&normalize_dir(directory))
            .is_some_and(|names| names.contains(name))
    }

    /// Total number of reserved names across all directories
    pub fn len(&self) -> usize {
        self.directories.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Options that drive placement
#[derive(Debug, Clone)]
pub struct NamingOptions {
    pub assets_dir: String,
    pub template: FileNameTemplate,
    /// Used for `[hash]` tokens without an explicit length
    pub hash_length: usize,
    /// Explicit output paths for entry documents
    pub entry_names: HashMap<ResourceId, String>,
    /// Generic assets that keep their plain name
    pub unversioned: HashSet<ResourceId>,
}

impl Default for NamingOptions {
    fn default() -> Self {
        Self {
            assets_dir: "assets".to_string(),
            template: FileNameTemplate::default(),
            hash_length: 8,
            entry_names: HashMap::default(),
            unversioned: HashSet::default(),
        }
    }
}

/// Where a resource goes, before reservation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub directory: String,
    pub file_name: String,
    pub hashed: bool,
}

/// Final relative output path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct OutputPath(String);

impl OutputPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutputPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reserved output whose hash may still be unknown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOutput {
    pub resource: ResourceId,
    pub directory: String,
    pieces: Vec<Piece>,
}

impl PendingOutput {
    pub fn is_hashed(&self) -> bool {
        self.pieces.iter().any(|piece| matches!(piece, Piece::Hash(_)))
    }

    /// Fill in the hash. Unhashed outputs resolve without a version.
    pub fn resolve(&self, version: Option<&Version>) -> Result<OutputPath> {
        if self.is_hashed() && version.is_none() {
            return Err(Error::VersionPending(self.resource.clone()));
        }
        let mut path = String::new();
        if !self.directory.is_empty() {
            path.push_str(&self.directory);
            path.push('/');
        }
        for piece in &self.pieces {
            piece.write(&mut path, version);
        }
        Ok(OutputPath(path))
    }
}

impl fmt::Display for PendingOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut name = String::new();
        for piece in &self.pieces {
            piece.write(&mut name, None);
        }
        if self.directory.is_empty() {
            f.write_str(&name)
        } else {
            write!(f, "{}/{}", self.directory, name)
        }
    }
}

/// Output naming engine for one build
#[derive(Debug, Default)]
pub struct OutputNamer {
    registry: NameRegistry,
    options: NamingOptions,
    reserved: HashMap<ResourceId, PendingOutput>,
}

impl OutputNamer {
    pub fn new(options: NamingOptions) -> Self {
        Self {
            registry: NameRegistry::new(),
            options,
            reserved: HashMap::default(),
        }
    }

    pub fn options(&self) -> &NamingOptions {
        &self.options
    }

    pub fn registry(&self) -> &NameRegistry {
        &self.registry
    }

    pub fn reserved(&self, id: &str) -> Option<&PendingOutput> {
        self.reserved.get(id)
    }

    /// Apply the placement table.
    pub fn plan(&self, id: &ResourceId, category: ResourceCategory) -> Placement {
        let file_name = file_name_of(id.as_str());
        let at_root = |file_name: String, hashed: bool| Placement {
            directory: String::new(),
            file_name,
            hashed,
        };

        match category {
            ResourceCategory::EntryDocument => match self.options.entry_names.get(id) {
                Some(mapped) => {
                    let mapped = mapped.trim_start_matches("./").trim_start_matches('/');
                    let (directory, file_name) = match mapped.rsplit_once('/') {
                        Some((dir, name)) => (normalize_dir(dir), name.to_string()),
                        None => (String::new(), mapped.to_string()),
                    };
                    Placement {
                        directory,
                        file_name,
                        hashed: false,
                    }
                }
                None => at_root(file_name, false),
            },
            ResourceCategory::InlineFragment => {
                let (stem, ext) = split_extension(&file_name);
                at_root(format!("{}.inline{}", stem, ext), true)
            }
            ResourceCategory::ImportMap | ResourceCategory::Worker | ResourceCategory::ScriptModule => {
                at_root(file_name, true)
            }
            ResourceCategory::ServiceWorker => at_root(file_name, false),
            ResourceCategory::GenericAsset => Placement {
                directory: normalize_dir(&self.options.assets_dir),
                file_name,
                hashed: !self.options.unversioned.contains(id),
            },
        }
    }

    /// Plan and reserve an output for `id`. Reserving the same resource twice
    /// returns the first reservation.
    pub fn reserve(&mut self, id: &ResourceId, category: ResourceCategory) -> PendingOutput {
        if let Some(existing) = self.reserved.get(id) {
            return existing.clone();
        }

        let placement = self.plan(id, category);
        let name = self.registry.reserve(&placement.directory, &placement.file_name);
        let pieces = if placement.hashed {
            let (stem, ext) = split_extension(&name);
            self.options.template.render(stem, ext, self.options.hash_length)
        } else {
            vec![Piece::Text(name)]
        };

        let pending = PendingOutput {
            resource: id.clone(),
            directory: placement.directory,
            pieces,
        };
        debug!(resource = %id, %category, output = %pending, "reserved output");
        self.reserved.insert(id.clone(), pending.clone());
        pending
    }

    /// Reserve and resolve in one step.
    pub fn reserve_output_path(
        &mut self,
        id: &ResourceId,
        category: ResourceCategory,
        version: Option<&Version>,
    ) -> Result<OutputPath> {
        self.reserve(id, category).resolve(version)
    }
}

fn sanitize_pattern() -> &'static Regex {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("sanitize pattern is valid"))
}

/// File name for an id: its last path segment with the query dropped and
/// unsafe characters replaced.
fn file_name_of(id: &str) -> String {
    let without_query = match id.find('?') {
        Some(pos) => &id[..pos],
        None => id,
    };
    let segment = without_query.rsplit('/').next().unwrap_or(without_query);
    let name = sanitize_pattern().replace_all(segment, "-");
    let name = name.trim_matches('-');
    if name.is_empty() || name.chars().all(|c| c == '.') {
        "index".to_string()
    } else {
        name.to_string()
    }
}

/// Split `name` into stem and extension (with its dot). Leading dots do not
/// start an extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => name.split_at(pos),
        _ => (name, ""),
    }
}

fn normalize_dir(directory: &str) -> String {
    directory
        .trim_start_matches("./")
        .trim_matches('/')
        .to_string()
}
