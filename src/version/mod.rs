//! Content-addressed resource versions.
//!
//! A version is a BLAKE3 digest over a resource's own bytes followed by, for
//! each dependency in declaration order, either that dependency's version or,
//! when the dependency sits on a cycle back to the resource, its raw content.
//! Folding raw content for back edges is what lets cyclic resources be
//! versioned without waiting on each other.
//!
//! Properties:
//! - Same content and same dependency inputs always give the same version.
//! - Changing a leaf changes every resource that reaches it.
//! - Dependency order matters: `[a, b]` and `[b, a]` hash differently.

mod engine;

use std::fmt;

use serde::{Serialize, Serializer};

pub use engine::{Readiness, VersionEngine, VersionState, DEFAULT_VERSION_TIMEOUT};

const VERSION_SCHEME: u8 = 1;
const TAG_VERSION: u8 = 0;
const TAG_CONTENT: u8 = 1;

/// A 256-bit content hash identifying one revision of a resource.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(pub [u8; 32]);

impl Version {
    /// Full lowercase hex.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Hex prefix of `len` characters, used in output file names.
    pub fn short(&self, len: usize) -> String {
        let mut hex = self.to_hex();
        hex.truncate(len.clamp(1, 64));
        hex
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 64 || !hex.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).ok()?;
            bytes[i] = u8::from_str_radix(pair, 16).ok()?;
        }
        Some(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({})", self.short(12))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// What a dependency contributes to its dependent's version.
#[derive(Debug, Clone, Copy)]
pub enum DependencyInput<'a> {
    /// The dependency's own version
    Version(&'a Version),
    /// The dependency's raw bytes (cycle fallback)
    Content(&'a [u8]),
}

/// Combine a resource's content with its dependency inputs into a version.
pub fn combine<'a, I>(content: &[u8], dependencies: I) -> Version
where
    I: IntoIterator<Item = DependencyInput<'a>>,
{
    let mut hasher = blake3::Hasher::new();
    hasher.update(&[VERSION_SCHEME]);
    write_bytes(&mut hasher, content);

    for input in dependencies {
        match input {
            DependencyInput::Version(version) => {
                hasher.update(&[TAG_VERSION]);
                hasher.update(version.as_bytes());
            }
            DependencyInput::Content(bytes) => {
                hasher.update(&[TAG_CONTENT]);
                write_bytes(&mut hasher, bytes);
            }
        }
    }

    Version(*hasher.finalize().as_bytes())
}

// Length prefix keeps ("ab", "c") and ("a", "bc") apart.
fn write_bytes(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
