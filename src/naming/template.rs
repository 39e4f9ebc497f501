//! Output file name templates such as `[name].[hash:8][ext]`.
//!
//! Supported tokens:
//! - `[name]`: the reserved file stem
//! - `[ext]`: the extension including its dot (empty when there is none)
//! - `[hash]` / `[hash:N]`: the first `N` hex characters of the version

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::version::Version;

/// Template used for hashed outputs when none is configured
pub const DEFAULT_TEMPLATE: &str = "[name].[hash:8][ext]";

pub const MIN_HASH_LENGTH: usize = 4;
pub const MAX_HASH_LENGTH: usize = 64;

fn token_pattern() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"\[([a-z]+)(?::(\d+))?\]").expect("token pattern is valid"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Name,
    Ext,
    Hash(Option<usize>),
}

/// A parsed file name template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNameTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl FileNameTemplate {
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut last = 0;

        for caps in token_pattern().captures_iter(source) {
            let whole = caps.get(0).ok_or_else(|| Error::Template(source.to_string()))?;
            if whole.start() > last {
                segments.push(Segment::Literal(source[last..whole.start()].to_string()));
            }
            last = whole.end();

            let length = match caps.get(2) {
                Some(digits) => Some(digits.as_str().parse::<usize>().map_err(|e| {
                    Error::Template(format!("bad length in {}: {}", whole.as_str(), e))
                })?),
                None => None,
            };

            let segment = match (&caps[1], length) {
                ("name", None) => Segment::Name,
                ("ext", None) => Segment::Ext,
                ("hash", Some(len)) if !(MIN_HASH_LENGTH..=MAX_HASH_LENGTH).contains(&len) => {
                    return Err(Error::Template(format!(
                        "hash length {} outside {}..={}",
                        len, MIN_HASH_LENGTH, MAX_HASH_LENGTH
                    )));
                }
                ("hash", len) => Segment::Hash(len),
                (token, _) => {
                    return Err(Error::Template(format!("unknown token {} in {:?}", token, source)));
                }
            };
            segments.push(segment);
        }
        if last < source.len() {
            segments.push(Segment::Literal(source[last..].to_string()));
        }

        if !segments.contains(&Segment::Name) {
            return Err(Error::Template(format!("{:?} must contain [name]", source)));
        }
        if segments.iter().any(|s| matches!(s, Segment::Literal(text) if text.contains('/'))) {
            return Err(Error::Template(format!("{:?} must not contain directories", source)));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn has_hash(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Hash(_)))
    }

    /// Expand everything except the hash, which stays a placeholder until
    /// the resource is versioned.
    pub fn render(&self, stem: &str, ext: &str, default_hash_length: usize) -> Vec<Piece> {
        let mut pieces: Vec<Piece> = Vec::with_capacity(self.segments.len());
        let push_text = |pieces: &mut Vec<Piece>, text: &str| match pieces.last_mut() {
            Some(Piece::Text(existing)) => existing.push_str(text),
            _ => pieces.push(Piece::Text(text.to_string())),
        };

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => push_text(&mut pieces, text),
                Segment::Name => push_text(&mut pieces, stem),
                Segment::Ext => push_text(&mut pieces, ext),
                Segment::Hash(len) => pieces.push(Piece::Hash(len.unwrap_or(default_hash_length))),
            }
        }
        pieces
    }
}

impl Default for FileNameTemplate {
    fn default() -> Self {
        Self {
            source: DEFAULT_TEMPLATE.to_string(),
            segments: vec![
                Segment::Name,
                Segment::Literal(".".to_string()),
                Segment::Hash(Some(8)),
                Segment::Ext,
            ],
        }
    }
}

impl fmt::Display for FileNameTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Part of a rendered file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Text(String),
    /// Placeholder for the first `n` hex characters of the version
    Hash(usize),
}

impl Piece {
    pub(crate) fn write(&self, out: &mut String, version: Option<&Version>) {
        match (self, version) {
            (Piece::Text(text), _) => out.push_str(text),
            (Piece::Hash(len), Some(version)) => out.push_str(&version.short(*len)),
            (Piece::Hash(len), None) => {
                out.push_str("[hash:");
                out.push_str(&len.to_string());
                out.push(']');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::combine;

    fn render_with(template: &FileNameTemplate, version: Option<&Version>) -> String {
        let mut out = String::new();
        for piece in template.render("logo", ".png", 8) {
            piece.write(&mut out, version);
        }
        out
    }

    #[test]
    fn test_parse_default_template() {
        let parsed = FileNameTemplate::parse(DEFAULT_TEMPLATE).unwrap();
        assert_eq!(parsed, FileNameTemplate::default());
        assert!(parsed.has_hash());
    }

    #[test]
    fn test_render_placeholder_then_version() {
        let template = FileNameTemplate::parse("[name]-[hash][ext]").unwrap();
        assert_eq!(render_with(&template, None), "logo-[hash:8].png");

        let version = combine(b"png bytes", []);
        assert_eq!(
            render_with(&template, Some(&version)),
            format!("logo-{}.png", version.short(8))
        );
    }

    #[test]
    fn test_explicit_hash_length() {
        let template = FileNameTemplate::parse("[name].[hash:12][ext]").unwrap();
        let pieces = template.render("app", ".js", 8);
        assert_eq!(
            pieces,
            vec![
                Piece::Text("app.".to_string()),
                Piece::Hash(12),
                Piece::Text(".js".to_string())
            ]
        );
    }

    #[test]
    fn test_rejects_bad_templates() {
        assert!(matches!(FileNameTemplate::parse("[hash][ext]"), Err(Error::Template(_))));
        assert!(matches!(FileNameTemplate::parse("[name].[sha][ext]"), Err(Error::Template(_))));
        assert!(matches!(FileNameTemplate::parse("[name].[hash:2][ext]"), Err(Error::Template(_))));
        assert!(matches!(FileNameTemplate::parse("[name][ext:3]"), Err(Error::Template(_))));
        assert!(matches!(FileNameTemplate::parse("out/[name][ext]"), Err(Error::Template(_))));
    }

    #[test]
    fn test_template_without_hash() {
        let template = FileNameTemplate::parse("[name][ext]").unwrap();
        assert!(!template.has_hash());
        assert_eq!(render_with(&template, None), "logo.png");
    }
}
