//! Canonical resource keys
//!
//! Every snapshot, pending refresh, subscription and visibility flag is
//! indexed by a `ResourceKey`. Two spellings of the same repository path must
//! produce the same key, so normalization is purely lexical and never touches
//! the filesystem:
//!
//! - `\` separators become `/`
//! - repeated and trailing separators are collapsed
//! - `.` components are dropped and `..` components are resolved
//! - a Windows drive letter is lowercased (`C:/x` == `c:/x`)

use std::fmt;
use std::path::Path;

use serde::{Serialize, Serializer};

/// Normalized identifier of one repository working tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Normalize a raw path string into a key
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(normalize(raw.as_ref()))
    }

    /// Build a key from a filesystem path
    pub fn from_path(path: &Path) -> Self {
        Self::new(path.to_string_lossy())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key as a path, for handing to git
    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for ResourceKey {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&Path> for ResourceKey {
    fn from(path: &Path) -> Self {
        Self::from_path(path)
    }
}

impl AsRef<str> for ResourceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for ResourceKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

fn normalize(raw: &str) -> String {
    let unified = raw.trim().replace('\\', "/");

    // Split off a drive prefix ("c:") so it is never popped by "..".
    let (drive, rest) = match unified.as_bytes() {
        [letter, b':', ..] if letter.is_ascii_alphabetic() => (
            Some(format!("{}:", (*letter as char).to_ascii_lowercase())),
            &unified[2..],
        ),
        _ => (None, unified.as_str()),
    };

    let absolute = rest.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for component in rest.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let mut out = drive.unwrap_or_default();
    if absolute {
        out.push('/');
    }
    out.push_str(&parts.join("/"));

    if out.is_empty() {
        ".".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separators_are_unified() {
        assert_eq!(ResourceKey::new("/repo//src/"), ResourceKey::new("/repo/src"));
        assert_eq!(
            ResourceKey::new("C:\\work\\repo\\").as_str(),
            "c:/work/repo"
        );
        assert_eq!(ResourceKey::new("c:/work/repo"), ResourceKey::new("C:\\work\\repo"));
    }

    #[test]
    fn test_dot_components_resolve() {
        assert_eq!(ResourceKey::new("/repo/./a/../b").as_str(), "/repo/b");
        assert_eq!(ResourceKey::new("/../repo").as_str(), "/repo");
        assert_eq!(ResourceKey::new("../x/./y").as_str(), "../x/y");
        assert_eq!(ResourceKey::new("a/../..").as_str(), "..");
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(ResourceKey::new("").as_str(), ".");
        assert_eq!(ResourceKey::new("  ./ ").as_str(), ".");
        assert_eq!(ResourceKey::new("/").as_str(), "/");
    }

    #[test]
    fn test_serializes_as_string() {
        let json = serde_json::to_string(&ResourceKey::new("/repo/")).unwrap();
        assert_eq!(json, "\"/repo\"");
    }
}
