//! Numeric version parsing and ordering.
//!
//! Upstream tags come in many spellings (`v1.2.0`, `1.2`, `V1.2.0`). They are
//! compared by their dot-separated numeric components, with missing trailing
//! components treated as zero, so `1.2` and `v1.2.0` are the same version.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

use regex::Regex;

static URL_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)v?(\d+(?:\.\d+)+)").expect("static regex is valid")
});

/// A version made only of numeric dot components, e.g. `1.2.0`.
#[derive(Debug, Clone)]
pub struct NumericVersion(Vec<u64>);

impl NumericVersion {
    /// Parse `1.2.3` or `v1.2.3` (case-insensitive prefix).
    ///
    /// Returns `None` if any component is not a plain unsigned integer.
    pub fn parse(s: &str) -> Option<Self> {
        let s = strip_v(s);
        if s.is_empty() {
            return None;
        }
        let parts = s
            .split('.')
            .map(|p| {
                if p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()) {
                    None
                } else {
                    p.parse::<u64>().ok()
                }
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Self(parts))
    }

    fn significant(&self) -> &[u64] {
        let end = self
            .0
            .iter()
            .rposition(|&c| c != 0)
            .map_or(0, |i| i + 1);
        &self.0[..end]
    }
}

impl Ord for NumericVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for NumericVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for NumericVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NumericVersion {}

impl Hash for NumericVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl std::fmt::Display for NumericVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Strip a single leading `v` or `V` from a tag.
pub fn strip_v(tag: &str) -> &str {
    tag.strip_prefix('v')
        .or_else(|| tag.strip_prefix('V'))
        .unwrap_or(tag)
}

/// Extract a version from the last path segment of an archive URL.
///
/// `.../archive/refs/tags/v1.0.0.tar.gz` yields `1.0.0`.
pub fn version_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.trim_end_matches('/').rsplit('/').next()?;
    URL_VERSION
        .captures(segment)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_prefix() {
        let v = NumericVersion::parse("v1.2.0").unwrap();
        assert_eq!(v, NumericVersion::parse("1.2.0").unwrap());
        assert_eq!(v.to_string(), "1.2.0");
        assert_eq!(NumericVersion::parse("V3").unwrap().to_string(), "3");
        assert!(NumericVersion::parse("1.2-beta").is_none());
        assert!(NumericVersion::parse("1..2").is_none());
        assert!(NumericVersion::parse("v").is_none());
    }

    #[test]
    fn missing_components_are_zero() {
        let a = NumericVersion::parse("1.2").unwrap();
        let b = NumericVersion::parse("v1.2.0").unwrap();
        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn ordering_is_numeric_not_lexical() {
        let v9 = NumericVersion::parse("1.9.0").unwrap();
        let v10 = NumericVersion::parse("1.10.0").unwrap();
        assert!(v10 > v9);
    }

    #[test]
    fn extracts_version_from_archive_urls() {
        assert_eq!(
            version_from_url(
                "https://github.com/chornthorn/git-flow-pro/archive/refs/tags/v1.0.0.tar.gz"
            )
            .as_deref(),
            Some("1.0.0")
        );
        assert_eq!(
            version_from_url("https://example.com/dl/tool-2.14.1.tgz?x=1").as_deref(),
            Some("2.14.1")
        );
        assert_eq!(version_from_url("https://example.com/dl/latest.tar.gz"), None);
    }
}
