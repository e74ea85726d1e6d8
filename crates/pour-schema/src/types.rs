//! Validated newtypes shared across pour crates.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use thiserror::Error;

use crate::version::NumericVersion;

/// Reasons a formula name is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    /// The name is empty.
    #[error("name must not be empty")]
    Empty,

    /// The name contains a character that is not safe in a path component.
    #[error("name '{name}' contains disallowed character {ch:?}")]
    InvalidChar {
        /// The rejected name.
        name: String,
        /// The first offending character.
        ch: char,
    },

    /// The name starts with a dot or dash, which would hide the prefix or
    /// read as a flag.
    #[error("name '{0}' must not start with '.' or '-'")]
    LeadingChar(String),
}

/// A validated formula name.
///
/// The name doubles as the prefix directory name, so it is restricted to
/// ASCII alphanumerics plus `-`, `_`, `.`, `+` and `@`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FormulaName(String);

impl FormulaName {
    /// Create a new formula name, validating that it is filesystem-safe.
    ///
    /// # Errors
    ///
    /// Returns a [`NameError`] if the name is empty, starts with `.` or `-`,
    /// or contains characters outside the allowed set.
    pub fn new(name: &str) -> Result<Self, NameError> {
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if name.starts_with('.') || name.starts_with('-') {
            return Err(NameError::LeadingChar(name.to_string()));
        }
        if let Some(ch) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+' | '@')))
        {
            return Err(NameError::InvalidChar {
                name: name.to_string(),
                ch,
            });
        }
        Ok(Self(name.to_string()))
    }

    /// Return the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FormulaName {
    type Error = NameError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<FormulaName> for String {
    fn from(name: FormulaName) -> Self {
        name.0
    }
}

impl std::fmt::Display for FormulaName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for FormulaName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for FormulaName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<std::path::Path> for FormulaName {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

impl Borrow<str> for FormulaName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<&str> for FormulaName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A version string as resolved for an installation.
///
/// Numeric versions order semantically (`1.10` > `1.9`); anything else,
/// such as a head branch name, sorts after numeric versions and falls back
/// to lexical order among itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    /// Create a new version from the given string (stored as-is).
    pub fn new(v: &str) -> Self {
        Self(v.to_string())
    }

    /// Return the version string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the numeric form of this version, if it has one.
    pub fn numeric(&self) -> Option<NumericVersion> {
        NumericVersion::parse(&self.0)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Deref for Version {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for Version {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<&str> for Version {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_names() {
        for name in ["git-flow-pro", "python@3.12", "libfoo_2", "c++"] {
            assert!(FormulaName::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_unsafe_names() {
        assert_eq!(FormulaName::new(""), Err(NameError::Empty));
        assert!(matches!(
            FormulaName::new("../etc"),
            Err(NameError::LeadingChar(_))
        ));
        assert!(matches!(
            FormulaName::new("a/b"),
            Err(NameError::InvalidChar { ch: '/', .. })
        ));
        assert!(matches!(
            FormulaName::new("-rf"),
            Err(NameError::LeadingChar(_))
        ));
    }

    #[test]
    fn versions_order_numerically() {
        let mut versions: Vec<Version> = ["1.10.0", "1.9.2", "main", "1.2"]
            .into_iter()
            .map(Version::from)
            .collect();
        versions.sort();
        let sorted: Vec<&str> = versions.iter().map(Version::as_str).collect();
        assert_eq!(sorted, vec!["1.2", "1.9.2", "1.10.0", "main"]);
    }
}
