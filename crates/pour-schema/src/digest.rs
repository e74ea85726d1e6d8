//! Integrity digests declared by formulas.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::{LEGACY_PLACEHOLDER, UNVERIFIED_SENTINEL};

/// Errors produced while parsing an integrity digest.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestError {
    /// The algorithm tag before `:` is not supported.
    #[error("unsupported digest algorithm '{0}' (expected sha256, sha512 or blake3)")]
    UnknownAlgorithm(String),

    /// The hex portion has the wrong length for its algorithm.
    #[error("{algorithm} digest must be {expected} hex characters, got {actual}")]
    Length {
        /// Algorithm the digest claims to use.
        algorithm: DigestAlgorithm,
        /// Required number of hex characters.
        expected: usize,
        /// Number of characters found.
        actual: usize,
    },

    /// The hex portion contains non-hex characters.
    #[error("digest contains non-hex characters: '{0}'")]
    NotHex(String),
}

/// Hash algorithms a formula may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestAlgorithm {
    /// SHA-256, the default when no tag is given.
    Sha256,
    /// SHA-512.
    Sha512,
    /// BLAKE3 with the standard 32-byte output.
    Blake3,
}

impl DigestAlgorithm {
    /// Length of the digest in hex characters.
    pub fn hex_len(self) -> usize {
        match self {
            Self::Sha256 | Self::Blake3 => 64,
            Self::Sha512 => 128,
        }
    }

    /// Tag used in the `algo:hex` form.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Blake3 => "blake3",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            "blake3" => Some(Self::Blake3),
            _ => None,
        }
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// The digest a formula expects its source archive to have.
///
/// `Unverified` is an explicit, visible state: the archive is installed
/// without a digest check and every record derived from it is flagged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IntegrityDigest {
    /// A concrete digest; `hex` is stored lowercase.
    Known {
        /// Algorithm used to compute the digest.
        algorithm: DigestAlgorithm,
        /// Lowercase hex encoding of the digest.
        hex: String,
    },
    /// No digest has been computed for this formula yet.
    Unverified,
}

impl IntegrityDigest {
    /// Parse `sha256:<hex>`, `sha512:<hex>`, `blake3:<hex>`, a bare 64-char
    /// hex string (SHA-256), or the unverified sentinel.
    ///
    /// # Errors
    ///
    /// Returns a [`DigestError`] for unknown algorithm tags, wrong lengths or
    /// non-hex characters. Nothing is coerced: a malformed digest is never
    /// read as unverified.
    pub fn parse(s: &str) -> Result<Self, DigestError> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(UNVERIFIED_SENTINEL) || s == LEGACY_PLACEHOLDER {
            return Ok(Self::Unverified);
        }

        let (algorithm, hex) = match s.split_once(':') {
            Some((tag, hex)) => (
                DigestAlgorithm::from_tag(tag)
                    .ok_or_else(|| DigestError::UnknownAlgorithm(tag.to_string()))?,
                hex,
            ),
            None => (DigestAlgorithm::Sha256, s),
        };

        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DigestError::NotHex(s.to_string()));
        }
        if hex.len() != algorithm.hex_len() {
            return Err(DigestError::Length {
                algorithm,
                expected: algorithm.hex_len(),
                actual: hex.len(),
            });
        }

        Ok(Self::Known {
            algorithm,
            hex: hex.to_ascii_lowercase(),
        })
    }

    /// Build a known digest from an already computed hex string.
    ///
    /// # Errors
    ///
    /// Returns a [`DigestError`] if `hex` does not fit `algorithm`.
    pub fn known(algorithm: DigestAlgorithm, hex: &str) -> Result<Self, DigestError> {
        Self::parse(&format!("{}:{hex}", algorithm.tag()))
    }

    /// Whether this is the unverified sentinel.
    pub fn is_unverified(&self) -> bool {
        matches!(self, Self::Unverified)
    }

    /// Algorithm for known digests.
    pub fn algorithm(&self) -> Option<DigestAlgorithm> {
        match self {
            Self::Known { algorithm, .. } => Some(*algorithm),
            Self::Unverified => None,
        }
    }

    /// Lowercase hex for known digests.
    pub fn hex(&self) -> Option<&str> {
        match self {
            Self::Known { hex, .. } => Some(hex),
            Self::Unverified => None,
        }
    }
}

impl std::fmt::Display for IntegrityDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known { algorithm, hex } => write!(f, "{algorithm}:{hex}"),
            Self::Unverified => f.write_str(UNVERIFIED_SENTINEL),
        }
    }
}

impl std::str::FromStr for IntegrityDigest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for IntegrityDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IntegrityDigest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
