//! Integrity verification of fetched archives.
//!
//! A mismatch is always fatal. There is no override at this layer, and the
//! pipeline never offers one either.

use pour_schema::{DigestAlgorithm, IntegrityDigest};
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("digest mismatch: expected {expected}, got {actual}")]
    Mismatch { expected: String, actual: String },
}

/// Result of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The bytes hash to the expected digest.
    Verified(IntegrityDigest),
    /// No digest was declared; the caller must flag the installation.
    Unverified,
}

impl Verification {
    pub fn is_unverified(&self) -> bool {
        matches!(self, Self::Unverified)
    }
}

/// Lowercase hex digest of `bytes` under `algorithm`.
pub fn hex_digest(bytes: &[u8], algorithm: DigestAlgorithm) -> String {
    match algorithm {
        DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
        DigestAlgorithm::Sha512 => hex::encode(Sha512::digest(bytes)),
        DigestAlgorithm::Blake3 => blake3::hash(bytes).to_hex().to_string(),
    }
}

/// Check `bytes` against `expected`.
///
/// Hex comparison is case-insensitive. The unverified sentinel skips the
/// check and yields [`Verification::Unverified`].
pub fn verify(bytes: &[u8], expected: &IntegrityDigest) -> Result<Verification, IntegrityError> {
    let IntegrityDigest::Known { algorithm, hex } = expected else {
        return Ok(Verification::Unverified);
    };

    let actual = hex_digest(bytes, *algorithm);
    if actual.eq_ignore_ascii_case(hex) {
        tracing::debug!(%algorithm, "digest verified");
        Ok(Verification::Verified(expected.clone()))
    } else {
        Err(IntegrityError::Mismatch {
            expected: expected.to_string(),
            actual: format!("{algorithm}:{actual}"),
        })
    }
}
