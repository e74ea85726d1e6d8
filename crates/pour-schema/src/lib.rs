//! Shared types and the formula model for pour.
//!
//! Everything in this crate is pure data: parsing and validating a formula
//! definition, integrity digests, version ordering and the placeholder
//! templates used by caveats and tests. Network and filesystem side effects
//! live in `pour-core`.

pub mod digest;
pub mod formula;
pub mod template;
pub mod types;
pub mod version;

// Re-exports
pub use digest::{DigestAlgorithm, DigestError, IntegrityDigest};
pub use formula::{
    Check, Formula, HeadRef, InstallPlan, LivecheckStrategy, OutputMatcher, ParseError,
    SourceLocator, TestPlan, VersionPolicy,
};
pub use template::{Template, TemplateError, Token};
pub use types::{FormulaName, NameError, Version};
pub use version::NumericVersion;

/// Literal accepted in `integrity-digest` to mark a formula as unverified.
pub const UNVERIFIED_SENTINEL: &str = "unverified";

/// Legacy placeholder left in formulas whose digest was never computed.
///
/// It is read as the same sentinel as [`UNVERIFIED_SENTINEL`].
pub const LEGACY_PLACEHOLDER: &str = "YOUR_TARBALL_SHA256";
