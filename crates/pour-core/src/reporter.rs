//! Reporter trait for dependency injection
//!
//! This trait allows the engine to report progress and status without
//! being coupled to a specific terminal implementation.

use pour_schema::{FormulaName, Version};

pub trait Reporter: Send + Sync {
    /// Indicates a new section has started (e.g. "Installing").
    fn section(&self, title: &str);

    /// A formula's version is being looked up upstream.
    fn resolving(&self, name: &FormulaName);

    /// Updates the progress of a download.
    fn downloading(&self, name: &FormulaName, version: &Version, current: u64, total: Option<u64>);

    /// Fetched bytes are being checked against the expected digest.
    fn verifying(&self, name: &FormulaName, version: &Version);

    /// The archive is being staged into the prefix.
    fn installing(&self, name: &FormulaName, version: &Version);

    /// One acceptance check finished.
    fn check(&self, name: &FormulaName, check: &str, passed: bool, diagnostics: &str);

    /// Marks a formula operation as successfully completed.
    fn done(&self, name: &FormulaName, version: &Version, detail: &str, size: Option<u64>);

    /// Marks a formula operation as failed with a specific reason.
    fn failed(&self, name: &FormulaName, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a success message.
    fn success(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn resolving(&self, name: &FormulaName) {
        (**self).resolving(name);
    }
    fn downloading(&self, name: &FormulaName, version: &Version, current: u64, total: Option<u64>) {
        (**self).downloading(name, version, current, total);
    }
    fn verifying(&self, name: &FormulaName, version: &Version) {
        (**self).verifying(name, version);
    }
    fn installing(&self, name: &FormulaName, version: &Version) {
        (**self).installing(name, version);
    }
    fn check(&self, name: &FormulaName, check: &str, passed: bool, diagnostics: &str) {
        (**self).check(name, check, passed, diagnostics);
    }
    fn done(&self, name: &FormulaName, version: &Version, detail: &str, size: Option<u64>) {
        (**self).done(name, version, detail, size);
    }
    fn failed(&self, name: &FormulaName, reason: &str) {
        (**self).failed(name, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn success(&self, msg: &str) {
        (**self).success(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn error(&self, msg: &str) {
        (**self).error(msg);
    }
}

/// A no-op reporter for silent operations (e.g., livecheck, testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn resolving(&self, _: &FormulaName) {}
    fn downloading(&self, _: &FormulaName, _: &Version, _: u64, _: Option<u64>) {}
    fn verifying(&self, _: &FormulaName, _: &Version) {}
    fn installing(&self, _: &FormulaName, _: &Version) {}
    fn check(&self, _: &FormulaName, _: &str, _: bool, _: &str) {}
    fn done(&self, _: &FormulaName, _: &Version, _: &str, _: Option<u64>) {}
    fn failed(&self, _: &FormulaName, _: &str) {}
    fn info(&self, _: &str) {}
    fn success(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
}
