//! The install pipeline.
//!
//! `resolve → fetch → verify → install → test → caveats`, recorded in a
//! [`ResolvedInstallation`] that advances one stage at a time. The prefix is
//! only touched by the install stage; a failure before it leaves both the
//! prefix and any previous receipt as they were.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use pour_schema::Formula;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::cache::ArchiveCache;
use crate::caveats::{self, RenderContext};
use crate::checks::{self, TestTarget};
use crate::install::{self, InstallError, PrefixLock};
use crate::io::fetch::{Fetch, FetchError};
use crate::livecheck::{self, ResolveError, ResolvedVersion, SourcePlan, Upstream};
use crate::paths::filename_from_url;
use crate::receipt::{self, ReceiptError, ResolvedInstallation, Stage, Status};
use crate::reporter::Reporter;
use crate::verify::{self, IntegrityError, Verification};

/// How often and how patiently transient fetch failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Fetch failed after {attempts} attempt(s): {source}")]
    Fetch {
        attempts: u32,
        #[source]
        source: FetchError,
    },

    #[error("Integrity check failed: {0}")]
    Integrity(#[from] IntegrityError),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error(transparent)]
    Receipt(#[from] ReceiptError),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl PipelineError {
    /// Process exit code for this kind of failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Integrity(_) => 2,
            Self::Fetch { .. } => 3,
            Self::Resolve(_) => 6,
            Self::Install(_) => 7,
            Self::Receipt(_) | Self::Task(_) => 1,
        }
    }
}

/// A failed attempt: the stage, the record as it stood, and the cause.
#[derive(Error, Debug)]
#[error("{stage} stage failed")]
pub struct PipelineFailure {
    pub stage: Stage,
    /// `None` when resolution failed before a record existed.
    pub record: Option<Box<ResolvedInstallation>>,
    #[source]
    pub error: PipelineError,
}

impl PipelineFailure {
    fn resolve(error: ResolveError) -> Self {
        Self {
            stage: Stage::Resolve,
            record: None,
            error: error.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.error.exit_code()
    }
}

type StageResult<T> = Result<T, (Stage, PipelineError)>;

fn at<E: Into<PipelineError>>(stage: Stage) -> impl FnOnce(E) -> (Stage, PipelineError) {
    move |e| (stage, e.into())
}

pub struct Pipeline {
    fetcher: Arc<dyn Fetch>,
    upstream: Arc<dyn Upstream>,
    reporter: Arc<dyn Reporter>,
    cache: Option<ArchiveCache>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn Fetch>,
        upstream: Arc<dyn Upstream>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            fetcher,
            upstream,
            reporter,
            cache: None,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cache(mut self, cache: ArchiveCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn reporter(&self) -> &Arc<dyn Reporter> {
        &self.reporter
    }

    pub fn upstream(&self) -> &dyn Upstream {
        self.upstream.as_ref()
    }

    /// Resolve the version a formula should install.
    pub async fn resolve(&self, formula: &Formula) -> Result<ResolvedVersion, PipelineFailure> {
        self.reporter.resolving(formula.name());
        let resolved = livecheck::resolve(formula, self.upstream.as_ref())
            .await
            .map_err(PipelineFailure::resolve)?;
        tracing::debug!(
            name = %formula.name(),
            version = %resolved.version,
            tag = %resolved.tag,
            "resolved"
        );
        Ok(resolved)
    }

    /// Resolve and install a formula into `prefix`.
    pub async fn run(
        &self,
        formula: &Formula,
        prefix: &Path,
    ) -> Result<ResolvedInstallation, PipelineFailure> {
        let resolved = self.resolve(formula).await?;
        self.install_resolved(formula, &resolved, prefix).await
    }

    /// Install an already resolved version into `prefix`.
    ///
    /// Returns the completed record. Failing acceptance checks do not fail
    /// the install: the record is complete with `tests_failing` set.
    pub async fn install_resolved(
        &self,
        formula: &Formula,
        resolved: &ResolvedVersion,
        prefix: &Path,
    ) -> Result<ResolvedInstallation, PipelineFailure> {
        let plan = livecheck::plan_source(formula, resolved).map_err(PipelineFailure::resolve)?;
        if let Some(newer) = &plan.outdated {
            self.reporter.warning(&format!(
                "{} pins {} but upstream has {}; update the formula url and digest",
                formula.name(),
                plan.version,
                newer.tag
            ));
        }

        let mut record = ResolvedInstallation::new(
            formula.name().clone(),
            plan.version.clone(),
            plan.tag.clone(),
            plan.url.clone(),
            prefix.to_path_buf(),
        );
        record.is_head = plan.is_head;
        record.unverified = plan.digest.is_unverified();
        record.entries = formula.install().entries().to_vec();

        self.warn_missing_dependencies(formula);

        // Taken by the install stage and held until the receipt is written.
        let mut lock = None;
        match self.stages(formula, &plan, &mut record, &mut lock).await {
            Ok(()) => {
                self.reporter.done(
                    &record.name,
                    &record.version,
                    if record.tests_failing {
                        "installed, tests failing"
                    } else {
                        "installed"
                    },
                    Some(record.size_bytes),
                );
                Ok(record)
            }
            Err((stage, error)) => {
                let touched_prefix = matches!(
                    record.status(),
                    Status::Installed | Status::Tested | Status::Complete
                );
                record.fail(stage, error.to_string());
                if touched_prefix {
                    // The prefix changed, so its receipt must describe it.
                    if let Err(e) = record.save(&receipt::receipt_path(prefix)) {
                        tracing::error!("failed to write receipt: {e}");
                    }
                }
                self.reporter.failed(&record.name, &error.to_string());
                Err(PipelineFailure {
                    stage,
                    record: Some(Box::new(record)),
                    error,
                })
            }
        }
    }

    async fn stages(
        &self,
        formula: &Formula,
        plan: &SourcePlan,
        record: &mut ResolvedInstallation,
        lock: &mut Option<PrefixLock>,
    ) -> StageResult<()> {
        let name = formula.name();

        // Fetch
        let (bytes, from_cache) = match self.cached(formula, plan) {
            Some(bytes) => (bytes, true),
            None => {
                let bytes = self
                    .fetch_with_retry(formula, plan)
                    .await
                    .map_err(at(Stage::Fetch))?;
                (bytes, false)
            }
        };
        record.advance(Status::Fetched).map_err(at(Stage::Fetch))?;

        // Verify
        self.reporter.verifying(name, &plan.version);
        match verify::verify(&bytes, &plan.digest).map_err(at(Stage::Verify))? {
            Verification::Verified(digest) => record.digest = Some(digest.to_string()),
            Verification::Unverified => {
                self.reporter
                    .warning(&format!("{name} has no integrity digest; installing unverified"));
            }
        }
        record.advance(Status::Verified).map_err(at(Stage::Verify))?;
        if !from_cache && plan.cacheable() {
            if let Some(cache) = &self.cache {
                if let Err(e) = cache.put(name.as_str(), plan.version.as_str(), &bytes) {
                    tracing::warn!("failed to cache archive: {e}");
                }
            }
        }

        // Install
        self.reporter.installing(name, &plan.version);
        let install_plan = formula.install().clone();
        let target = record.prefix.clone();
        let held = PrefixLock::acquire(&target).map_err(at(Stage::Install))?;
        let (staged, held) = tokio::task::spawn_blocking(move || {
            install::install(&bytes, &install_plan, &target, &held).map(|staged| (staged, held))
        })
        .await
        .map_err(|e| (Stage::Install, PipelineError::Task(e.to_string())))?
        .map_err(at(Stage::Install))?;
        *lock = Some(held);
        record.entries = staged.entries;
        record.files = staged.files;
        record.size_bytes = staged.size_bytes;
        record.advance(Status::Installed).map_err(at(Stage::Install))?;

        // Test
        let report = self.run_checks(formula, record).await.map_err(at(Stage::Test))?;
        if !report.is_success() {
            self.reporter.warning(&format!(
                "{name}: {} of {} checks failed",
                report.failed.len(),
                report.total()
            ));
        }
        record.tests_failing = !report.is_success();
        record.advance(Status::Tested).map_err(at(Stage::Test))?;

        // Caveats
        let ctx = RenderContext {
            prefix: &record.prefix,
            name: name.as_str(),
            version: record.version.as_str(),
            testpath: None,
        };
        let text = caveats::render(formula.caveats(), &ctx, record.unverified);
        record.caveats = (!text.is_empty()).then_some(text);
        record.installed_at = chrono::Utc::now();
        record.advance(Status::Complete).map_err(at(Stage::Caveats))?;

        record
            .save(&receipt::receipt_path(&record.prefix))
            .map_err(at(Stage::Caveats))?;
        Ok(())
    }

    /// Run the formula's checks against an installed record.
    pub async fn run_checks(
        &self,
        formula: &Formula,
        record: &ResolvedInstallation,
    ) -> Result<checks::TestReport, PipelineError> {
        let plan = formula.test().clone();
        let prefix = record.prefix.clone();
        let name = record.name.clone();
        let version = record.version.clone();
        let reporter = Arc::clone(&self.reporter);

        tokio::task::spawn_blocking(move || {
            let target = TestTarget {
                prefix: &prefix,
                name: name.as_str(),
                version: version.as_str(),
            };
            checks::run_tests(&plan, target, |outcome, passed| {
                reporter.check(&name, &outcome.name, passed, &outcome.diagnostics);
            })
        })
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))
    }

    fn cached(&self, formula: &Formula, plan: &SourcePlan) -> Option<Bytes> {
        if !plan.cacheable() {
            return None;
        }
        self.cache
            .as_ref()?
            .get(formula.name().as_str(), plan.version.as_str(), &plan.digest)
    }

    async fn fetch_with_retry(
        &self,
        formula: &Formula,
        plan: &SourcePlan,
    ) -> Result<Bytes, PipelineError> {
        let name = formula.name();
        let progress = |current: u64, total: Option<u64>| {
            self.reporter.downloading(name, &plan.version, current, total);
        };
        tracing::info!(%name, file = filename_from_url(&plan.url), "downloading");

        let mut attempt = 1;
        loop {
            match self.fetcher.fetch(&plan.url, &self.cancel, &progress).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() && attempt < self.retry.attempts => {
                    let delay = self.retry.delay(attempt);
                    tracing::warn!(%name, attempt, ?delay, "fetch failed, retrying: {e}");
                    tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => {
                            return Err(PipelineError::Fetch {
                                attempts: attempt,
                                source: FetchError::Cancelled,
                            });
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(source) => {
                    return Err(PipelineError::Fetch {
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    fn warn_missing_dependencies(&self, formula: &Formula) {
        for dep in formula.depends_on() {
            if which::which(dep.as_str()).is_err() {
                self.reporter.warning(&format!(
                    "{} depends on '{dep}', which was not found on PATH",
                    formula.name()
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caveats::UNVERIFIED_WARNING;
    use crate::io::extract::tests::tar_gz;
    use crate::io::fetch::Progress;
    use crate::livecheck::tests::FakeUpstream;
    use crate::reporter::NullReporter;
    use async_trait::async_trait;
    use pour_schema::{DigestAlgorithm, FormulaName, Version};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::tempdir;

    /// Serves queued responses, then the last one forever.
    struct FakeFetcher {
        responses: Mutex<Vec<Result<Bytes, FetchError>>>,
        calls: AtomicU32,
    }

    impl FakeFetcher {
        fn new(responses: Vec<Result<Bytes, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: AtomicU32::new(0),
            })
        }

        fn serving(bytes: &[u8]) -> Arc<Self> {
            Self::new(vec![Ok(Bytes::copy_from_slice(bytes))])
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetch for FakeFetcher {
        async fn fetch(
            &self,
            _url: &str,
            cancel: &CancellationToken,
            progress: Progress<'_>,
        ) -> Result<Bytes, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            let mut responses = self.responses.lock().unwrap();
            let next = if responses.len() > 1 {
                responses.remove(0)
            } else {
                match &responses[0] {
                    Ok(b) => Ok(b.clone()),
                    Err(FetchError::HttpStatus(s)) => Err(FetchError::HttpStatus(*s)),
                    Err(e) => Err(FetchError::Unreachable(e.to_string())),
                }
            };
            if let Ok(b) = &next {
                progress(b.len() as u64, Some(b.len() as u64));
            }
            next
        }
    }

    fn archive() -> Vec<u8> {
        tar_gz(&[
            ("git-flow-pro-1.0.0/scripts/install.sh", "#!/bin/sh\necho ok\n", 0o755),
            ("git-flow-pro-1.0.0/README.md", "readme", 0o644),
        ])
    }

    fn sha256(bytes: &[u8]) -> String {
        format!("sha256:{}", verify::hex_digest(bytes, DigestAlgorithm::Sha256))
    }

    fn formula(digest: &str, tests: &str) -> Formula {
        Formula::parse(&format!(
            r#"
name = "git-flow-pro"
description = "Git Flow for Zsh"
homepage = "https://github.com/chornthorn/git-flow-pro"
url = "https://example.com/archive/refs/tags/v1.0.0.tar.gz"
integrity-digest = "{digest}"
license = "MIT"
install = ["scripts"]
caveats = "Run {{{{dir:scripts}}}}/install.sh"

[version-policy]
from-url = true

{tests}
"#
        ))
        .unwrap()
    }

    const PASSING: &str = r#"
[[test]]
name = "script"
executable = "{{dir:scripts}}/install.sh"
"#;

    fn pipeline(fetcher: Arc<FakeFetcher>) -> Pipeline {
        Pipeline::new(
            fetcher,
            Arc::new(FakeUpstream::default()),
            Arc::new(NullReporter),
        )
        .with_retry(RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
        })
    }

    #[tokio::test]
    async fn installs_verified_archive() {
        let home = tempdir().unwrap();
        let prefix = home.path().join("opt/git-flow-pro");
        let archive = archive();
        let f = formula(&sha256(&archive), PASSING);

        let record = pipeline(FakeFetcher::serving(&archive))
            .run(&f, &prefix)
            .await
            .unwrap();

        assert!(record.is_complete());
        assert!(!record.unverified);
        assert!(!record.tests_failing);
        assert_eq!(record.version, "1.0.0");
        assert_eq!(record.digest.as_deref(), Some(sha256(&archive).as_str()));
        assert!(prefix.join("scripts/install.sh").exists());
        assert!(!prefix.join("README.md").exists());
        assert!(
            record
                .caveats
                .as_deref()
                .unwrap()
                .contains(&prefix.join("scripts").display().to_string())
        );

        let saved = ResolvedInstallation::load(&receipt::receipt_path(&prefix))
            .unwrap()
            .unwrap();
        assert_eq!(saved, record);
    }

    #[tokio::test]
    async fn interrupted_fetch_never_verifies() {
        let home = tempdir().unwrap();
        let prefix = home.path().join("opt/git-flow-pro");
        let archive = archive();
        let f = formula(&sha256(&archive), PASSING);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let failure = pipeline(FakeFetcher::serving(&archive))
            .with_cancel(cancel)
            .run(&f, &prefix)
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Fetch);
        assert_eq!(failure.exit_code(), 3);
        let record = failure.record.unwrap();
        assert!(matches!(
            record.status(),
            Status::Failed {
                stage: Stage::Fetch,
                ..
            }
        ));
        assert!(record.digest.is_none());
        assert!(!prefix.exists());
        assert!(!receipt::receipt_path(&prefix).exists());
    }

    #[tokio::test]
    async fn dropped_connection_after_retries_never_verifies() {
        let home = tempdir().unwrap();
        let prefix = home.path().join("opt/git-flow-pro");
        let f = formula(&sha256(&archive()), PASSING);

        let fetcher = FakeFetcher::new(vec![Err(FetchError::Unreachable(
            "connection closed before message completed".into(),
        ))]);
        let failure = pipeline(Arc::clone(&fetcher))
            .run(&f, &prefix)
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Fetch);
        assert_eq!(fetcher.calls(), 3);
        let record = failure.record.unwrap();
        assert!(!record.is_complete());
        assert!(record.digest.is_none());
        assert!(!prefix.exists());
    }

    #[tokio::test]
    async fn digest_mismatch_leaves_prefix_untouched() {
        let home = tempdir().unwrap();
        let prefix = home.path().join("opt/git-flow-pro");
        let f = formula(&sha256(b"something else"), PASSING);

        let failure = pipeline(FakeFetcher::serving(&archive()))
            .run(&f, &prefix)
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Verify);
        assert_eq!(failure.exit_code(), 2);
        assert!(!prefix.exists());
    }

    #[tokio::test]
    async fn unverified_install_is_flagged() {
        let home = tempdir().unwrap();
        let prefix = home.path().join("opt/git-flow-pro");
        let f = formula("YOUR_TARBALL_SHA256", PASSING);

        let record = pipeline(FakeFetcher::serving(&archive()))
            .run(&f, &prefix)
            .await
            .unwrap();

        assert!(record.is_complete());
        assert!(record.unverified);
        assert!(record.digest.is_none());
        assert!(record.caveats.unwrap().starts_with(UNVERIFIED_WARNING));
    }

    #[tokio::test]
    async fn failing_checks_complete_with_flag() {
        let home = tempdir().unwrap();
        let prefix = home.path().join("opt/git-flow-pro");
        let archive = archive();
        let f = formula(
            &sha256(&archive),
            r#"
[[test]]
exists = "{{prefix}}/missing"

[[test]]
exists = "{{prefix}}/scripts"
"#,
        );

        let record = pipeline(FakeFetcher::serving(&archive))
            .run(&f, &prefix)
            .await
            .unwrap();
        assert!(record.is_complete());
        assert!(record.tests_failing);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let home = tempdir().unwrap();
        let prefix = home.path().join("opt/git-flow-pro");
        let archive = archive();
        let f = formula(&sha256(&archive), PASSING);

        let fetcher = FakeFetcher::new(vec![
            Err(FetchError::Unreachable("reset".into())),
            Err(FetchError::HttpStatus(503)),
            Ok(Bytes::from(archive)),
        ]);
        let record = pipeline(Arc::clone(&fetcher)).run(&f, &prefix).await.unwrap();
        assert!(record.is_complete());
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let home = tempdir().unwrap();
        let prefix = home.path().join("opt/git-flow-pro");
        let f = formula("unverified", PASSING);

        let fetcher = FakeFetcher::new(vec![Err(FetchError::HttpStatus(404))]);
        let failure = pipeline(Arc::clone(&fetcher))
            .run(&f, &prefix)
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Stage::Fetch);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn verified_archive_is_served_from_cache() {
        let home = tempdir().unwrap();
        let prefix = home.path().join("opt/git-flow-pro");
        let archive = archive();
        let f = formula(&sha256(&archive), PASSING);
        let cache = ArchiveCache::new(home.path().join("cache"));

        pipeline(FakeFetcher::serving(&archive))
            .with_cache(cache.clone())
            .run(&f, &prefix)
            .await
            .unwrap();
        assert!(cache.entry_path("git-flow-pro", "1.0.0").exists());

        let offline = FakeFetcher::new(vec![Err(FetchError::HttpStatus(404))]);
        let record = pipeline(Arc::clone(&offline))
            .with_cache(cache)
            .run(&f, &prefix)
            .await
            .unwrap();
        assert!(record.is_complete());
        assert_eq!(offline.calls(), 0);
    }

    /// Records, from inside the check stage, whether the prefix was locked.
    #[derive(Default)]
    struct LockObserver {
        prefix: PathBuf,
        seen_locked: Mutex<Vec<bool>>,
    }

    impl Reporter for LockObserver {
        fn section(&self, _: &str) {}
        fn resolving(&self, _: &FormulaName) {}
        fn downloading(&self, _: &FormulaName, _: &Version, _: u64, _: Option<u64>) {}
        fn verifying(&self, _: &FormulaName, _: &Version) {}
        fn installing(&self, _: &FormulaName, _: &Version) {}
        fn check(&self, _: &FormulaName, _: &str, _: bool, _: &str) {
            let locked = matches!(
                PrefixLock::acquire(&self.prefix),
                Err(InstallError::Locked(_))
            );
            self.seen_locked.lock().unwrap().push(locked);
        }
        fn done(&self, _: &FormulaName, _: &Version, _: &str, _: Option<u64>) {}
        fn failed(&self, _: &FormulaName, _: &str) {}
        fn info(&self, _: &str) {}
        fn success(&self, _: &str) {}
        fn warning(&self, _: &str) {}
        fn error(&self, _: &str) {}
    }

    #[tokio::test]
    async fn prefix_stays_locked_until_receipt_is_written() {
        let home = tempdir().unwrap();
        let prefix = home.path().join("opt/git-flow-pro");
        let archive = archive();
        let f = formula(&sha256(&archive), PASSING);
        let observer = Arc::new(LockObserver {
            prefix: prefix.clone(),
            ..LockObserver::default()
        });

        let record = Pipeline::new(
            FakeFetcher::serving(&archive),
            Arc::new(FakeUpstream::default()),
            Arc::clone(&observer) as Arc<dyn Reporter>,
        )
        .run(&f, &prefix)
        .await
        .unwrap();

        assert!(record.is_complete());
        assert_eq!(*observer.seen_locked.lock().unwrap(), vec![true]);
        // Released once the run is over.
        drop(PrefixLock::acquire(&prefix).unwrap());
    }

    #[tokio::test]
    async fn locked_prefix_fails_at_install_and_keeps_receipt() {
        let home = tempdir().unwrap();
        let prefix = home.path().join("opt/git-flow-pro");
        let archive = archive();
        let f = formula(&sha256(&archive), PASSING);
        let first = pipeline(FakeFetcher::serving(&archive))
            .run(&f, &prefix)
            .await
            .unwrap();

        let _held = PrefixLock::acquire(&prefix).unwrap();
        let failure = pipeline(FakeFetcher::serving(&archive))
            .run(&f, &prefix)
            .await
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Install);
        assert_eq!(failure.exit_code(), 7);
        let saved = ResolvedInstallation::load(&receipt::receipt_path(&prefix))
            .unwrap()
            .unwrap();
        assert_eq!(saved, first);
    }

    #[test]
    fn retry_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_millis(1000));
        assert_eq!(policy.delay(3), Duration::from_millis(2000));
    }
}
