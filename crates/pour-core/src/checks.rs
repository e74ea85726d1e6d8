//! Acceptance test runner.
//!
//! Every check runs regardless of earlier failures, so the report lists all
//! problems at once. Commands run in a scratch directory shared by the checks
//! of one run, with `PREFIX` pointing at the installed prefix.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use pour_schema::{Check, OutputMatcher, TestPlan};
use wait_timeout::ChildExt;

use crate::caveats::RenderContext;

/// Timeout for a command check that does not declare its own.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(60);

/// How long to keep reading output after the command exits. Background
/// processes it started may hold the pipes open indefinitely.
const PIPE_GRACE: Duration = Duration::from_secs(2);

/// Longest stdout/stderr excerpt kept in a failure report.
const MAX_DIAGNOSTIC_BYTES: usize = 4096;

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub name: String,
    /// Empty on success; what went wrong otherwise.
    pub diagnostics: String,
}

/// Results of a full test plan run, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestReport {
    pub passed: Vec<CheckOutcome>,
    pub failed: Vec<CheckOutcome>,
}

impl TestReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.passed.len() + self.failed.len()
    }
}

/// Identity of the installation under test.
#[derive(Debug, Clone, Copy)]
pub struct TestTarget<'a> {
    pub prefix: &'a Path,
    pub name: &'a str,
    pub version: &'a str,
}

/// Run every check in `plan` against `target`.
///
/// `on_check` is invoked after each check with its name, result and
/// diagnostics, so callers can stream progress.
pub fn run_tests(
    plan: &TestPlan,
    target: TestTarget<'_>,
    mut on_check: impl FnMut(&CheckOutcome, bool),
) -> TestReport {
    let mut report = TestReport::default();
    let scratch = tempfile::Builder::new().prefix("pour-test-").tempdir();

    for check in plan.checks() {
        let result = match &scratch {
            Ok(dir) => {
                let ctx = RenderContext {
                    prefix: target.prefix,
                    name: target.name,
                    version: target.version,
                    testpath: Some(dir.path()),
                };
                run_check(check, &ctx, dir.path())
            }
            Err(e) => Err(format!("could not create test directory: {e}")),
        };

        let passed = result.is_ok();
        let outcome = CheckOutcome {
            name: check.name().to_string(),
            diagnostics: result.err().unwrap_or_default(),
        };
        tracing::debug!(check = %outcome.name, passed, "check finished");
        on_check(&outcome, passed);
        if passed {
            report.passed.push(outcome);
        } else {
            report.failed.push(outcome);
        }
    }
    report
}

fn resolve(testpath: &Path, rendered: &str) -> PathBuf {
    // Relative paths are relative to the scratch directory.
    testpath.join(rendered)
}

fn run_check(check: &Check, ctx: &RenderContext<'_>, testpath: &Path) -> Result<(), String> {
    match check {
        Check::PathExists { path, .. } => {
            let path = resolve(testpath, &ctx.render(path));
            if std::fs::symlink_metadata(&path).is_ok() {
                Ok(())
            } else {
                Err(format!("{} does not exist", path.display()))
            }
        }
        Check::Executable { path, .. } => {
            let path = resolve(testpath, &ctx.render(path));
            let meta = std::fs::metadata(&path)
                .map_err(|e| format!("{}: {e}", path.display()))?;
            if is_executable(&meta) {
                Ok(())
            } else {
                Err(format!("{} is not executable", path.display()))
            }
        }
        Check::Command {
            argv,
            expect_status,
            expect_output,
            timeout,
            ..
        } => {
            let argv: Vec<String> = argv.iter().map(|a| ctx.render(a)).collect();
            run_command(
                &argv,
                ctx.prefix,
                testpath,
                timeout.unwrap_or(DEFAULT_CHECK_TIMEOUT),
                *expect_status,
                expect_output.as_ref(),
            )
        }
    }
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.is_file() && meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    meta.is_file()
}

fn run_command(
    argv: &[String],
    prefix: &Path,
    testpath: &Path,
    timeout: Duration,
    expect_status: Option<i32>,
    expect_output: Option<&OutputMatcher>,
) -> Result<(), String> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| "empty command".to_string())?;

    let mut child = Command::new(program)
        .args(args)
        .current_dir(testpath)
        .env("PREFIX", prefix)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("failed to run {program}: {e}"))?;

    // Drain pipes on their own threads so a chatty child cannot block on a
    // full pipe while we wait for it.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match child.wait_timeout(timeout) {
        Ok(Some(status)) => status,
        Ok(None) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(format!(
                "`{}` timed out after {}s",
                argv.join(" "),
                timeout.as_secs()
            ));
        }
        Err(e) => return Err(format!("failed to wait for {program}: {e}")),
    };
    let stdout = stdout.finish();
    let stderr = stderr.finish();

    let mut problems = Vec::new();
    if let Some(expected) = expect_status {
        if status.code() != Some(expected) {
            problems.push(format!("exit status {status} (expected {expected})"));
        }
    }
    match expect_output {
        Some(OutputMatcher::Exact(want)) if stdout.trim() != want.trim() => {
            problems.push(format!("output {:?} != expected {:?}", stdout.trim(), want.trim()));
        }
        Some(OutputMatcher::Contains(want)) if !stdout.contains(want.as_str()) => {
            problems.push(format!("output does not contain {want:?}"));
        }
        _ => {}
    }

    if problems.is_empty() {
        return Ok(());
    }
    let mut msg = format!("`{}`: {}", argv.join(" "), problems.join("; "));
    for (label, text) in [("stdout", &stdout), ("stderr", &stderr)] {
        let text = text.trim();
        if !text.is_empty() {
            msg.push_str(&format!("\n{label}:\n{}", excerpt(text)));
        }
    }
    Err(msg)
}

/// Output collected from one pipe by a reader thread.
struct Drain {
    buf: Arc<Mutex<Vec<u8>>>,
    done: mpsc::Receiver<()>,
}

impl Drain {
    /// Whatever arrived, once the pipe closes or the grace period ends.
    fn finish(self) -> String {
        let _ = self.done.recv_timeout(PIPE_GRACE);
        self.buf
            .lock()
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default()
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Drain {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let (tx, done) = mpsc::channel();
    let sink = Arc::clone(&buf);
    std::thread::spawn(move || {
        if let Some(mut pipe) = pipe {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let Ok(mut out) = sink.lock() {
                            out.extend_from_slice(&chunk[..n]);
                        }
                    }
                }
            }
        }
        let _ = tx.send(());
    });
    Drain { buf, done }
}

fn excerpt(text: &str) -> &str {
    if text.len() <= MAX_DIAGNOSTIC_BYTES {
        return text;
    }
    let mut end = MAX_DIAGNOSTIC_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pour_schema::Formula;
    use tempfile::tempdir;

    fn plan(tests: &str) -> TestPlan {
        let toml = format!(
            r#"
name = "demo"
description = "Demo"
homepage = "https://example.com"
url = "https://example.com/demo-1.0.0.tar.gz"
integrity-digest = "unverified"
license = "MIT"
install = ["scripts"]

[version-policy]
fixed = "1.0.0"

{tests}
"#
        );
        Formula::parse(&toml).unwrap().test().clone()
    }

    fn target(prefix: &Path) -> TestTarget<'_> {
        TestTarget {
            prefix,
            name: "demo",
            version: "1.0.0",
        }
    }

    #[test]
    fn failing_check_does_not_stop_the_run() {
        let prefix = tempdir().unwrap();
        let plan = plan(
            r#"
[[test]]
name = "missing"
exists = "{{prefix}}/nope"

[[test]]
name = "prefix"
exists = "{{prefix}}"
"#,
        );

        let mut seen = Vec::new();
        let report = run_tests(&plan, target(prefix.path()), |o, passed| {
            seen.push((o.name.clone(), passed));
        });

        assert_eq!(report.total(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].name, "missing");
        assert!(report.failed[0].diagnostics.contains("does not exist"));
        assert_eq!(report.passed[0].name, "prefix");
        assert_eq!(
            seen,
            vec![("missing".to_string(), false), ("prefix".to_string(), true)]
        );
    }

    #[cfg(unix)]
    #[test]
    fn commands_see_prefix_and_share_testpath() {
        let prefix = tempdir().unwrap();
        let plan = plan(
            r#"
[[test]]
run = ["sh", "-c", "echo \"$PREFIX\" > where"]

[[test]]
exists = "where"

[[test]]
run = ["cat", "{{testpath}}/where"]
expect-contains = "/"

[[test]]
run = ["sh", "-c", "exit 3"]
expect-status = 3
"#,
        );

        let report = run_tests(&plan, target(prefix.path()), |_, _| {});
        assert!(report.is_success(), "{:?}", report.failed);
    }

    #[cfg(unix)]
    #[test]
    fn output_mismatch_reports_diagnostics() {
        let prefix = tempdir().unwrap();
        let plan = plan(
            r#"
[[test]]
run = ["sh", "-c", "echo hello; echo oops >&2"]
expect-output = "goodbye"
"#,
        );

        let report = run_tests(&plan, target(prefix.path()), |_, _| {});
        let diag = &report.failed[0].diagnostics;
        assert!(diag.contains("goodbye"));
        assert!(diag.contains("stderr:\noops"));
    }

    #[cfg(unix)]
    #[test]
    fn executable_check() {
        use std::os::unix::fs::PermissionsExt;
        let prefix = tempdir().unwrap();
        let script = prefix.path().join("scripts/run.sh");
        std::fs::create_dir_all(script.parent().unwrap()).unwrap();
        std::fs::write(&script, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644)).unwrap();

        let plan = plan(
            r#"
[[test]]
executable = "{{dir:scripts}}/run.sh"
"#,
        );
        assert_eq!(run_tests(&plan, target(prefix.path()), |_, _| {}).failed.len(), 1);

        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(run_tests(&plan, target(prefix.path()), |_, _| {}).is_success());
    }

    #[cfg(unix)]
    #[test]
    fn slow_command_times_out() {
        let prefix = tempdir().unwrap();
        let plan = plan(
            r#"
[[test]]
run = ["sleep", "5"]
timeout-secs = 1
"#,
        );
        let report = run_tests(&plan, target(prefix.path()), |_, _| {});
        assert!(report.failed[0].diagnostics.contains("timed out"));
    }

    #[cfg(unix)]
    #[test]
    fn background_process_does_not_hold_the_runner() {
        let prefix = tempdir().unwrap();
        let plan = plan(
            r#"
[[test]]
run = ["sh", "-c", "sleep 30 & echo hi"]
expect-output = "hi"
timeout-secs = 20
"#,
        );
        let started = std::time::Instant::now();
        let report = run_tests(&plan, target(prefix.path()), |_, _| {});
        assert!(report.is_success(), "{:?}", report.failed);
        assert!(started.elapsed() < Duration::from_secs(15));
    }
}
