//! Formula definition parsing and validation.
//!
//! A formula is a TOML document describing one installable artifact. It is
//! deserialized into a loose shape first and then validated field by field
//! into an immutable [`Formula`]. Every rejection names the offending field
//! so an author can fix it without guessing.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::digest::IntegrityDigest;
use crate::template::{Scope, Template};
use crate::types::FormulaName;

/// Default pattern for tag-based livecheck: `1.2.3` or `v1.2.3`.
pub const DEFAULT_TAG_PATTERN: &str = r"(?i)^v?(\d+(?:\.\d+)+)$";

/// Errors that can occur when loading a formula.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The formula file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The TOML is malformed or misses a required field.
    #[error("invalid formula syntax: {0}")]
    Syntax(#[from] toml::de::Error),

    /// A field is present but its value is not acceptable.
    #[error("invalid `{field}`: {message}")]
    Field {
        /// Dotted path of the offending field, e.g. `version-policy.livecheck`.
        field: String,
        /// What is wrong with it.
        message: String,
    },
}

impl ParseError {
    fn field(field: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Field {
            field: field.into(),
            message: message.to_string(),
        }
    }

    /// The offending field, when the error is about a specific one.
    pub fn field_name(&self) -> Option<&str> {
        match self {
            Self::Field { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Where the source archive comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocator {
    url: String,
    head: Option<HeadRef>,
}

impl SourceLocator {
    /// The archive URL as written, possibly containing `{version}`/`{tag}`.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the URL points at one fixed archive (no version tokens).
    pub fn is_pinned(&self) -> bool {
        !self.url.contains("{version}") && !self.url.contains("{tag}")
    }

    /// Substitute the resolved version and tag into the URL.
    pub fn url_for(&self, version: &str, tag: &str) -> String {
        self.url.replace("{version}", version).replace("{tag}", tag)
    }

    /// The alternate development head, if declared.
    pub fn head(&self) -> Option<&HeadRef> {
        self.head.as_ref()
    }
}

/// A VCS reference used for head installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadRef {
    /// Repository or archive URL; may contain `{branch}`.
    pub url: String,
    /// Branch to track.
    pub branch: String,
}

/// How the version to install is determined.
#[derive(Debug, Clone)]
pub enum VersionPolicy {
    /// A version written into the formula.
    Fixed(String),
    /// Parse the version out of the source URL.
    FromUrl,
    /// Ask upstream.
    Livecheck(LivecheckStrategy),
}

/// Upstream version discovery.
#[derive(Debug, Clone)]
pub enum LivecheckStrategy {
    /// Fetch `url` and take the first capture group of `regex`.
    Regex {
        /// Page to fetch.
        url: String,
        /// Pattern whose first capture group is the version.
        regex: Regex,
    },
    /// Pick the highest version among upstream tags.
    LatestTag {
        /// Explicit tag listing endpoint; derived from the source URL when absent.
        tags_url: Option<String>,
        /// Tag filter; its first capture group is the version.
        pattern: Regex,
    },
    /// Track the head branch of the formula's `head` locator.
    Head,
}

/// Ordered list of archive-relative directories copied into the prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan(Vec<String>);

impl InstallPlan {
    /// Entries in declaration order, `/`-separated and relative.
    pub fn entries(&self) -> &[String] {
        &self.0
    }
}

/// How a command's output is matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMatcher {
    /// Trimmed stdout must equal this string.
    Exact(String),
    /// Stdout must contain this string.
    Contains(String),
}

/// One acceptance check run against an installed prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    /// The path must exist.
    PathExists {
        /// Display name.
        name: String,
        /// Path template.
        path: Template,
    },
    /// The path must exist and carry an execute bit.
    Executable {
        /// Display name.
        name: String,
        /// Path template.
        path: Template,
    },
    /// Run a command and match its exit status and output.
    Command {
        /// Display name.
        name: String,
        /// Program followed by arguments, each a template.
        argv: Vec<Template>,
        /// Required exit status, if any.
        expect_status: Option<i32>,
        /// Required output, if any.
        expect_output: Option<OutputMatcher>,
        /// Per-check timeout.
        timeout: Option<Duration>,
    },
}

impl Check {
    /// Display name of the check.
    pub fn name(&self) -> &str {
        match self {
            Self::PathExists { name, .. }
            | Self::Executable { name, .. }
            | Self::Command { name, .. } => name,
        }
    }
}

/// Ordered acceptance checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestPlan(Vec<Check>);

impl TestPlan {
    /// Checks in declaration order.
    pub fn checks(&self) -> &[Check] {
        &self.0
    }
}

/// An immutable, validated formula.
///
/// Fields are private: the only way to obtain a `Formula` is through
/// [`Formula::parse`] or [`Formula::load`], so every instance has passed
/// validation and none can be altered afterwards.
#[derive(Debug, Clone)]
pub struct Formula {
    name: FormulaName,
    description: String,
    homepage: String,
    license: String,
    source: SourceLocator,
    digest: IntegrityDigest,
    version_policy: VersionPolicy,
    depends_on: Vec<FormulaName>,
    install: InstallPlan,
    test: TestPlan,
    caveats: Option<Template>,
}

impl Formula {
    /// Read and validate a formula file.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Io`] if the file cannot be read, otherwise the
    /// same errors as [`Formula::parse`].
    pub fn load(path: &Path) -> Result<Self, ParseError> {
        let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate a formula from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Syntax`] for malformed TOML or missing fields and
    /// [`ParseError::Field`] for values that fail validation.
    pub fn parse(content: &str) -> Result<Self, ParseError> {
        let def: FormulaDef = toml::from_str(content)?;
        def.validate()
    }

    /// Formula name.
    pub fn name(&self) -> &FormulaName {
        &self.name
    }

    /// One-line description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Project homepage.
    pub fn homepage(&self) -> &str {
        &self.homepage
    }

    /// SPDX license identifier.
    pub fn license(&self) -> &str {
        &self.license
    }

    /// Source archive locator.
    pub fn source(&self) -> &SourceLocator {
        &self.source
    }

    /// Expected digest of the source archive.
    pub fn digest(&self) -> &IntegrityDigest {
        &self.digest
    }

    /// Version resolution policy.
    pub fn version_policy(&self) -> &VersionPolicy {
        &self.version_policy
    }

    /// Declared runtime dependencies, in declaration order.
    pub fn depends_on(&self) -> &[FormulaName] {
        &self.depends_on
    }

    /// Directories to install.
    pub fn install(&self) -> &InstallPlan {
        &self.install
    }

    /// Acceptance checks.
    pub fn test(&self) -> &TestPlan {
        &self.test
    }

    /// Post-install caveats template.
    pub fn caveats(&self) -> Option<&Template> {
        self.caveats.as_ref()
    }
}

impl std::str::FromStr for Formula {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ============================================================================
// Raw (unvalidated) shape
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct FormulaDef {
    name: String,
    description: String,
    homepage: String,
    url: String,
    integrity_digest: String,
    license: String,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    head: Option<HeadDef>,
    version_policy: VersionPolicyDef,
    install: Vec<String>,
    #[serde(default)]
    caveats: Option<String>,
    test: Vec<CheckDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HeadDef {
    url: String,
    #[serde(default = "default_branch")]
    branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct VersionPolicyDef {
    #[serde(default)]
    fixed: Option<String>,
    #[serde(default)]
    from_url: Option<bool>,
    #[serde(default)]
    livecheck: Option<LivecheckDef>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LivecheckDef {
    Short(String),
    Table(LivecheckTable),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct LivecheckTable {
    #[serde(default)]
    strategy: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    regex: Option<String>,
    #[serde(default)]
    tags_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct CheckDef {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    exists: Option<String>,
    #[serde(default)]
    executable: Option<String>,
    #[serde(default)]
    run: Option<Vec<String>>,
    #[serde(default)]
    expect_status: Option<i32>,
    #[serde(default)]
    expect_output: Option<String>,
    #[serde(default)]
    expect_contains: Option<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

// ============================================================================
// Validation
// ============================================================================

impl FormulaDef {
    fn validate(self) -> Result<Formula, ParseError> {
        let name = FormulaName::new(&self.name).map_err(|e| ParseError::field("name", e))?;

        let description = self.description.trim().to_string();
        if description.is_empty() || description.contains('\n') {
            return Err(ParseError::field(
                "description",
                "must be a single non-empty line",
            ));
        }
        if self.license.trim().is_empty() {
            return Err(ParseError::field("license", "must not be empty"));
        }
        check_url("homepage", &self.homepage, &[])?;

        let head = self
            .head
            .map(|h| {
                check_url("head.url", &h.url, &[("{branch}", h.branch.as_str())])?;
                if h.branch.trim().is_empty() || h.branch.contains(char::is_whitespace) {
                    return Err(ParseError::field("head.branch", "must be a branch name"));
                }
                Ok(HeadRef {
                    url: h.url,
                    branch: h.branch,
                })
            })
            .transpose()?;

        check_url("url", &self.url, &[("{version}", "0.0.0"), ("{tag}", "v0.0.0")])?;
        let source = SourceLocator {
            url: self.url,
            head,
        };

        let digest = IntegrityDigest::parse(&self.integrity_digest)
            .map_err(|e| ParseError::field("integrity-digest", e))?;

        let version_policy = self.version_policy.validate(&source)?;
        let depends_on = validate_dependencies(&self.depends_on)?;
        let install = validate_install_plan(&self.install)?;

        let caveats = self
            .caveats
            .map(|text| {
                Template::parse(
                    &text,
                    Scope {
                        install_entries: install.entries(),
                        allow_testpath: false,
                    },
                )
                .map_err(|e| ParseError::field("caveats", e))
            })
            .transpose()?;

        let test = validate_test_plan(self.test, &install)?;

        Ok(Formula {
            name,
            description,
            homepage: self.homepage,
            license: self.license,
            source,
            digest,
            version_policy,
            depends_on,
            install,
            test,
            caveats,
        })
    }
}

impl VersionPolicyDef {
    fn validate(self, source: &SourceLocator) -> Result<VersionPolicy, ParseError> {
        const FIELD: &str = "version-policy";
        let from_url = self.from_url.unwrap_or(false);
        let chosen = usize::from(self.fixed.is_some())
            + usize::from(from_url)
            + usize::from(self.livecheck.is_some());
        if chosen != 1 {
            return Err(ParseError::field(
                FIELD,
                "exactly one of `fixed`, `from-url = true` or `livecheck` must be set",
            ));
        }

        if let Some(v) = self.fixed {
            let v = v.trim();
            if v.is_empty() || v.contains(char::is_whitespace) || v.contains('/') {
                return Err(ParseError::field("version-policy.fixed", "not a version"));
            }
            return Ok(VersionPolicy::Fixed(v.to_string()));
        }

        if from_url {
            if !source.is_pinned() {
                return Err(ParseError::field(
                    "version-policy.from-url",
                    "cannot derive a version from a URL that itself contains {version}",
                ));
            }
            return Ok(VersionPolicy::FromUrl);
        }

        let strategy = match self.livecheck {
            Some(livecheck) => livecheck.validate()?,
            None => return Err(ParseError::field(FIELD, "no policy set")),
        };
        if matches!(strategy, LivecheckStrategy::Head) && source.head().is_none() {
            return Err(ParseError::field(
                "head",
                "livecheck strategy `head` requires a `head` locator",
            ));
        }
        Ok(VersionPolicy::Livecheck(strategy))
    }
}

impl LivecheckDef {
    fn validate(self) -> Result<LivecheckStrategy, ParseError> {
        const FIELD: &str = "version-policy.livecheck";
        let table = match self {
            Self::Short(s) => LivecheckTable {
                strategy: Some(s),
                url: None,
                regex: None,
                tags_url: None,
            },
            Self::Table(t) => t,
        };

        let strategy = match (&table.strategy, &table.url) {
            (Some(s), _) => s.as_str(),
            (None, Some(_)) => "regex",
            (None, None) => "latest-tag",
        };

        match strategy {
            "regex" => {
                let url = table.url.ok_or_else(|| {
                    ParseError::field(format!("{FIELD}.url"), "required for the regex strategy")
                })?;
                check_url(&format!("{FIELD}.url"), &url, &[])?;
                let pattern = table.regex.ok_or_else(|| {
                    ParseError::field(format!("{FIELD}.regex"), "required for the regex strategy")
                })?;
                let regex = compile_capturing(&format!("{FIELD}.regex"), &pattern)?;
                Ok(LivecheckStrategy::Regex { url, regex })
            }
            "latest-tag" | "stable" => {
                if table.url.is_some() {
                    return Err(ParseError::field(
                        format!("{FIELD}.url"),
                        "use `tags-url` with the latest-tag strategy",
                    ));
                }
                if let Some(tags_url) = &table.tags_url {
                    check_url(&format!("{FIELD}.tags-url"), tags_url, &[])?;
                }
                let pattern = table.regex.as_deref().unwrap_or(DEFAULT_TAG_PATTERN);
                let pattern = compile_capturing(&format!("{FIELD}.regex"), pattern)?;
                Ok(LivecheckStrategy::LatestTag {
                    tags_url: table.tags_url,
                    pattern,
                })
            }
            "head" => {
                if table.url.is_some() || table.regex.is_some() || table.tags_url.is_some() {
                    return Err(ParseError::field(
                        FIELD,
                        "the head strategy takes no url, regex or tags-url",
                    ));
                }
                Ok(LivecheckStrategy::Head)
            }
            other => Err(ParseError::field(
                format!("{FIELD}.strategy"),
                format!("unknown strategy '{other}' (expected regex, latest-tag or head)"),
            )),
        }
    }
}

fn compile_capturing(field: &str, pattern: &str) -> Result<Regex, ParseError> {
    let regex = Regex::new(pattern).map_err(|e| ParseError::field(field, e))?;
    if regex.captures_len() < 2 {
        return Err(ParseError::field(
            field,
            "pattern must contain a capture group for the version",
        ));
    }
    Ok(regex)
}

/// Validate an http(s) URL after substituting the allowed `{token}`s with
/// sample values. Any other `{...}` is rejected.
fn check_url(field: &str, url: &str, tokens: &[(&str, &str)]) -> Result<(), ParseError> {
    let mut sample = url.to_string();
    for (token, value) in tokens {
        sample = sample.replace(token, value);
    }
    if sample.contains('{') || sample.contains('}') {
        return Err(ParseError::field(field, "contains an unknown {placeholder}"));
    }
    let parsed = url::Url::parse(&sample).map_err(|e| ParseError::field(field, e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ParseError::field(
            field,
            format!("unsupported scheme '{}'", parsed.scheme()),
        ));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(ParseError::field(field, "missing host"));
    }
    Ok(())
}

fn validate_dependencies(names: &[String]) -> Result<Vec<FormulaName>, ParseError> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(names.len());
    for raw in names {
        let name = FormulaName::new(raw).map_err(|e| ParseError::field("depends-on", e))?;
        if !seen.insert(name.clone()) {
            return Err(ParseError::field(
                "depends-on",
                format!("'{name}' is listed more than once"),
            ));
        }
        out.push(name);
    }
    Ok(out)
}

fn validate_install_plan(entries: &[String]) -> Result<InstallPlan, ParseError> {
    const FIELD: &str = "install";
    if entries.is_empty() {
        return Err(ParseError::field(FIELD, "must list at least one entry"));
    }

    let mut normalized: Vec<String> = Vec::with_capacity(entries.len());
    for raw in entries {
        let path = Path::new(raw);
        let mut parts = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::ParentDir => {
                    return Err(ParseError::field(
                        FIELD,
                        format!("'{raw}' escapes the archive root"),
                    ));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(ParseError::field(
                        FIELD,
                        format!("'{raw}' must be a relative path"),
                    ));
                }
                Component::CurDir => {}
            }
        }
        if parts.is_empty() {
            return Err(ParseError::field(
                FIELD,
                format!("'{raw}' does not name a directory"),
            ));
        }
        let entry = parts.join("/");

        for existing in &normalized {
            if *existing == entry {
                return Err(ParseError::field(
                    FIELD,
                    format!("'{entry}' is listed more than once"),
                ));
            }
            if is_nested(existing, &entry) || is_nested(&entry, existing) {
                return Err(ParseError::field(
                    FIELD,
                    format!("'{entry}' overlaps with '{existing}'"),
                ));
            }
        }
        normalized.push(entry);
    }
    Ok(InstallPlan(normalized))
}

fn is_nested(parent: &str, child: &str) -> bool {
    child
        .strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with('/'))
}

fn validate_test_plan(defs: Vec<CheckDef>, install: &InstallPlan) -> Result<TestPlan, ParseError> {
    let scope = Scope {
        install_entries: install.entries(),
        allow_testpath: true,
    };
    let mut checks = Vec::with_capacity(defs.len());

    for (i, def) in defs.into_iter().enumerate() {
        let field = format!("test[{i}]");
        let kinds = usize::from(def.exists.is_some())
            + usize::from(def.executable.is_some())
            + usize::from(def.run.is_some());
        if kinds != 1 {
            return Err(ParseError::field(
                field,
                "exactly one of `exists`, `executable` or `run` must be set",
            ));
        }
        let has_expectations = def.expect_status.is_some()
            || def.expect_output.is_some()
            || def.expect_contains.is_some()
            || def.timeout_secs.is_some();
        let parse = |text: &str| {
            Template::parse(text, scope).map_err(|e| ParseError::field(field.clone(), e))
        };

        let check = if let Some(path) = def.exists {
            if has_expectations {
                return Err(ParseError::field(field.as_str(), "expectations only apply to `run`"));
            }
            Check::PathExists {
                name: def.name.unwrap_or_else(|| format!("{path} exists")),
                path: parse(&path)?,
            }
        } else if let Some(path) = def.executable {
            if has_expectations {
                return Err(ParseError::field(field.as_str(), "expectations only apply to `run`"));
            }
            Check::Executable {
                name: def.name.unwrap_or_else(|| format!("{path} is executable")),
                path: parse(&path)?,
            }
        } else {
            let argv = def.run.unwrap_or_default();
            if argv.is_empty() || argv[0].trim().is_empty() {
                return Err(ParseError::field(field.as_str(), "`run` needs a program"));
            }
            if def.expect_output.is_some() && def.expect_contains.is_some() {
                return Err(ParseError::field(
                    field,
                    "`expect-output` and `expect-contains` are mutually exclusive",
                ));
            }
            let expect_output = def
                .expect_output
                .map(OutputMatcher::Exact)
                .or(def.expect_contains.map(OutputMatcher::Contains));
            // A bare command is expected to succeed.
            let expect_status = def.expect_status.or(Some(0));
            Check::Command {
                name: def.name.unwrap_or_else(|| argv.join(" ")),
                argv: argv.iter().map(|a| parse(a)).collect::<Result<_, _>>()?,
                expect_status,
                expect_output,
                timeout: def.timeout_secs.map(Duration::from_secs),
            }
        };
        checks.push(check);
    }
    Ok(TestPlan(checks))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIT_FLOW_PRO: &str = r#"
name = "git-flow-pro"
description = "Enhanced Git Flow workflow management for Zsh"
homepage = "https://github.com/chornthorn/git-flow-pro"
url = "https://github.com/chornthorn/git-flow-pro/archive/refs/tags/v1.0.0.tar.gz"
integrity-digest = "sha256:03ec8b260c30b49972a70b812acd9373e196ddf685e8537df19dcbbe273eab64"
license = "MIT"
depends-on = ["git", "git-flow", "zsh"]
install = ["config", "scripts"]
caveats = """
To complete the installation, run:
  /bin/zsh -c "$({{dir:scripts}}/remote-install.sh)"
"""

[version-policy]
livecheck = "latest-tag"

[[test]]
run = ["git", "init"]

[[test]]
exists = "{{testpath}}/.git"

[[test]]
executable = "{{prefix}}/scripts/install.sh"
"#;

    fn with(replace: &str, by: &str) -> String {
        assert!(GIT_FLOW_PRO.contains(replace), "fixture lacks {replace}");
        GIT_FLOW_PRO.replacen(replace, by, 1)
    }

    fn field_of(content: &str) -> String {
        Formula::parse(content)
            .unwrap_err()
            .field_name()
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    #[test]
    fn parses_full_formula() {
        let f = Formula::parse(GIT_FLOW_PRO).unwrap();
        assert_eq!(f.name().as_str(), "git-flow-pro");
        assert_eq!(f.install().entries(), &["config", "scripts"]);
        assert_eq!(f.depends_on().len(), 3);
        assert!(f.source().is_pinned());
        assert!(matches!(
            f.version_policy(),
            VersionPolicy::Livecheck(LivecheckStrategy::LatestTag { tags_url: None, .. })
        ));
        assert_eq!(f.test().checks().len(), 3);
        assert!(matches!(
            &f.test().checks()[0],
            Check::Command {
                expect_status: Some(0),
                ..
            }
        ));
        assert!(f.caveats().is_some());
    }

    #[test]
    fn rejects_path_traversal_in_install_plan() {
        let bad = with(
            r#"install = ["config", "scripts"]"#,
            r#"install = ["config", "../escape"]"#,
        );
        assert_eq!(field_of(&bad), "install");

        let abs = with(
            r#"install = ["config", "scripts"]"#,
            r#"install = ["/etc"]"#,
        );
        assert_eq!(field_of(&abs), "install");
    }

    #[test]
    fn rejects_overlapping_and_duplicate_entries() {
        let dup = with(
            r#"install = ["config", "scripts"]"#,
            r#"install = ["config", "config/"]"#,
        );
        assert_eq!(field_of(&dup), "install");

        let nested = with(
            r#"install = ["config", "scripts"]"#,
            r#"install = ["share", "share/man", "scripts"]"#,
        );
        assert_eq!(field_of(&nested), "install");
    }

    #[test]
    fn rejects_malformed_url_and_digest() {
        let url = with(
            "url = \"https://github.com/chornthorn",
            "url = \"ftp://github.com/chornthorn",
        );
        assert_eq!(field_of(&url), "url");

        let digest = with("sha256:03ec8b26", "sha256:zzzz");
        assert_eq!(field_of(&digest), "integrity-digest");
    }

    #[test]
    fn placeholder_digest_loads_as_unverified() {
        let content = with(
            "sha256:03ec8b260c30b49972a70b812acd9373e196ddf685e8537df19dcbbe273eab64",
            "YOUR_TARBALL_SHA256",
        );
        let f = Formula::parse(&content).unwrap();
        assert!(f.digest().is_unverified());
    }

    #[test]
    fn rejects_duplicate_dependencies() {
        let content = with(
            r#"depends-on = ["git", "git-flow", "zsh"]"#,
            r#"depends-on = ["git", "zsh", "git"]"#,
        );
        assert_eq!(field_of(&content), "depends-on");
    }

    #[test]
    fn rejects_unknown_caveat_placeholder() {
        let content = with("{{dir:scripts}}", "{{cellar}}");
        assert_eq!(field_of(&content), "caveats");

        let not_installed = with("{{dir:scripts}}", "{{dir:bin}}");
        assert_eq!(field_of(&not_installed), "caveats");
    }

    #[test]
    fn version_policy_must_pick_one() {
        let both = with(
            "livecheck = \"latest-tag\"",
            "livecheck = \"latest-tag\"\nfixed = \"1.0.0\"",
        );
        assert_eq!(field_of(&both), "version-policy");

        let head_without_locator = with("livecheck = \"latest-tag\"", "livecheck = \"head\"");
        assert_eq!(field_of(&head_without_locator), "head");
    }

    #[test]
    fn regex_livecheck_needs_capture_group() {
        let content = with(
            "livecheck = \"latest-tag\"",
            r#"livecheck = { url = "https://example.com/releases", regex = "v\\d+" }"#,
        );
        assert_eq!(field_of(&content), "version-policy.livecheck.regex");

        let ok = with(
            "livecheck = \"latest-tag\"",
            r#"livecheck = { url = "https://example.com/releases", regex = "tool-(\\d+\\.\\d+)" }"#,
        );
        assert!(matches!(
            Formula::parse(&ok).unwrap().version_policy(),
            VersionPolicy::Livecheck(LivecheckStrategy::Regex { .. })
        ));
    }

    #[test]
    fn templated_url_with_fixed_version() {
        let content = with("v1.0.0.tar.gz", "v{version}.tar.gz")
            .replace("livecheck = \"latest-tag\"", "fixed = \"1.1.0\"");
        let f = Formula::parse(&content).unwrap();
        assert!(!f.source().is_pinned());
        assert!(
            f.source()
                .url_for("1.1.0", "v1.1.0")
                .ends_with("/v1.1.0.tar.gz")
        );
    }

    #[test]
    fn check_kinds_are_exclusive() {
        let content = with(
            "exists = \"{{testpath}}/.git\"",
            "exists = \"{{testpath}}/.git\"\nexecutable = \"x\"",
        );
        assert_eq!(field_of(&content), "test[1]");
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("git-flow-pro.toml");
        std::fs::write(&path, GIT_FLOW_PRO).unwrap();
        assert_eq!(Formula::load(&path).unwrap().name(), &"git-flow-pro");

        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Formula::load(&missing),
            Err(ParseError::Io { .. })
        ));
    }

    #[test]
    fn missing_required_field_is_syntax_error() {
        let content = GIT_FLOW_PRO.replace("license = \"MIT\"\n", "");
        assert!(matches!(
            Formula::parse(&content),
            Err(ParseError::Syntax(_))
        ));
    }
}
