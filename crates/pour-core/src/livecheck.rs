//! Version resolution (livecheck).
//!
//! Turns a formula's version policy into a concrete [`ResolvedVersion`] and
//! then into the [`SourcePlan`] the pipeline fetches. Network access goes
//! through the [`Upstream`] trait so resolution can be tested without a
//! server.

use async_trait::async_trait;
use pour_schema::version::{strip_v, version_from_url};
use pour_schema::{
    Formula, HeadRef, IntegrityDigest, LivecheckStrategy, NumericVersion, SourceLocator, Version,
    VersionPolicy,
};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

/// Public GitHub API base.
pub const GITHUB_API: &str = "https://api.github.com";

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Upstream unreachable: {0}")]
    Unreachable(String),

    #[error("Upstream {url} answered HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Pattern did not match any version at {0}")]
    NoMatch(String),

    #[error("No tag at {0} looks like a version")]
    NoTags(String),

    #[error("No version found in URL {0}")]
    NoVersionInUrl(String),

    #[error("Cannot list tags for {0}: not a GitHub repository and no tags-url given")]
    NoTagSource(String),

    #[error("Formula has no head locator")]
    MissingHead,

    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
}

/// Where version information comes from.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetch a page as text (release feeds, download pages).
    async fn text(&self, url: &str) -> Result<String, ResolveError>;

    /// List tag names for the project behind `source_url`, or from
    /// `tags_url` when given.
    async fn tags(&self, source_url: &str, tags_url: Option<&str>)
    -> Result<Vec<String>, ResolveError>;
}

/// HTTP implementation backed by reqwest and the GitHub tags API.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: Client,
    github_api: String,
}

impl HttpUpstream {
    pub fn new(client: Client, github_api: impl Into<String>) -> Self {
        Self {
            client,
            github_api: github_api.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, ResolveError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .send()
            .await
            .map_err(|e| ResolveError::Unreachable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

/// Tag listings come either as GitHub objects or as bare strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum TagEntry {
    Named { name: String },
    Bare(String),
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn text(&self, url: &str) -> Result<String, ResolveError> {
        self.get(url)
            .await?
            .text()
            .await
            .map_err(|e| ResolveError::Unreachable(e.to_string()))
    }

    async fn tags(
        &self,
        source_url: &str,
        tags_url: Option<&str>,
    ) -> Result<Vec<String>, ResolveError> {
        let url = match tags_url {
            Some(u) => u.to_string(),
            None => {
                let (owner, repo) = github_repo(source_url)
                    .ok_or_else(|| ResolveError::NoTagSource(source_url.to_string()))?;
                format!("{}/repos/{owner}/{repo}/tags?per_page=100", self.github_api)
            }
        };
        tracing::debug!(%url, "listing tags");

        let entries: Vec<TagEntry> = self
            .get(&url)
            .await?
            .json()
            .await
            .map_err(|e| ResolveError::InvalidResponse(e.to_string()))?;
        Ok(entries
            .into_iter()
            .map(|e| match e {
                TagEntry::Named { name } | TagEntry::Bare(name) => name,
            })
            .collect())
    }
}

/// A concrete version picked for an install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    /// Version without a `v` prefix, or the branch name for head.
    pub version: Version,
    /// Upstream tag spelling, preferring the `v`-prefixed form.
    pub tag: String,
    pub is_head: bool,
}

impl ResolvedVersion {
    fn release(version: &str) -> Self {
        let version = strip_v(version);
        Self {
            version: Version::from(version),
            tag: format!("v{version}"),
            is_head: false,
        }
    }
}

/// Pick the highest version among `tags`.
///
/// Tags must match `pattern`; its first capture group is the version and
/// must be numeric. Tags that normalize to the same version are the same
/// release; the `v`-prefixed spelling wins for reporting.
pub fn latest_tag(tags: &[String], pattern: &Regex) -> Option<ResolvedVersion> {
    let mut best: Option<(NumericVersion, &str, &str)> = None;

    for tag in tags {
        let Some(captured) = pattern
            .captures(tag)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
        else {
            continue;
        };
        let Some(numeric) = NumericVersion::parse(captured) else {
            continue;
        };

        let replace = match &best {
            None => true,
            Some((current, current_tag, _)) => {
                let prefers_v = tag.starts_with('v') && !current_tag.starts_with('v');
                numeric > *current || (numeric == *current && prefers_v)
            }
        };
        if replace {
            best = Some((numeric, tag.as_str(), captured));
        }
    }

    best.map(|(_, tag, captured)| ResolvedVersion {
        version: Version::from(strip_v(captured)),
        tag: tag.to_string(),
        is_head: false,
    })
}

/// Resolve one livecheck strategy.
pub async fn resolve_strategy(
    strategy: &LivecheckStrategy,
    source: &SourceLocator,
    upstream: &dyn Upstream,
) -> Result<ResolvedVersion, ResolveError> {
    match strategy {
        LivecheckStrategy::Regex { url, regex } => {
            let body = upstream.text(url).await?;
            let version = regex
                .captures(&body)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .ok_or_else(|| ResolveError::NoMatch(url.clone()))?;
            Ok(ResolvedVersion::release(&version))
        }
        LivecheckStrategy::LatestTag { tags_url, pattern } => {
            let tags = upstream.tags(source.url(), tags_url.as_deref()).await?;
            tracing::debug!(count = tags.len(), "tags listed");
            latest_tag(&tags, pattern).ok_or_else(|| {
                ResolveError::NoTags(tags_url.clone().unwrap_or_else(|| source.url().to_string()))
            })
        }
        LivecheckStrategy::Head => {
            let head = source.head().ok_or(ResolveError::MissingHead)?;
            Ok(ResolvedVersion {
                version: Version::from(head.branch.as_str()),
                tag: head.branch.clone(),
                is_head: true,
            })
        }
    }
}

/// Determine the version a formula should install.
pub async fn resolve(
    formula: &Formula,
    upstream: &dyn Upstream,
) -> Result<ResolvedVersion, ResolveError> {
    match formula.version_policy() {
        VersionPolicy::Fixed(v) => Ok(ResolvedVersion::release(v)),
        VersionPolicy::FromUrl => version_from_url(formula.source().url())
            .map(|v| ResolvedVersion::release(&v))
            .ok_or_else(|| ResolveError::NoVersionInUrl(formula.source().url().to_string())),
        VersionPolicy::Livecheck(strategy) => {
            resolve_strategy(strategy, formula.source(), upstream).await
        }
    }
}

/// `owner/repo` of a GitHub URL (`github.com` or `codeload.github.com`).
pub fn github_repo(url: &str) -> Option<(String, String)> {
    let parsed = url::Url::parse(url).ok()?;
    if !matches!(
        parsed.host_str()?,
        "github.com" | "www.github.com" | "codeload.github.com"
    ) {
        return None;
    }
    let mut segments = parsed.path_segments()?;
    let owner = segments.next().filter(|s| !s.is_empty())?;
    let repo = segments.next().filter(|s| !s.is_empty())?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);
    Some((owner.to_string(), repo.to_string()))
}

/// Archive URL for a head install.
pub fn head_archive_url(head: &HeadRef) -> String {
    if let Some((owner, repo)) = github_repo(&head.url) {
        return format!(
            "https://github.com/{owner}/{repo}/archive/refs/heads/{}.tar.gz",
            head.branch
        );
    }
    head.url.replace("{branch}", &head.branch)
}

/// What the pipeline will fetch for a resolved version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePlan {
    pub url: String,
    /// Version actually installed.
    pub version: Version,
    pub tag: String,
    pub is_head: bool,
    pub digest: IntegrityDigest,
    /// Newer upstream release when the formula pins an older archive.
    pub outdated: Option<ResolvedVersion>,
}

impl SourcePlan {
    /// Whether the archive may be served from or stored in the cache.
    pub fn cacheable(&self) -> bool {
        !self.is_head && !self.digest.is_unverified()
    }
}

/// Map a resolved version onto the formula's source locator.
///
/// A templated URL receives the resolved version. A pinned URL is fetched
/// as-is; if upstream has moved past the pinned version the plan says so
/// in `outdated` and keeps the pinned version, since only the pinned
/// archive matches the declared digest.
pub fn plan_source(
    formula: &Formula,
    resolved: &ResolvedVersion,
) -> Result<SourcePlan, ResolveError> {
    let source = formula.source();

    if resolved.is_head {
        let head = source.head().ok_or(ResolveError::MissingHead)?;
        return Ok(SourcePlan {
            url: head_archive_url(head),
            version: resolved.version.clone(),
            tag: resolved.tag.clone(),
            is_head: true,
            digest: IntegrityDigest::Unverified,
            outdated: None,
        });
    }

    if !source.is_pinned() {
        return Ok(SourcePlan {
            url: source.url_for(resolved.version.as_str(), &resolved.tag),
            version: resolved.version.clone(),
            tag: resolved.tag.clone(),
            is_head: false,
            digest: formula.digest().clone(),
            outdated: None,
        });
    }

    let pinned = version_from_url(source.url()).map(|v| ResolvedVersion::release(&v));
    let (installed, outdated) = match pinned {
        Some(pinned) if pinned.version < resolved.version => (pinned, Some(resolved.clone())),
        Some(pinned) => (pinned, None),
        None => (resolved.clone(), None),
    };
    Ok(SourcePlan {
        url: source.url().to_string(),
        version: installed.version,
        tag: installed.tag,
        is_head: false,
        digest: formula.digest().clone(),
        outdated,
    })
}
