//! Optional user settings from `~/.pour/config.toml`.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use pour_core::RetryPolicy;
use pour_core::io::fetch::{DEFAULT_MAX_BYTES, FetchOptions};
use pour_core::livecheck::GITHUB_API;
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Settings {
    pub fetch: FetchSettings,
    pub retry: RetrySettings,
    pub livecheck: LivecheckSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub max_bytes: u64,
    pub max_redirects: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        let defaults = FetchOptions::default();
        Self {
            timeout_secs: defaults.timeout.as_secs(),
            max_bytes: DEFAULT_MAX_BYTES,
            max_redirects: defaults.max_redirects,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct RetrySettings {
    pub attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct LivecheckSettings {
    pub github_api: String,
}

impl Default for LivecheckSettings {
    fn default() -> Self {
        Self {
            github_api: GITHUB_API.to_string(),
        }
    }
}

impl Settings {
    /// Load settings; a missing file means defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(self.fetch.timeout_secs),
            max_bytes: self.fetch.max_bytes,
            max_redirects: self.fetch.max_redirects,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retry.attempts.max(1),
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
        }
    }
}
