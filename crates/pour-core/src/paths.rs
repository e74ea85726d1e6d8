use dirs::home_dir;
use std::path::{Path, PathBuf};

/// Environment variable overriding the pour home directory.
pub const HOME_ENV: &str = "POUR_HOME";

/// Directory layout rooted at a pour home (`~/.pour` by default).
///
/// Every path is derived from an explicit home, so tests and callers can
/// point the engine anywhere without touching process-wide state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    home: PathBuf,
}

impl Layout {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Resolve the home from `POUR_HOME`, falling back to `~/.pour`.
    ///
    /// Returns `None` when neither is available.
    pub fn from_env() -> Option<Self> {
        if let Some(val) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Some(Self::new(PathBuf::from(val)));
        }
        home_dir().map(|h| Self::new(h.join(".pour")))
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Installed prefixes: ~/.pour/opt
    pub fn opt_dir(&self) -> PathBuf {
        self.home.join("opt")
    }

    /// Prefix for one formula: ~/.pour/opt/<name>
    pub fn prefix(&self, name: &str) -> PathBuf {
        self.opt_dir().join(name)
    }

    /// Receipt next to the prefix: ~/.pour/opt/<name>.receipt.json
    pub fn receipt_path(&self, name: &str) -> PathBuf {
        crate::receipt::receipt_path(&self.prefix(name))
    }

    /// Verified archive cache: ~/.pour/cache
    pub fn cache_dir(&self) -> PathBuf {
        self.home.join("cache")
    }

    /// Formula lookup directory: ~/.pour/formulae
    pub fn formulae_dir(&self) -> PathBuf {
        self.home.join("formulae")
    }

    /// Optional settings file: ~/.pour/config.toml
    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }
}

/// Extract the filename from a URL.
pub fn filename_from_url(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.split('/').next_back().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_hang_off_home() {
        let layout = Layout::new("/tmp/pour-home");
        assert_eq!(
            layout.prefix("git-flow-pro"),
            PathBuf::from("/tmp/pour-home/opt/git-flow-pro")
        );
        assert_eq!(
            layout.receipt_path("git-flow-pro"),
            PathBuf::from("/tmp/pour-home/opt/git-flow-pro.receipt.json")
        );
        assert_eq!(
            layout.config_path(),
            PathBuf::from("/tmp/pour-home/config.toml")
        );
    }

    #[test]
    fn filename_ignores_query() {
        assert_eq!(
            filename_from_url("https://example.com/a/v1.0.0.tar.gz?raw=1"),
            "v1.0.0.tar.gz"
        );
        assert_eq!(filename_from_url(""), "");
    }
}
