//! Cache of verified source archives.
//!
//! Entries are keyed by formula name and normalized version, so `v1.0.0` and
//! `1.0.0` share one entry. Bytes are re-verified on every read; an entry
//! that no longer matches is evicted.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use pour_schema::IntegrityDigest;
use pour_schema::version::strip_v;

use crate::verify;

#[derive(Debug, Clone)]
pub struct ArchiveCache {
    dir: PathBuf,
}

impl ArchiveCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache file for a formula version: `<dir>/<name>--<version>`.
    pub fn entry_path(&self, name: &str, version: &str) -> PathBuf {
        self.dir.join(format!("{name}--{}", strip_v(version)))
    }

    /// Read a cached archive if it still matches `digest`.
    ///
    /// Unverified digests never hit the cache.
    pub fn get(&self, name: &str, version: &str, digest: &IntegrityDigest) -> Option<Bytes> {
        if digest.is_unverified() {
            return None;
        }
        let path = self.entry_path(name, version);
        let bytes = fs::read(&path).ok()?;
        if verify::verify(&bytes, digest).is_ok() {
            tracing::debug!(path = %path.display(), "cache hit");
            return Some(Bytes::from(bytes));
        }

        tracing::warn!(path = %path.display(), "cached archive failed verification, evicting");
        if let Err(e) = fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), "failed to evict: {e}");
        }
        None
    }

    /// Store verified bytes. Writes go through a temp file and a rename so a
    /// reader never sees a partial archive.
    pub fn put(&self, name: &str, version: &str, bytes: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.persist(self.entry_path(name, version))
            .map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pour_schema::DigestAlgorithm;
    use tempfile::tempdir;

    fn digest_of(bytes: &[u8]) -> IntegrityDigest {
        IntegrityDigest::known(
            DigestAlgorithm::Sha256,
            &verify::hex_digest(bytes, DigestAlgorithm::Sha256),
        )
        .unwrap()
    }

    #[test]
    fn v_prefixed_versions_share_an_entry() {
        let dir = tempdir().unwrap();
        let cache = ArchiveCache::new(dir.path());
        let digest = digest_of(b"archive");

        cache.put("demo", "v1.0.0", b"archive").unwrap();
        assert_eq!(
            cache.get("demo", "1.0.0", &digest).as_deref(),
            Some(&b"archive"[..])
        );
    }

    #[test]
    fn corrupted_entry_is_evicted() {
        let dir = tempdir().unwrap();
        let cache = ArchiveCache::new(dir.path());
        let digest = digest_of(b"archive");

        cache.put("demo", "1.0.0", b"tampered").unwrap();
        assert!(cache.get("demo", "1.0.0", &digest).is_none());
        assert!(!cache.entry_path("demo", "1.0.0").exists());
    }

    #[test]
    fn unverified_never_hits() {
        let dir = tempdir().unwrap();
        let cache = ArchiveCache::new(dir.path());
        cache.put("demo", "1.0.0", b"archive").unwrap();
        assert!(
            cache
                .get("demo", "1.0.0", &IntegrityDigest::Unverified)
                .is_none()
        );
    }
}
