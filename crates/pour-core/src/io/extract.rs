//! Archive extraction module
//!
//! Handles tar.gz, tar.zst, plain tar and zip archives held in memory. The
//! format is detected from magic bytes, not from the URL, because archive
//! endpoints rarely carry a reliable extension.

use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use zip::ZipArchive;
use zstd::stream::Decoder as ZstdDecoder;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const USTAR_OFFSET: usize = 257;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Unsupported archive format")]
    UnsupportedFormat,

    #[error("Archive entry escapes the extraction root: {0}")]
    UnsafePath(String),

    #[error("Archive error: {0}")]
    Archive(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    TarZst,
    Tar,
    Zip,
}

/// Detect archive format from leading bytes.
pub fn detect_format(bytes: &[u8]) -> Option<ArchiveFormat> {
    if bytes.starts_with(GZIP_MAGIC) {
        Some(ArchiveFormat::TarGz)
    } else if bytes.starts_with(ZSTD_MAGIC) {
        Some(ArchiveFormat::TarZst)
    } else if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(ZIP_EMPTY_MAGIC) {
        Some(ArchiveFormat::Zip)
    } else if bytes
        .get(USTAR_OFFSET..USTAR_OFFSET + 5)
        .is_some_and(|magic| magic == b"ustar")
    {
        Some(ArchiveFormat::Tar)
    } else {
        None
    }
}

/// Extract an in-memory archive into `dest_dir`, auto-detecting the format.
///
/// Returns the relative paths of every regular file written.
pub fn extract(bytes: &[u8], dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    fs::create_dir_all(dest_dir)?;
    match detect_format(bytes).ok_or(ExtractError::UnsupportedFormat)? {
        ArchiveFormat::TarGz => extract_tar(flate2::read::GzDecoder::new(bytes), dest_dir),
        ArchiveFormat::TarZst => extract_tar(ZstdDecoder::new(bytes)?, dest_dir),
        ArchiveFormat::Tar => extract_tar(bytes, dest_dir),
        ArchiveFormat::Zip => extract_zip(bytes, dest_dir),
    }
}

/// Reject absolute paths and any `..` component.
fn safe_relative(path: &Path) -> Result<PathBuf, ExtractError> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractError::UnsafePath(path.display().to_string()));
            }
        }
    }
    Ok(out)
}

/// A link target must stay inside the root once resolved against the
/// directory holding the link.
fn check_link_target(entry: &Path, target: &Path) -> Result<(), ExtractError> {
    if target.is_absolute() {
        return Err(ExtractError::UnsafePath(format!(
            "{} -> {}",
            entry.display(),
            target.display()
        )));
    }
    let mut depth: usize = entry.components().count().saturating_sub(1);
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    ExtractError::UnsafePath(format!(
                        "{} -> {}",
                        entry.display(),
                        target.display()
                    ))
                })?;
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractError::UnsafePath(target.display().to_string()));
            }
        }
    }
    Ok(())
}

/// Resolve where `relative` would land under `root`, following any
/// symlinks earlier entries created. Fails if that is outside `root`.
///
/// Returns the entry's path relative to `root` after resolution.
fn resolve_inside(root: &Path, relative: &Path) -> Result<PathBuf, ExtractError> {
    let unsafe_path = || ExtractError::UnsafePath(relative.display().to_string());
    let file_name = relative.file_name().ok_or_else(unsafe_path)?;

    // Missing directories are created later by `unpack_in`, inside the
    // deepest ancestor that exists now.
    let mut existing = root.join(relative);
    existing.pop();
    let mut missing = Vec::new();
    while fs::symlink_metadata(&existing).is_err() {
        let Some(part) = existing.file_name() else {
            return Err(unsafe_path());
        };
        missing.push(part.to_os_string());
        existing.pop();
    }

    let mut resolved = fs::canonicalize(&existing)?;
    if !resolved.starts_with(root) {
        return Err(unsafe_path());
    }
    resolved.extend(missing.iter().rev());
    resolved.push(file_name);
    Ok(resolved
        .strip_prefix(root)
        .map_err(|_| unsafe_path())?
        .to_path_buf())
}

/// Extract a tar stream from a reader
fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let root = fs::canonicalize(dest_dir)?;
    let mut archive = tar::Archive::new(reader);
    let mut files = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative_path = safe_relative(&entry.path()?)?;
        if relative_path.as_os_str().is_empty() {
            continue;
        }

        let entry_type = entry.header().entry_type();
        // GitHub tarballs carry a pax global header with the commit id.
        if entry_type.is_pax_global_extensions() || entry_type.is_pax_local_extensions() {
            continue;
        }

        let resolved = resolve_inside(&root, &relative_path)?;
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            let target = entry
                .link_name()?
                .ok_or_else(|| ExtractError::Archive("link without target".to_string()))?;
            if entry_type.is_hard_link() {
                // Hard link targets name an earlier entry, relative to the root.
                let source = fs::canonicalize(root.join(safe_relative(&target)?))?;
                if !source.starts_with(&root) {
                    return Err(ExtractError::UnsafePath(target.display().to_string()));
                }
            } else {
                check_link_target(&resolved, &target)?;
            }
        }

        if !entry.unpack_in(&root)? {
            return Err(ExtractError::UnsafePath(relative_path.display().to_string()));
        }
        if entry_type.is_file() {
            files.push(relative_path);
        }
    }

    Ok(files)
}

/// Extract a zip archive
fn extract_zip(bytes: &[u8], dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::Archive(e.to_string()))?;
    let mut files = Vec::new();

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| ExtractError::Archive(e.to_string()))?;
        let relative_path = file
            .enclosed_name()
            .ok_or_else(|| ExtractError::UnsafePath(file.name().to_string()))?;
        let relative_path = safe_relative(&relative_path)?;
        let absolute_path = dest_dir.join(&relative_path);

        if file.is_dir() {
            fs::create_dir_all(&absolute_path)?;
            continue;
        }
        if let Some(p) = absolute_path.parent() {
            fs::create_dir_all(p)?;
        }

        let mut outfile = File::create(&absolute_path)?;
        io::copy(&mut file, &mut outfile)?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&absolute_path, fs::Permissions::from_mode(mode & 0o7777))?;
        }

        files.push(relative_path);
    }

    Ok(files)
}

/// The directory to treat as the archive root.
///
/// Release archives usually wrap everything in one top-level directory
/// (`project-1.0.0/`); in that case the root is that directory. A flat
/// archive whose top level already holds every install entry is used as is,
/// even when that is a single directory. Hidden entries are ignored when
/// deciding.
pub fn archive_root(dir: &Path, entries: &[String]) -> io::Result<PathBuf> {
    let holds_all = entries
        .iter()
        .all(|entry| fs::symlink_metadata(dir.join(entry)).is_ok());
    if !entries.is_empty() && holds_all {
        return Ok(dir.to_path_buf());
    }

    let mut children: Vec<_> = fs::read_dir(dir)?.filter_map(Result::ok).collect();
    children.retain(|e| !e.file_name().to_string_lossy().starts_with('.'));

    if children.len() == 1 && children[0].file_type()?.is_dir() {
        return Ok(children[0].path());
    }
    Ok(dir.to_path_buf())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    /// Build a gzipped tarball from `(path, contents, mode)` triples.
    pub(crate) fn tar_gz(entries: &[(&str, &str, u32)]) -> Vec<u8> {
        let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, contents, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder
                .append_data(&mut header, path, contents.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    enum Item<'a> {
        File(&'a str, &'a str),
        Symlink(&'a str, &'a str),
        HardLink(&'a str, &'a str),
    }

    /// Build an uncompressed tarball that may contain links.
    fn tar_of(items: &[Item<'_>]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for item in items {
            let mut header = tar::Header::new_gnu();
            header.set_mode(0o644);
            match *item {
                Item::File(path, contents) => {
                    header.set_size(contents.len() as u64);
                    builder
                        .append_data(&mut header, path, contents.as_bytes())
                        .unwrap();
                }
                Item::Symlink(path, target) | Item::HardLink(path, target) => {
                    header.set_entry_type(if matches!(item, Item::Symlink(..)) {
                        tar::EntryType::Symlink
                    } else {
                        tar::EntryType::Link
                    });
                    header.set_size(0);
                    header.set_link_name(target).unwrap();
                    builder
                        .append_data(&mut header, path, io::empty())
                        .unwrap();
                }
            }
        }
        builder.into_inner().unwrap()
    }

    fn tar_with_raw_name(name: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_old();
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(4);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append(&header, &b"evil"[..]).unwrap();
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(&[0x1f, 0x8b, 8]), Some(ArchiveFormat::TarGz));
        assert_eq!(
            detect_format(&[0x28, 0xb5, 0x2f, 0xfd, 0]),
            Some(ArchiveFormat::TarZst)
        );
        assert_eq!(detect_format(b"PK\x03\x04rest"), Some(ArchiveFormat::Zip));
        assert_eq!(detect_format(b"not an archive"), None);
    }

    #[test]
    fn test_extract_tar_gz_keeps_modes() {
        let dir = tempdir().unwrap();
        let archive = tar_gz(&[
            ("pkg-1.0.0/scripts/install.sh", "#!/bin/sh\n", 0o755),
            ("pkg-1.0.0/config/settings", "a=1\n", 0o644),
        ]);

        let files = extract(&archive, dir.path()).unwrap();
        assert_eq!(files.len(), 2);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(dir.path().join("pkg-1.0.0/scripts/install.sh"))
                .unwrap()
                .permissions()
                .mode();
            assert_ne!(mode & 0o111, 0);
        }
    }

    #[test]
    fn test_extract_tar_zst() {
        let dir = tempdir().unwrap();
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(2);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "bin/tool", &b"hi"[..])
            .unwrap();
        let tar_bytes = builder.into_inner().unwrap();
        let compressed = zstd::encode_all(&tar_bytes[..], 3).unwrap();

        let files = extract(&compressed, dir.path()).unwrap();
        assert_eq!(files, vec![PathBuf::from("bin/tool")]);
    }

    #[test]
    fn test_extract_zip() {
        let dir = tempdir().unwrap();
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("scripts/run.sh", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"echo hi").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        extract(&bytes, dir.path()).unwrap();
        assert!(dir.path().join("scripts/run.sh").exists());
    }

    #[test]
    fn test_rejects_parent_traversal() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out");
        let err = extract(&tar_with_raw_name(b"../evil"), &dest).unwrap_err();
        assert!(matches!(err, ExtractError::UnsafePath(_)));
        assert!(!dir.path().join("evil").exists());
    }

    #[test]
    fn test_rejects_escaping_symlink() {
        assert!(check_link_target(Path::new("a/link"), Path::new("../b")).is_ok());
        assert!(check_link_target(Path::new("a/link"), Path::new("../../etc")).is_err());
        assert!(check_link_target(Path::new("link"), Path::new("/etc/passwd")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_writes_through_symlink_chain() {
        use Item::{File, Symlink};
        let dir = tempdir().unwrap();
        let dest = dir.path().join("stage/src");
        let archive = tar_of(&[
            Symlink("a", "."),
            Symlink("a/b", ".."),
            Symlink("a/b/c", ".."),
            File("a/b/c/ESCAPED", "x"),
            File("scripts/x.sh", "x"),
        ]);

        let err = extract(&archive, &dest).unwrap_err();
        assert!(matches!(err, ExtractError::UnsafePath(_)));
        assert!(!dir.path().join("stage/ESCAPED").exists());
        assert!(!dir.path().join("ESCAPED").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_file_under_escaping_directory_link() {
        use Item::{File, Symlink};
        let dir = tempdir().unwrap();
        let outside = dir.path().join("outside");
        fs::create_dir(&outside).unwrap();
        let dest = dir.path().join("out");
        fs::create_dir(&dest).unwrap();
        // A link planted by an earlier step, which the lexical check never sees.
        std::os::unix::fs::symlink(&outside, dest.join("up")).unwrap();

        let err = extract(&tar_of(&[File("up/ESCAPED", "x")]), &dest).unwrap_err();
        assert!(matches!(err, ExtractError::UnsafePath(_)));
        assert!(!outside.join("ESCAPED").exists());
    }

    #[test]
    fn test_extracts_hard_links_against_root() {
        use Item::{File, HardLink};
        let dir = tempdir().unwrap();
        let archive = tar_of(&[
            File("demo-1.0.0/scripts/install.sh", "echo ok"),
            HardLink("demo-1.0.0/scripts/alias.sh", "demo-1.0.0/scripts/install.sh"),
        ]);

        extract(&archive, dir.path()).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("demo-1.0.0/scripts/alias.sh")).unwrap(),
            "echo ok"
        );
    }

    #[test]
    fn test_rejects_hard_link_outside_root() {
        use Item::{File, HardLink};
        let dir = tempdir().unwrap();
        let archive = tar_of(&[File("a", "x"), HardLink("b", "../a")]);
        let err = extract(&archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, ExtractError::UnsafePath(_)));
    }

    #[test]
    fn test_unsupported_format() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            extract(b"plain text", dir.path()),
            Err(ExtractError::UnsupportedFormat)
        ));
    }

    #[test]
    fn test_archive_root_single_dir() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("file.txt"), "content").unwrap();
        // Hidden entries (pax leftovers, .DS_Store) do not count.
        fs::write(dir.path().join(".DS_Store"), "junk").unwrap();

        assert_eq!(
            archive_root(dir.path(), &["file.txt".to_string()]).unwrap(),
            nested
        );
    }

    #[test]
    fn test_archive_root_flat() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("config")).unwrap();
        fs::create_dir(dir.path().join("scripts")).unwrap();

        let entries = ["config".to_string(), "scripts".to_string()];
        assert_eq!(archive_root(dir.path(), &entries).unwrap(), dir.path());
    }

    #[test]
    fn test_archive_root_keeps_top_level_entry() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("scripts")).unwrap();
        fs::write(dir.path().join("scripts/install.sh"), "echo ok").unwrap();

        let entries = ["scripts".to_string()];
        assert_eq!(archive_root(dir.path(), &entries).unwrap(), dir.path());
    }
}
