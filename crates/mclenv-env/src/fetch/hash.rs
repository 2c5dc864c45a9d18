//! Content hash of an unpacked source tree.
//!
//! The hash covers relative paths, entry kinds, the executable bit, file bytes
//! and symlink targets, walked in sorted order. Timestamps, ownership and the
//! write bits are ignored, so the same archive content always hashes the same
//! no matter how it was compressed or when it was unpacked.

use std::fs::File;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use mclenv_core::model::ContentHash;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

pub fn tree_hash(root: &Path) -> Result<ContentHash> {
    let mut hasher = Sha256::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .context("entry outside tree root")?;
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path())
                .with_context(|| format!("read link {}", entry.path().display()))?;
            hasher.update(b"link\0");
            hasher.update(rel.as_bytes());
            hasher.update(b"\0");
            hasher.update(target.to_string_lossy().as_bytes());
            hasher.update(b"\0");
        } else if file_type.is_dir() {
            hasher.update(b"dir\0");
            hasher.update(rel.as_bytes());
            hasher.update(b"\0");
        } else {
            let meta = entry
                .metadata()
                .with_context(|| format!("stat {}", entry.path().display()))?;
            hasher.update(b"file\0");
            hasher.update(rel.as_bytes());
            hasher.update(b"\0");
            hasher.update(if is_executable(&meta) { b"x" } else { b"-" });
            hasher.update(meta.len().to_le_bytes());
            let mut f = File::open(entry.path())
                .with_context(|| format!("open {}", entry.path().display()))?;
            io::copy(&mut f, &mut hasher)
                .with_context(|| format!("read {}", entry.path().display()))?;
        }
    }
    Ok(ContentHash::from_digest(&hasher.finalize()))
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample(root: &Path) {
        fs::create_dir_all(root.join("include/mcl")).unwrap();
        fs::write(root.join("include/mcl/bn.h"), "#pragma once\n").unwrap();
        fs::write(root.join("Makefile"), "all:\n").unwrap();
    }

    #[test]
    fn test_same_content_same_hash() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        sample(a.path());
        sample(b.path());
        assert_eq!(tree_hash(a.path()).unwrap(), tree_hash(b.path()).unwrap());
    }

    #[test]
    fn test_content_and_path_changes_alter_hash() {
        let a = tempfile::tempdir().unwrap();
        sample(a.path());
        let base = tree_hash(a.path()).unwrap();

        fs::write(a.path().join("Makefile"), "all: lib\n").unwrap();
        let edited = tree_hash(a.path()).unwrap();
        assert_ne!(base, edited);

        fs::rename(a.path().join("Makefile"), a.path().join("GNUmakefile")).unwrap();
        assert_ne!(edited, tree_hash(a.path()).unwrap());
    }

    #[test]
    fn test_write_bit_is_ignored() {
        let a = tempfile::tempdir().unwrap();
        sample(a.path());
        let before = tree_hash(a.path()).unwrap();
        crate::fsutil::set_tree_writable(a.path(), false).unwrap();
        assert_eq!(before, tree_hash(a.path()).unwrap());
        crate::fsutil::set_tree_writable(a.path(), true).unwrap();
    }

    #[test]
    fn test_empty_dir_counts() {
        let a = tempfile::tempdir().unwrap();
        sample(a.path());
        let before = tree_hash(a.path()).unwrap();
        fs::create_dir(a.path().join("obj")).unwrap();
        assert_ne!(before, tree_hash(a.path()).unwrap());
    }
}
