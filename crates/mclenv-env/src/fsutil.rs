//! Tree copy and permission helpers shared by the fetch, build and stage steps.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

/// An I/O error tagged with the path it happened on.
#[derive(Debug, Error)]
#[error("{}: {source}", .path.display())]
pub struct PathIoError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

pub(crate) trait IoResultExt<T> {
    fn at(self, path: &Path) -> Result<T, PathIoError>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T, PathIoError> {
        self.map_err(|source| PathIoError {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Copy `src` into `dest` recursively, recreating symlinks as symlinks.
/// Returns the number of files and links copied.
pub fn copy_tree(src: &Path, dest: &Path) -> Result<usize, PathIoError> {
    fs::create_dir_all(dest).at(dest)?;
    let mut copied = 0;
    for entry in fs::read_dir(src).at(src)? {
        let entry = entry.at(src)?;
        let src_path = entry.path();
        let dest_path = dest.join(entry.file_name());
        let file_type = entry.file_type().at(&src_path)?;
        if file_type.is_symlink() {
            copy_symlink(&src_path, &dest_path)?;
            copied += 1;
        } else if file_type.is_dir() {
            copied += copy_tree(&src_path, &dest_path)?;
        } else {
            fs::copy(&src_path, &dest_path).at(&src_path)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Copy a single file, or recreate a symlink pointing at the same target.
pub fn copy_entry(src: &Path, dest: &Path) -> Result<(), PathIoError> {
    if fs::symlink_metadata(src).at(src)?.file_type().is_symlink() {
        return copy_symlink(src, dest);
    }
    fs::copy(src, dest).at(src).map(|_| ())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> Result<(), PathIoError> {
    let target = fs::read_link(src).at(src)?;
    std::os::unix::fs::symlink(&target, dest).at(dest)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> Result<(), PathIoError> {
    fs::copy(src, dest).at(src).map(|_| ())
}

/// Make every regular file under `root` read-only (`writable == false`) or
/// owner-writable again. Directories are left alone so trees stay removable.
pub fn set_tree_writable(root: &Path, writable: bool) -> Result<(), PathIoError> {
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            PathIoError {
                path,
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "walk error")),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let mut perms = entry.metadata().map_err(io::Error::from).at(path)?.permissions();
        set_writable_bits(&mut perms, writable);
        fs::set_permissions(path, perms).at(path)?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_writable_bits(perms: &mut fs::Permissions, writable: bool) {
    use std::os::unix::fs::PermissionsExt;
    let mode = perms.mode();
    perms.set_mode(if writable { mode | 0o200 } else { mode & !0o222 });
}

#[cfg(not(unix))]
fn set_writable_bits(perms: &mut fs::Permissions, writable: bool) {
    perms.set_readonly(!writable);
}

/// Remove a file or directory tree if it exists. Read-only files are made
/// writable first.
pub fn remove_path(path: &Path) -> Result<bool, PathIoError> {
    let meta = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).at(path),
    };
    if meta.is_dir() {
        set_tree_writable(path, true)?;
        fs::remove_dir_all(path).at(path)?;
    } else {
        fs::remove_file(path).at(path)?;
    }
    Ok(true)
}

/// True when `dir` contains at least one entry whose name does not start with a dot.
pub fn has_visible_entries(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|it| {
            it.flatten()
                .any(|e| !e.file_name().to_string_lossy().starts_with('.'))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_tree_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("a/b")).unwrap();
        fs::write(src.join("top.txt"), "top").unwrap();
        fs::write(src.join("a/b/deep.txt"), "deep").unwrap();

        let dest = tmp.path().join("dest");
        assert_eq!(copy_tree(&src, &dest).unwrap(), 2);
        assert_eq!(fs::read_to_string(dest.join("a/b/deep.txt")).unwrap(), "deep");
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_tree_keeps_symlinks() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("libmcl.so.1"), "elf").unwrap();
        std::os::unix::fs::symlink("libmcl.so.1", src.join("libmcl.so")).unwrap();

        let dest = tmp.path().join("dest");
        copy_tree(&src, &dest).unwrap();
        assert_eq!(
            fs::read_link(dest.join("libmcl.so")).unwrap(),
            PathBuf::from("libmcl.so.1")
        );
    }

    #[test]
    fn test_readonly_round_trip_and_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("tree");
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("sub/f.txt"), "x").unwrap();

        set_tree_writable(&root, false).unwrap();
        assert!(fs::metadata(root.join("sub/f.txt")).unwrap().permissions().readonly());

        set_tree_writable(&root, true).unwrap();
        assert!(!fs::metadata(root.join("sub/f.txt")).unwrap().permissions().readonly());

        set_tree_writable(&root, false).unwrap();
        assert!(remove_path(&root).unwrap());
        assert!(!root.exists());
        assert!(!remove_path(&root).unwrap());
    }

    #[test]
    fn test_has_visible_entries_ignores_dotfiles() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(".emptydir"), "").unwrap();
        assert!(!has_visible_entries(tmp.path()));
        fs::write(tmp.path().join("libmcl.a"), "").unwrap();
        assert!(has_visible_entries(tmp.path()));
    }
}
