//! Exclusive activation lock around the build → stage → patch → install sequence.
//!
//! Two activations sharing an install tree or staging dir would delete each
//! other's files, so the second one fails fast instead of waiting.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use mclenv_core::error::{BootstrapError, BootstrapResult};

/// Held for as long as the value lives; dropping it releases the lock.
pub struct ActivationLock {
    path: PathBuf,
    #[cfg(unix)]
    _guard: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _guard: File,
}

impl ActivationLock {
    pub fn acquire(path: &Path) -> BootstrapResult<Self> {
        let lock_err = |message: String| BootstrapError::Lock {
            path: path.to_path_buf(),
            message,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| lock_err(e.to_string()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| lock_err(e.to_string()))?;

        #[cfg(unix)]
        let mut guard = {
            use nix::errno::Errno;
            use nix::fcntl::{Flock, FlockArg};
            Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|(_, errno)| {
                if errno == Errno::EWOULDBLOCK {
                    lock_err(format!(
                        "another activation is running (pid {})",
                        holder_pid(path).unwrap_or_else(|| "unknown".into())
                    ))
                } else {
                    lock_err(errno.desc().to_string())
                }
            })?
        };
        #[cfg(not(unix))]
        let mut guard = file;

        write_pid(&mut guard).map_err(|e| lock_err(e.to_string()))?;
        tracing::debug!(lock = %path.display(), "activation lock held");
        Ok(Self {
            path: path.to_path_buf(),
            _guard: guard,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for ActivationLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationLock").field("path", &self.path).finish()
    }
}

fn write_pid(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    write!(file, "{}", std::process::id())?;
    file.flush()
}

#[cfg(unix)]
fn holder_pid(path: &Path) -> Option<String> {
    let pid = fs::read_to_string(path).ok()?;
    let pid = pid.trim();
    (!pid.is_empty()).then(|| pid.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_writes_pid_and_releases() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state/activation.lock");
        {
            let lock = ActivationLock::acquire(&path).unwrap();
            assert_eq!(lock.path(), path);
            let pid = fs::read_to_string(&path).unwrap();
            assert_eq!(pid, std::process::id().to_string());
        }
        ActivationLock::acquire(&path).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_second_holder_fails_fast() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("activation.lock");
        let _held = ActivationLock::acquire(&path).unwrap();
        // flock locks belong to the open file description, so a second open in
        // the same process contends like another process would.
        let err = ActivationLock::acquire(&path).unwrap_err();
        assert_eq!(err.step(), mclenv_core::error::Step::Lock);
        assert!(err.to_string().contains("another activation"), "{}", err);
    }
}
