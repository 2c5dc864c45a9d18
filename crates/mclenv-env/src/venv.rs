//! The project's Python virtual environment.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use mclenv_core::error::{BootstrapError, BootstrapResult};
use mclenv_core::info_log;

use crate::runner::{CommandRunner, ToolCommand};

/// Dynamic loader search variable for the host platform.
pub const LIBRARY_PATH_VAR: &str = if cfg!(target_os = "macos") {
    "DYLD_LIBRARY_PATH"
} else if cfg!(windows) {
    "PATH"
} else {
    "LD_LIBRARY_PATH"
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualEnv {
    pub dir: PathBuf,
}

impl VirtualEnv {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// `bin/` on Unix, `Scripts/` on Windows (whichever the venv actually has).
    pub fn bin_dir(&self) -> PathBuf {
        let scripts = self.dir.join("Scripts");
        if cfg!(windows) || (scripts.join("python.exe").exists() && !self.dir.join("bin").exists()) {
            scripts
        } else {
            self.dir.join("bin")
        }
    }

    pub fn python(&self) -> PathBuf {
        let bin = self.bin_dir();
        if bin.ends_with("Scripts") {
            bin.join("python.exe")
        } else {
            bin.join("python")
        }
    }

    pub fn is_present(&self) -> bool {
        self.python().exists()
    }

    /// Create the venv with `base_python -m venv` unless it already exists.
    /// Returns true when it was created.
    pub fn ensure(&self, runner: &dyn CommandRunner, base_python: &Path) -> BootstrapResult<bool> {
        if self.is_present() {
            tracing::debug!(venv = %self.dir.display(), "venv present");
            return Ok(false);
        }
        info_log!("creating virtual environment at {}", self.dir.display());
        let cmd = ToolCommand::new(base_python)
            .args(["-m", "venv"])
            .path_arg(&self.dir);
        let out = runner.run(&cmd).map_err(|e| {
            BootstrapError::install(format!("cannot run {}: {}", base_python.display(), e))
        })?;
        if !out.success() {
            return Err(BootstrapError::Install {
                message: format!("`{}` failed with {}", cmd, out.status_label()),
                output: out.combined(),
            });
        }
        Ok(true)
    }

    /// Environment for processes that should see the venv and load the native
    /// library: venv `bin` first on `PATH`, `VIRTUAL_ENV`, and `lib_dir` first
    /// on the loader path.
    pub fn runtime_env(&self, lib_dir: Option<&Path>) -> Vec<(String, String)> {
        let mut envs = vec![
            (
                "PATH".to_string(),
                prepend_path(&self.bin_dir(), std::env::var_os("PATH")),
            ),
            (
                "VIRTUAL_ENV".to_string(),
                self.dir.to_string_lossy().to_string(),
            ),
        ];
        if let Some(lib) = lib_dir {
            if LIBRARY_PATH_VAR == "PATH" {
                envs[0].1 = prepend_path(lib, Some(OsString::from(&envs[0].1)));
            } else {
                envs.push((
                    LIBRARY_PATH_VAR.to_string(),
                    prepend_path(lib, std::env::var_os(LIBRARY_PATH_VAR)),
                ));
            }
        }
        envs
    }
}

fn prepend_path(first: &Path, rest: Option<OsString>) -> String {
    let mut parts = vec![first.to_path_buf()];
    if let Some(rest) = rest {
        parts.extend(std::env::split_paths(&rest).filter(|p| !p.as_os_str().is_empty()));
    }
    std::env::join_paths(parts)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| first.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ToolOutput;
    use std::cell::RefCell;

    struct Recorder(RefCell<Vec<ToolCommand>>);

    impl CommandRunner for Recorder {
        fn run(&self, cmd: &ToolCommand) -> std::io::Result<ToolOutput> {
            self.0.borrow_mut().push(cmd.clone());
            Ok(ToolOutput::ok(""))
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_layout() {
        let venv = VirtualEnv::new(Path::new("/p/.venv"));
        assert_eq!(venv.python(), PathBuf::from("/p/.venv/bin/python"));
        assert!(!venv.is_present());
    }

    #[test]
    fn test_ensure_creates_missing_venv() {
        let tmp = tempfile::tempdir().unwrap();
        let venv = VirtualEnv::new(&tmp.path().join(".venv"));
        let rec = Recorder(RefCell::new(Vec::new()));
        assert!(venv.ensure(&rec, Path::new("/usr/bin/python3")).unwrap());
        let calls = rec.0.borrow();
        assert_eq!(calls[0].program, PathBuf::from("/usr/bin/python3"));
        assert_eq!(calls[0].args[..2], ["-m".to_string(), "venv".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_skips_existing_venv() {
        let tmp = tempfile::tempdir().unwrap();
        let venv = VirtualEnv::new(tmp.path());
        std::fs::create_dir_all(tmp.path().join("bin")).unwrap();
        std::fs::write(tmp.path().join("bin/python"), "").unwrap();
        let rec = Recorder(RefCell::new(Vec::new()));
        assert!(!venv.ensure(&rec, Path::new("python3")).unwrap());
        assert!(rec.0.borrow().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_runtime_env_prepends() {
        let venv = VirtualEnv::new(Path::new("/p/.venv"));
        let envs = venv.runtime_env(Some(Path::new("/p/.mclenv/mcl/lib")));
        let get = |k: &str| envs.iter().find(|(n, _)| n == k).map(|(_, v)| v.clone()).unwrap();
        assert!(get("PATH").starts_with("/p/.venv/bin"));
        assert_eq!(get("VIRTUAL_ENV"), "/p/.venv");
        assert!(get(LIBRARY_PATH_VAR).starts_with("/p/.mclenv/mcl/lib"));
    }
}
