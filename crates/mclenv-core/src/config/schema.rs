//! Resolved configuration structs.

use std::path::{Path, PathBuf};

use super::descriptor::PathsSection;
use super::env_keys::observability as obv_keys;
use super::loader::{env_bool, env_or};

/// Every on-disk location used by an activation, all absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathsConfig {
    pub project: PathBuf,
    pub state_dir: PathBuf,
    /// Content-addressed fetched trees.
    pub store_dir: PathBuf,
    /// Scratch copies of the native source for `make`.
    pub build_dir: PathBuf,
    /// Native install tree (`include/`, `lib/`).
    pub install_dir: PathBuf,
    /// Fixed location of the working install tree.
    pub staging_dir: PathBuf,
    pub venv_dir: PathBuf,
    pub lock_file: PathBuf,
}

impl PathsConfig {
    /// Relative entries in `section` are resolved against `project`.
    pub fn resolve(project: &Path, section: &PathsSection) -> Self {
        let project = absolutize(project, &std::env::current_dir().unwrap_or_default());
        let under_project = |p: &Option<PathBuf>, default: &str| match p {
            Some(p) => absolutize(p, &project),
            None => project.join(default),
        };
        let state_dir = under_project(&section.state_dir, ".mclenv");
        Self {
            store_dir: state_dir.join("store"),
            build_dir: state_dir.join("build"),
            install_dir: state_dir.join("mcl"),
            lock_file: state_dir.join("activation.lock"),
            staging_dir: under_project(&section.staging_dir, ".pymcl"),
            venv_dir: under_project(&section.venv_dir, ".venv"),
            state_dir,
            project,
        }
    }
}

fn absolutize(p: &Path, base: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

/// Logging settings: quiet, log level, JSON output.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
}

impl ObservabilityConfig {
    pub fn from_env() -> &'static Self {
        use std::sync::OnceLock;
        static CACHE: OnceLock<ObservabilityConfig> = OnceLock::new();
        CACHE.get_or_init(|| {
            let quiet = env_bool(obv_keys::MCLENV_QUIET, &[], false);
            let log_level = env_or(obv_keys::MCLENV_LOG_LEVEL, &[], || {
                "mclenv=info,mclenv_env=info,mclenv_core=info".to_string()
            });
            let log_json = env_bool(obv_keys::MCLENV_LOG_JSON, &[], false);
            Self {
                quiet,
                log_level,
                log_json,
            }
        })
    }
}
