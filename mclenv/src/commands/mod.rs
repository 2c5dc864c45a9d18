//! CLI commands. Each module is one subcommand; shared descriptor loading and
//! progress output live here.

pub mod activate;
pub mod clean;
pub mod prefetch;
pub mod run;
pub mod status;
pub mod test;

use mclenv_core::config::{Descriptor, PathsConfig};
use mclenv_core::error::{BootstrapError, Step};
use mclenv_env::Progress;

use crate::cli::{ProjectArgs, ToolchainArgs};

/// Descriptor with every layer applied: defaults, file, env, then CLI flags.
pub fn load_descriptor(
    project: &ProjectArgs,
    toolchain: Option<&ToolchainArgs>,
) -> Result<Descriptor, BootstrapError> {
    let mut desc = Descriptor::load(&project.project, project.config.as_deref())?;
    if let Some(tc) = toolchain {
        if let Some(cc) = &tc.cc {
            desc.toolchain.cc = cc.clone();
        }
        if let Some(cxx) = &tc.cxx {
            desc.toolchain.cxx = cxx.clone();
        }
        if let Some(py) = &tc.python {
            desc.toolchain.python = Some(py.clone());
        }
        desc.validate()?;
    }
    Ok(desc)
}

pub fn resolve_paths(project: &ProjectArgs, desc: &Descriptor) -> PathsConfig {
    PathsConfig::resolve(&project.project, &desc.paths)
}

/// One stderr line per step start and finish.
pub struct CliProgress;

impl Progress for CliProgress {
    fn started(&self, step: Step, what: &str) {
        if !mclenv_core::log::is_quiet() {
            eprintln!("→ [{}] {}", step, what);
        }
    }

    fn finished(&self, step: Step, detail: &str) {
        eprintln!("✓ [{}] {}", step, detail);
    }
}

/// Compute total size of a directory recursively.
pub fn dir_size(path: &std::path::Path) -> u64 {
    let mut total: u64 = 0;
    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            let p = entry.path();
            match entry.file_type() {
                Ok(t) if t.is_dir() => total += dir_size(&p),
                Ok(t) if t.is_symlink() => {}
                _ => {
                    if let Ok(meta) = p.metadata() {
                        total += meta.len();
                    }
                }
            }
        }
    } else if let Ok(meta) = path.metadata() {
        total = meta.len();
    }
    total
}

/// Format byte size to human-readable string.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
