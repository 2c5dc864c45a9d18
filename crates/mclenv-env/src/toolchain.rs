//! Resolve the compiler pair and the base Python interpreter to absolute paths.
//!
//! Resolution happens once per activation and the resulting [`ToolchainSpec`]
//! is handed to both the native build and the binding install.

use std::path::PathBuf;

use mclenv_core::config::ToolchainSection;
use mclenv_core::error::{BootstrapError, BootstrapResult};
use mclenv_core::model::ToolchainSpec;

/// Look up `cc` / `cxx` on `PATH` (or check them, when given as paths).
/// A compiler that cannot be found is a build failure: there is no fallback
/// to whatever the system default happens to be.
pub fn resolve_toolchain(section: &ToolchainSection) -> BootstrapResult<ToolchainSpec> {
    let find = |what: &str, name: &str| {
        which::which(name).map_err(|e| {
            BootstrapError::build(format!("{} compiler '{}' not found: {}", what, name, e))
        })
    };
    let spec = ToolchainSpec {
        cc: find("C", &section.cc)?,
        cxx: find("C++", &section.cxx)?,
    };
    tracing::debug!(toolchain = %spec, "resolved toolchain");
    Ok(spec)
}

/// The configured interpreter, or the first of `python3`, `python` on `PATH`.
pub fn resolve_python(configured: Option<&str>) -> BootstrapResult<PathBuf> {
    if let Some(name) = configured {
        return which::which(name).map_err(|e| {
            BootstrapError::install(format!("python interpreter '{}' not found: {}", name, e))
        });
    }
    for name in ["python3", "python"] {
        if let Ok(p) = which::which(name) {
            return Ok(p);
        }
    }
    Err(BootstrapError::install("python3 or python not found in PATH"))
}
