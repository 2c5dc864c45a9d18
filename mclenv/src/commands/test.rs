//! `mclenv test`: the project's unittest suites, run with the venv interpreter.

use anyhow::Result;

use super::run::{active_venv, env_command, spawn_and_wait};
use super::{load_descriptor, resolve_paths};
use crate::cli::ProjectArgs;

pub fn cmd_test(project: &ProjectArgs, pattern: &str, start_dir: &std::path::Path) -> Result<i32> {
    let desc = load_descriptor(project, None)?;
    let paths = resolve_paths(project, &desc);
    let venv = active_venv(&paths)?;

    let mut child = env_command(&venv, &paths, &venv.python());
    child
        .args(["-m", "unittest", "discover", "-v", "-p", pattern, "-s"])
        .arg(start_dir)
        .current_dir(&paths.project);
    eprintln!("→ [test] unittest discover {} ({})", start_dir.display(), pattern);
    let code = spawn_and_wait(child, "python -m unittest")?;
    if code == 0 {
        eprintln!("✓ [test] passed");
    } else {
        eprintln!("✗ [test] failed (exit {})", code);
    }
    Ok(code)
}
