//! `mclenv run -- <cmd...>`: run a command with the venv and native library visible.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use mclenv_core::config::PathsConfig;
use mclenv_core::model::BuildOutputLayout;
use mclenv_env::venv::VirtualEnv;

use super::{load_descriptor, resolve_paths};
use crate::cli::ProjectArgs;

pub fn cmd_run(project: &ProjectArgs, cmd: &[String]) -> Result<i32> {
    let desc = load_descriptor(project, None)?;
    let paths = resolve_paths(project, &desc);
    let (program, args) = cmd
        .split_first()
        .context("no command given")?;
    let venv = active_venv(&paths)?;
    let mut child = env_command(&venv, &paths, &resolve_program(&venv, program));
    child.args(args).current_dir(&paths.project);
    spawn_and_wait(child, program)
}

/// The venv, or an error telling the user to activate first.
pub(crate) fn active_venv(paths: &PathsConfig) -> Result<VirtualEnv> {
    let venv = VirtualEnv::new(&paths.venv_dir);
    if !venv.is_present() {
        anyhow::bail!(
            "no environment at {}; run `mclenv activate` first",
            paths.venv_dir.display()
        );
    }
    Ok(venv)
}

pub(crate) fn env_command(venv: &VirtualEnv, paths: &PathsConfig, program: &Path) -> Command {
    let layout = BuildOutputLayout::under(&paths.install_dir);
    let lib_dir = layout.lib_dir.is_dir().then_some(layout.lib_dir.as_path());
    let mut c = Command::new(program);
    c.envs(venv.runtime_env(lib_dir));
    c.env_remove("PYTHONHOME");
    c
}

/// Prefer the venv's own executable (`python`, `pip`, console scripts).
fn resolve_program(venv: &VirtualEnv, program: &str) -> PathBuf {
    let in_venv = venv.bin_dir().join(program);
    if !program.contains(['/', '\\']) && in_venv.exists() {
        in_venv
    } else {
        PathBuf::from(program)
    }
}

pub(crate) fn spawn_and_wait(mut child: Command, label: &str) -> Result<i32> {
    tracing::debug!(?child, "spawn");
    let status = child
        .status()
        .with_context(|| format!("failed to run {}", label))?;
    Ok(status.code().unwrap_or(1))
}
