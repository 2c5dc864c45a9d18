//! Idempotent installer: probe the venv for the binding and install only when
//! it is missing, or when it was built against a different native build.
//!
//! ```text
//! NotChecked --Invoke--> Checking --ProbePresent--> AlreadyInstalled
//!                           |  \--ProbeFailed--> InstallFailed
//!                           |--ProbeAbsent / ProbeStale / ForceInstall--> Installing
//! Installing --InstallSucceeded--> Installed
//! Installing --InstallFailed--> InstallFailed
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use mclenv_core::error::{BootstrapError, BootstrapResult};
use mclenv_core::info_log;
use mclenv_core::model::{EnvironmentState, ProbeResult, ToolchainSpec, WorkingInstallTree};
use thiserror::Error;

use crate::build::BuildStamp;
use crate::runner::{CommandRunner, ToolCommand};
use crate::venv::VirtualEnv;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    NotChecked,
    Checking,
    AlreadyInstalled,
    Installing,
    Installed,
    InstallFailed,
}

impl InstallState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InstallState::AlreadyInstalled | InstallState::Installed | InstallState::InstallFailed
        )
    }

    pub fn next(self, event: InstallEvent) -> Result<InstallState, InvalidTransition> {
        use InstallEvent as E;
        use InstallState as S;
        let to = match (self, event) {
            (S::NotChecked, E::Invoke) => S::Checking,
            (S::Checking, E::ProbePresent) => S::AlreadyInstalled,
            (S::Checking, E::ProbeAbsent)
            | (S::Checking, E::ProbeStale)
            | (S::Checking, E::ForceInstall) => S::Installing,
            (S::Checking, E::ProbeFailed) => S::InstallFailed,
            (S::Installing, E::InstallSucceeded) => S::Installed,
            (S::Installing, E::InstallFailed) => S::InstallFailed,
            (from, event) => return Err(InvalidTransition { from, event }),
        };
        Ok(to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallEvent {
    Invoke,
    ProbePresent,
    ProbeAbsent,
    /// Installed, but against a native build that has since been replaced.
    ProbeStale,
    ProbeFailed,
    /// `--force-reinstall`: skip the probe result.
    ForceInstall,
    InstallSucceeded,
    InstallFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal install transition: {from:?} on {event:?}")]
pub struct InvalidTransition {
    pub from: InstallState,
    pub event: InstallEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    AlreadyInstalled,
    Installed,
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallOutcome::AlreadyInstalled => write!(f, "already present"),
            InstallOutcome::Installed => write!(f, "installed"),
        }
    }
}

/// Tracks the state and records every step it went through.
struct Machine {
    state: InstallState,
    history: Vec<InstallState>,
}

impl Machine {
    fn new() -> Self {
        Self {
            state: InstallState::NotChecked,
            history: vec![InstallState::NotChecked],
        }
    }

    fn fire(&mut self, event: InstallEvent) -> BootstrapResult<InstallState> {
        let next = self
            .state
            .next(event)
            .map_err(|e| BootstrapError::install(e.to_string()))?;
        tracing::debug!(from = ?self.state, to = ?next, ?event, "install state");
        self.state = next;
        self.history.push(next);
        Ok(next)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub outcome: InstallOutcome,
    /// States visited, starting at `NotChecked`.
    pub states: Vec<InstallState>,
}

pub struct Installer<'a> {
    runner: &'a dyn CommandRunner,
    venv: &'a VirtualEnv,
    toolchain: &'a ToolchainSpec,
    package: String,
    module: String,
    lib_dir: Option<&'a Path>,
    build: Option<&'a BuildStamp>,
    force: bool,
}

/// Records, inside the venv, which native build the binding was compiled against.
pub const INSTALL_MARKER: &str = ".mclenv-binding.json";

impl<'a> Installer<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        venv: &'a VirtualEnv,
        toolchain: &'a ToolchainSpec,
        package: &str,
        module: &str,
    ) -> Self {
        Self {
            runner,
            venv,
            toolchain,
            package: package.to_string(),
            module: module.to_string(),
            lib_dir: None,
            build: None,
            force: false,
        }
    }

    /// Library dir put on the loader path for the import check.
    pub fn with_lib_dir(mut self, lib_dir: &'a Path) -> Self {
        self.lib_dir = Some(lib_dir);
        self
    }

    /// Reinstall when the binding in the venv was built against another stamp.
    pub fn built_against(mut self, stamp: &'a BuildStamp) -> Self {
        self.build = Some(stamp);
        self
    }

    pub fn force_reinstall(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// `pip show` the package. Exit 0 is present; pip's "not found" warning is
    /// absent; anything else means pip itself is unusable.
    pub fn probe(&self) -> ProbeResult {
        probe_package(self.runner, self.venv, &self.package)
    }

    pub fn ensure_installed(&self, tree: &WorkingInstallTree) -> BootstrapResult<InstallReport> {
        let mut m = Machine::new();
        m.fire(InstallEvent::Invoke)?;

        let mut reinstall = self.force;
        if self.force {
            info_log!("force reinstall of {}", self.package);
            m.fire(InstallEvent::ForceInstall)?;
        } else {
            match self.probe() {
                ProbeResult::Present if !self.matches_build() => {
                    m.fire(InstallEvent::ProbeStale)?;
                    info_log!("{} was built against another native build; reinstalling", self.package);
                    reinstall = true;
                }
                ProbeResult::Present => {
                    m.fire(InstallEvent::ProbePresent)?;
                    info_log!("{} already installed; skipping", self.package);
                    return Ok(InstallReport {
                        outcome: InstallOutcome::AlreadyInstalled,
                        states: m.history,
                    });
                }
                ProbeResult::Absent => {
                    m.fire(InstallEvent::ProbeAbsent)?;
                }
                ProbeResult::ProbeError(output) => {
                    m.fire(InstallEvent::ProbeFailed)?;
                    return Err(BootstrapError::Install {
                        message: format!("cannot determine whether {} is installed", self.package),
                        output,
                    });
                }
            }
        }

        if let Err(e) = self
            .install(tree, reinstall)
            .and_then(|_| self.check_import())
            .and_then(|_| self.write_marker())
        {
            m.fire(InstallEvent::InstallFailed)?;
            return Err(e);
        }
        m.fire(InstallEvent::InstallSucceeded)?;
        info_log!("{} installed into {}", self.package, self.venv.dir.display());
        Ok(InstallReport {
            outcome: InstallOutcome::Installed,
            states: m.history,
        })
    }

    fn marker_path(&self) -> PathBuf {
        self.venv.dir.join(INSTALL_MARKER)
    }

    /// Without a stamp to compare against, any installed binding counts.
    fn matches_build(&self) -> bool {
        let Some(wanted) = self.build else {
            return true;
        };
        fs::read_to_string(self.marker_path())
            .ok()
            .and_then(|s| serde_json::from_str::<BuildStamp>(&s).ok())
            .is_some_and(|recorded| &recorded == wanted)
    }

    fn write_marker(&self) -> BootstrapResult<()> {
        let Some(stamp) = self.build else {
            return Ok(());
        };
        let path = self.marker_path();
        let json = serde_json::to_string_pretty(stamp)
            .map_err(|e| BootstrapError::install(format!("serialize install marker: {}", e)))?;
        fs::write(&path, json)
            .map_err(|e| BootstrapError::install(format!("write {}: {}", path.display(), e)))
    }

    fn install(&self, tree: &WorkingInstallTree, reinstall: bool) -> BootstrapResult<()> {
        let mut cmd = ToolCommand::new(self.venv.python()).args(["-m", "pip", "install"]);
        if reinstall {
            cmd = cmd.arg("--force-reinstall");
        }
        let cmd = cmd
            .path_arg(&tree.root)
            .envs(self.toolchain.env_pairs())
            .current_dir(&tree.root);
        info_log!("pip install {} ({})", tree.root.display(), self.toolchain);
        let out = self
            .runner
            .run(&cmd)
            .map_err(|e| BootstrapError::install(format!("cannot run pip: {}", e)))?;
        if !out.success() {
            return Err(BootstrapError::Install {
                message: format!("pip install failed with {}", out.status_label()),
                output: out.combined(),
            });
        }
        Ok(())
    }

    /// Run from the venv dir so the staged source tree cannot shadow the
    /// installed module.
    fn check_import(&self) -> BootstrapResult<()> {
        let cmd = ToolCommand::new(self.venv.python())
            .arg("-c")
            .arg(format!("import {}", self.module))
            .envs(self.venv.runtime_env(self.lib_dir))
            .current_dir(&self.venv.dir);
        let out = self
            .runner
            .run(&cmd)
            .map_err(|e| BootstrapError::install(format!("cannot run python: {}", e)))?;
        if !out.success() {
            return Err(BootstrapError::Install {
                message: format!("installed, but `import {}` fails", self.module),
                output: out.combined(),
            });
        }
        Ok(())
    }
}

pub fn probe_package(runner: &dyn CommandRunner, venv: &VirtualEnv, package: &str) -> ProbeResult {
    let cmd = ToolCommand::new(venv.python()).args(["-m", "pip", "show", package]);
    match runner.run(&cmd) {
        Ok(out) if out.success() => ProbeResult::Present,
        Ok(out) if out.stderr.to_ascii_lowercase().contains("not found") => ProbeResult::Absent,
        Ok(out) => ProbeResult::ProbeError(format!(
            "`{}` failed with {}\n{}",
            cmd,
            out.status_label(),
            out.combined()
        )),
        Err(e) => ProbeResult::ProbeError(format!("cannot run {}: {}", venv.python().display(), e)),
    }
}

/// What `status` reports: does the venv exist, and is the binding in it.
pub fn environment_state(runner: &dyn CommandRunner, venv: &VirtualEnv, package: &str) -> EnvironmentState {
    let venv_present = venv.is_present();
    let binding = if venv_present {
        probe_package(runner, venv, package)
    } else {
        ProbeResult::Absent
    };
    EnvironmentState {
        venv_present,
        binding,
    }
}
