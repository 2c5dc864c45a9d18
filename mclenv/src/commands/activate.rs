//! `mclenv activate`

use anyhow::Result;
use mclenv_env::fetch::DefaultTransport;
use mclenv_env::install::InstallOutcome;
use mclenv_env::runner::SystemRunner;
use mclenv_env::{ActivationPlan, Bootstrap};

use super::{load_descriptor, CliProgress};
use crate::cli::{ProjectArgs, ToolchainArgs};

pub fn cmd_activate(project: &ProjectArgs, toolchain: &ToolchainArgs, force_reinstall: bool) -> Result<()> {
    let desc = load_descriptor(project, Some(toolchain))?;
    let mut plan = ActivationPlan::resolve(desc, &project.project)?;
    plan.force_reinstall = force_reinstall;
    tracing::debug!(?plan.paths, toolchain = %plan.toolchain, "activation plan");

    let runner = SystemRunner;
    let transport = DefaultTransport::new();
    let report = Bootstrap::new(&runner, &transport, &CliProgress).activate(&plan)?;

    let package = &plan.descriptor.binding.package;
    match report.install.outcome {
        InstallOutcome::AlreadyInstalled => {
            eprintln!("✓ {} already present in {}", package, plan.paths.venv_dir.display())
        }
        InstallOutcome::Installed => {
            eprintln!("✓ {} installed into {}", package, plan.paths.venv_dir.display())
        }
    }
    for fetched in [&report.native, &report.binding] {
        if !fetched.source.is_reproducible() {
            eprintln!(
                "  note: {} is not hash-pinned; current tree is {}",
                fetched.source.slug(),
                fetched.hash
            );
        }
    }
    Ok(())
}
