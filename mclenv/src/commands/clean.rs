//! `mclenv clean`: remove derived state.
//!
//! Without `--all` only the disposable dirs go (build scratch, staging). With
//! `--all` the source store, native install tree and venv go too; the next
//! activation then starts from nothing.

use std::path::PathBuf;

use anyhow::Result;
use mclenv_core::config::PathsConfig;
use mclenv_env::fsutil::remove_path;
use mclenv_env::lock::ActivationLock;

use super::{dir_size, format_size, load_descriptor, resolve_paths};
use crate::cli::ProjectArgs;

/// Existing targets, in removal order.
fn targets(paths: &PathsConfig, all: bool) -> Vec<(&'static str, PathBuf)> {
    let mut t = vec![
        ("build", paths.build_dir.clone()),
        ("staging", paths.staging_dir.clone()),
    ];
    if all {
        t.push(("install", paths.install_dir.clone()));
        t.push(("store", paths.store_dir.clone()));
        t.push(("venv", paths.venv_dir.clone()));
    }
    t.retain(|(_, p)| p.exists());
    t
}

pub fn cmd_clean(project: &ProjectArgs, all: bool, dry_run: bool) -> Result<()> {
    let desc = load_descriptor(project, None)?;
    let paths = resolve_paths(project, &desc);
    let entries: Vec<_> = targets(&paths, all)
        .into_iter()
        .map(|(what, p)| {
            let size = dir_size(&p);
            (what, p, size)
        })
        .collect();

    if entries.is_empty() {
        eprintln!("Nothing to clean under {}", paths.project.display());
        return Ok(());
    }

    let total: u64 = entries.iter().map(|(_, _, s)| s).sum();
    for (what, path, size) in &entries {
        eprintln!("  • {:<8} {} ({})", what, path.display(), format_size(*size));
    }
    eprintln!("Total: {}", format_size(total));

    if dry_run {
        eprintln!();
        eprintln!("(Dry run — no files removed. Remove --dry-run to delete.)");
        return Ok(());
    }

    // Don't pull the staging tree out from under a running activation.
    let _lock = ActivationLock::acquire(&paths.lock_file)?;

    let mut errors = 0;
    for (what, path, _) in &entries {
        if let Err(e) = remove_path(path) {
            eprintln!("  ✗ Failed to remove {}: {}", what, e);
            errors += 1;
        }
    }
    if errors == 0 {
        eprintln!("✓ Removed {} dir(s), freed {}", entries.len(), format_size(total));
        Ok(())
    } else {
        anyhow::bail!("{} of {} removals failed", errors, entries.len())
    }
}
