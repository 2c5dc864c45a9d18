//! `mclenv status`: what is on disk right now. Never downloads or builds.

use anyhow::Result;
use mclenv_core::model::{BuildOutputLayout, ProbeResult};
use mclenv_env::build::read_stamp;
use mclenv_env::install::environment_state;
use mclenv_env::runner::SystemRunner;
use mclenv_env::venv::VirtualEnv;
use serde_json::json;

use super::{dir_size, format_size, load_descriptor, resolve_paths};
use crate::cli::ProjectArgs;

pub fn cmd_status(project: &ProjectArgs, as_json: bool) -> Result<()> {
    let desc = load_descriptor(project, None)?;
    let paths = resolve_paths(project, &desc);
    let venv = VirtualEnv::new(&paths.venv_dir);
    let state = environment_state(&SystemRunner, &venv, &desc.binding.package);
    let layout = BuildOutputLayout::under(&paths.install_dir);
    let layout_check = layout.validate();
    let stamp = read_stamp(&layout.root);

    if as_json {
        let binding = match &state.binding {
            ProbeResult::Present => json!("present"),
            ProbeResult::Absent => json!("absent"),
            ProbeResult::ProbeError(e) => json!({ "error": e }),
        };
        let out = json!({
            "venv": {
                "path": paths.venv_dir,
                "present": state.venv_present,
            },
            "binding": {
                "package": desc.binding.package,
                "source": desc.binding.source.slug(),
                "pinned": desc.binding.source.is_reproducible(),
                "state": binding,
            },
            "native": {
                "source": desc.native.source.slug(),
                "pinned": desc.native.source.is_reproducible(),
                "install_dir": layout.root,
                "valid": layout_check.is_ok(),
                "build": stamp,
            },
            "store": {
                "path": paths.store_dir,
                "bytes": dir_size(&paths.store_dir),
            },
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let mark = |ok: bool| if ok { "✓" } else { "✗" };
    eprintln!(
        "{} venv      {}{}",
        mark(state.venv_present),
        paths.venv_dir.display(),
        if state.venv_present { "" } else { " (missing)" }
    );
    eprintln!(
        "{} {:<9} {} from {}",
        mark(state.binding == ProbeResult::Present),
        desc.binding.package,
        state.binding,
        desc.binding.source.slug()
    );
    match &layout_check {
        Ok(()) => eprintln!("✓ native    {}", layout.root.display()),
        Err(e) => eprintln!("✗ native    {}", e),
    }
    if let Some(stamp) = &stamp {
        eprintln!(
            "            {} {} built {} with {}",
            stamp.source, stamp.source_hash, stamp.built_at, stamp.toolchain
        );
    }
    eprintln!(
        "  store     {} ({})",
        paths.store_dir.display(),
        format_size(dir_size(&paths.store_dir))
    );
    for (what, src) in [("native", &desc.native.source), ("binding", &desc.binding.source)] {
        if !src.is_reproducible() {
            eprintln!(
                "  note: {} source {} has no pinned hash (run `mclenv prefetch {}`)",
                what,
                src.slug(),
                what
            );
        }
    }
    Ok(())
}
