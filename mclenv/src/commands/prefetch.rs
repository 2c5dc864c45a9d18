//! `mclenv prefetch <native|binding>`: fetch one source and print the hash to pin.

use anyhow::Result;
use mclenv_env::fetch::DefaultTransport;
use mclenv_env::runner::SystemRunner;
use mclenv_env::{Bootstrap, SourceKind};

use super::{load_descriptor, resolve_paths, CliProgress};
use crate::cli::{ProjectArgs, SourceArg};

pub fn cmd_prefetch(source: SourceArg, project: &ProjectArgs) -> Result<()> {
    let desc = load_descriptor(project, None)?;
    let paths = resolve_paths(project, &desc);
    let kind = match source {
        SourceArg::Native => SourceKind::Native,
        SourceArg::Binding => SourceKind::Binding,
    };

    let transport = DefaultTransport::new();
    let fetched = Bootstrap::new(&SystemRunner, &transport, &CliProgress).fetch(&desc, &paths, kind)?;

    eprintln!("  {}", fetched.path.display());
    // stdout carries only the hash so it can be captured by scripts.
    println!("{}", fetched.hash);
    Ok(())
}
