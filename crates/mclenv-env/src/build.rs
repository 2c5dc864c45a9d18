//! Native library builder: fetched source + toolchain → install tree.
//!
//! The read-only store tree is copied to a scratch directory, `make` runs there
//! with explicit `CC`/`CXX` overrides, then the configured header namespaces and
//! every library artifact are copied into the install tree. A stamp file written
//! last records what was built; a matching stamp skips the whole step.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use mclenv_core::config::{NativeSection, PathsConfig};
use mclenv_core::error::{BootstrapError, BootstrapResult};
use mclenv_core::info_log;
use mclenv_core::model::{BuildOutputLayout, ContentHash, ToolchainSpec};
use serde::{Deserialize, Serialize};

use crate::fetch::FetchedSource;
use crate::fsutil;
use crate::runner::{CommandRunner, ToolCommand};

pub const BUILD_STAMP: &str = ".mclenv-build.json";

/// What the current install tree was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStamp {
    pub source: String,
    pub source_hash: ContentHash,
    pub toolchain: ToolchainSpec,
    pub headers: Vec<String>,
    pub make_targets: Vec<String>,
    pub built_at: String,
}

impl BuildStamp {
    /// Everything except the timestamp decides whether a rebuild is needed.
    fn same_build(&self, other: &BuildStamp) -> bool {
        self.source_hash == other.source_hash
            && self.toolchain == other.toolchain
            && self.headers == other.headers
            && self.make_targets == other.make_targets
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltLibrary {
    pub layout: BuildOutputLayout,
    /// Stamp of the install tree; a binding built against another one is stale.
    pub stamp: BuildStamp,
    pub reused: bool,
}

pub struct NativeBuilder<'a> {
    runner: &'a dyn CommandRunner,
    build_root: PathBuf,
    install_dir: PathBuf,
    headers: Vec<String>,
    make_targets: Vec<String>,
    jobs: usize,
}

impl<'a> NativeBuilder<'a> {
    pub fn new(runner: &'a dyn CommandRunner, paths: &PathsConfig, native: &NativeSection) -> Self {
        let jobs = native.jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        Self {
            runner,
            build_root: paths.build_dir.clone(),
            install_dir: paths.install_dir.clone(),
            headers: native.headers.clone(),
            make_targets: native.make_targets.clone(),
            jobs,
        }
    }

    pub fn layout(&self) -> BuildOutputLayout {
        BuildOutputLayout::under(&self.install_dir)
    }

    pub fn build(
        &self,
        fetched: &FetchedSource,
        toolchain: &ToolchainSpec,
    ) -> BootstrapResult<BuiltLibrary> {
        let layout = self.layout();
        let wanted = BuildStamp {
            source: fetched.source.slug(),
            source_hash: fetched.hash.clone(),
            toolchain: toolchain.clone(),
            headers: self.headers.clone(),
            make_targets: self.make_targets.clone(),
            built_at: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        };

        if let Some(existing) = read_stamp(&layout.root) {
            if existing.same_build(&wanted) && layout.validate().is_ok() {
                info_log!(
                    "{}: install tree is current (built {})",
                    existing.source,
                    existing.built_at
                );
                return Ok(BuiltLibrary {
                    layout,
                    stamp: existing,
                    reused: true,
                });
            }
            tracing::debug!("build stamp differs; rebuilding");
        }

        let work = self.build_root.join(format!(
            "{}-{}",
            fetched.source.repo,
            fetched.hash.short(12)
        ));
        self.prepare_workdir(&fetched.path, &work)?;

        let cmd = self.make_command(&work, toolchain);
        info_log!("building {} with {}", fetched.source.slug(), toolchain);
        let out = self
            .runner
            .run(&cmd)
            .map_err(|e| BootstrapError::build(format!("cannot run {}: {}", cmd.program_name(), e)))?;
        if !out.success() {
            return Err(BootstrapError::Build {
                message: format!("`{}` failed with {}", cmd, out.status_label()),
                output: out.combined(),
            });
        }

        self.install(&work, &layout)?;
        layout
            .validate()
            .map_err(|e| BootstrapError::build(format!("install tree incomplete: {}", e)))?;
        write_stamp(&layout.root, &wanted)?;

        if let Err(e) = fsutil::remove_path(&work) {
            tracing::debug!("leaving build dir behind: {}", e);
        }
        info_log!("installed headers and libraries into {}", layout.root.display());
        Ok(BuiltLibrary {
            layout,
            stamp: wanted,
            reused: false,
        })
    }

    fn make_command(&self, work: &Path, toolchain: &ToolchainSpec) -> ToolCommand {
        let [(_, cc), (_, cxx)] = toolchain.env_pairs();
        ToolCommand::new("make")
            .arg(format!("-j{}", self.jobs))
            .arg(format!("CC={}", cc))
            .arg(format!("CXX={}", cxx))
            .args(self.make_targets.iter().cloned())
            .envs(toolchain.env_pairs())
            .current_dir(work)
    }

    fn prepare_workdir(&self, src: &Path, work: &Path) -> BootstrapResult<()> {
        let io_err = |e: fsutil::PathIoError| {
            BootstrapError::build(format!("preparing build dir: {}", e))
        };
        fsutil::remove_path(work).map_err(io_err)?;
        fsutil::copy_tree(src, work).map_err(io_err)?;
        fsutil::set_tree_writable(work, true).map_err(io_err)?;
        Ok(())
    }

    /// Copy header namespaces and library artifacts into a fresh install tree.
    fn install(&self, work: &Path, layout: &BuildOutputLayout) -> BootstrapResult<()> {
        let io_err = |e: fsutil::PathIoError| {
            BootstrapError::build(format!("populating install tree: {}", e))
        };
        fsutil::remove_path(&layout.root).map_err(io_err)?;

        for ns in &self.headers {
            let src = work.join("include").join(ns);
            if !src.is_dir() {
                return Err(BootstrapError::build(format!(
                    "header namespace '{}' not found at {}",
                    ns,
                    src.display()
                )));
            }
            fsutil::copy_tree(&src, &layout.include_dir.join(ns)).map_err(io_err)?;
        }

        let lib_src = work.join("lib");
        if !fsutil::has_visible_entries(&lib_src) {
            return Err(BootstrapError::build(format!(
                "build produced no library artifacts in {}",
                lib_src.display()
            )));
        }
        fs::create_dir_all(&layout.lib_dir)
            .map_err(|e| BootstrapError::build(format!("create {}: {}", layout.lib_dir.display(), e)))?;
        let entries = fs::read_dir(&lib_src)
            .map_err(|e| BootstrapError::build(format!("read {}: {}", lib_src.display(), e)))?;
        let mut copied = 0usize;
        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let src = entry.path();
            let dest = layout.lib_dir.join(&name);
            if src.is_dir() && !src.is_symlink() {
                copied += fsutil::copy_tree(&src, &dest).map_err(io_err)?;
            } else {
                fsutil::copy_entry(&src, &dest).map_err(io_err)?;
                copied += 1;
            }
        }
        tracing::debug!(copied, "library artifacts installed");
        Ok(())
    }
}

pub fn read_stamp(root: &Path) -> Option<BuildStamp> {
    let content = fs::read_to_string(root.join(BUILD_STAMP)).ok()?;
    serde_json::from_str(&content).ok()
}

fn write_stamp(root: &Path, stamp: &BuildStamp) -> BootstrapResult<()> {
    let path = root.join(BUILD_STAMP);
    let json = serde_json::to_string_pretty(stamp)
        .map_err(|e| BootstrapError::build(format!("serialize build stamp: {}", e)))?;
    fs::write(&path, json)
        .map_err(|e| BootstrapError::build(format!("write {}: {}", path.display(), e)))
}
