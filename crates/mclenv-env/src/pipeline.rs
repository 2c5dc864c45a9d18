//! One activation, start to finish:
//! fetch native → [lock] build → fetch binding → stage → patch → install.
//!
//! Strictly sequential. Any step error ends the run; nothing is retried.

use std::path::{Path, PathBuf};

use mclenv_core::config::{Descriptor, PathsConfig};
use mclenv_core::error::{BootstrapResult, Step};
use mclenv_core::model::{PinnedSource, ToolchainSpec};

use crate::build::{BuiltLibrary, NativeBuilder};
use crate::fetch::{FetchedSource, SourceFetcher, SourceTransport};
use crate::install::{InstallReport, Installer};
use crate::lock::ActivationLock;
use crate::patch::{PatchReport, PathPatcher};
use crate::runner::CommandRunner;
use crate::stage::stage_binding;
use crate::toolchain::{resolve_python, resolve_toolchain};
use crate::venv::VirtualEnv;

/// Everything an activation needs, resolved up front.
#[derive(Debug, Clone)]
pub struct ActivationPlan {
    pub descriptor: Descriptor,
    pub paths: PathsConfig,
    pub toolchain: ToolchainSpec,
    /// Base interpreter used to create the venv.
    pub python: PathBuf,
    pub force_reinstall: bool,
}

impl ActivationPlan {
    /// Resolve compilers and python on `PATH`. The same toolchain goes to the
    /// native build and to pip.
    pub fn resolve(descriptor: Descriptor, project: &Path) -> BootstrapResult<Self> {
        let toolchain = resolve_toolchain(&descriptor.toolchain)?;
        let python = resolve_python(descriptor.toolchain.python.as_deref())?;
        let paths = PathsConfig::resolve(project, &descriptor.paths);
        Ok(Self {
            descriptor,
            paths,
            toolchain,
            python,
            force_reinstall: false,
        })
    }

    pub fn venv(&self) -> VirtualEnv {
        VirtualEnv::new(&self.paths.venv_dir)
    }
}

/// Which of the two sources, for `prefetch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Native,
    Binding,
}

impl SourceKind {
    pub fn select(self, descriptor: &Descriptor) -> &PinnedSource {
        match self {
            SourceKind::Native => &descriptor.native.source,
            SourceKind::Binding => &descriptor.binding.source,
        }
    }
}

/// Step notifications for the CLI's progress lines.
pub trait Progress {
    fn started(&self, step: Step, what: &str);
    fn finished(&self, step: Step, detail: &str);
}

/// Discards progress; tracing still logs every step.
pub struct NoProgress;

impl Progress for NoProgress {
    fn started(&self, _step: Step, _what: &str) {}
    fn finished(&self, _step: Step, _detail: &str) {}
}

#[derive(Debug, Clone)]
pub struct ActivationReport {
    pub native: FetchedSource,
    pub binding: FetchedSource,
    pub library: BuiltLibrary,
    pub patch: PatchReport,
    pub venv_created: bool,
    pub install: InstallReport,
}

pub struct Bootstrap<'a> {
    runner: &'a dyn CommandRunner,
    transport: &'a dyn SourceTransport,
    progress: &'a dyn Progress,
}

impl<'a> Bootstrap<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        transport: &'a dyn SourceTransport,
        progress: &'a dyn Progress,
    ) -> Self {
        Self {
            runner,
            transport,
            progress,
        }
    }

    /// Fetch one source into the store. Needs no toolchain, so `prefetch`
    /// can call it without a full plan.
    pub fn fetch(
        &self,
        descriptor: &Descriptor,
        paths: &PathsConfig,
        kind: SourceKind,
    ) -> BootstrapResult<FetchedSource> {
        let source = kind.select(descriptor);
        self.progress.started(Step::Fetch, &source.slug());
        let fetched = SourceFetcher::new(self.transport, &paths.store_dir, &descriptor.archive_url)
            .fetch(source)?;
        self.progress.finished(
            Step::Fetch,
            &format!(
                "{} {}",
                fetched.hash,
                if fetched.reused { "(stored)" } else { "(downloaded)" }
            ),
        );
        Ok(fetched)
    }

    pub fn activate(&self, plan: &ActivationPlan) -> BootstrapResult<ActivationReport> {
        let desc = &plan.descriptor;
        let builder = NativeBuilder::new(self.runner, &plan.paths, &desc.native);
        // Rule problems are config mistakes; surface them before any download.
        let patcher = PathPatcher::from_section(&desc.patch, &builder.layout())?;

        let native = self.fetch(desc, &plan.paths, SourceKind::Native)?;

        // A rebuild replaces the install tree that pip compiles against.
        let _lock = ActivationLock::acquire(&plan.paths.lock_file)?;

        self.progress.started(Step::Build, &native.source.slug());
        let library = builder.build(&native, &plan.toolchain)?;
        self.progress.finished(
            Step::Build,
            if library.reused {
                "up to date"
            } else {
                "built"
            },
        );

        let binding = self.fetch(desc, &plan.paths, SourceKind::Binding)?;

        self.progress
            .started(Step::Stage, &plan.paths.staging_dir.to_string_lossy());
        let tree = stage_binding(&binding, &plan.paths.staging_dir, &desc.binding.build_script)?;
        self.progress.finished(Step::Stage, "fresh copy");

        self.progress
            .started(Step::Patch, &tree.build_script.to_string_lossy());
        let patch = patcher.apply(&tree.build_script)?;
        self.progress.finished(
            Step::Patch,
            &format!("{} path(s) rewritten", patch.total_replaced()),
        );

        self.progress.started(Step::Install, &desc.binding.package);
        let venv = plan.venv();
        let venv_created = venv.ensure(self.runner, &plan.python)?;
        let install = Installer::new(
            self.runner,
            &venv,
            &plan.toolchain,
            &desc.binding.package,
            &desc.binding.module,
        )
        .with_lib_dir(&library.layout.lib_dir)
        .built_against(&library.stamp)
        .force_reinstall(plan.force_reinstall)
        .ensure_installed(&tree)?;
        self.progress
            .finished(Step::Install, &install.outcome.to_string());

        Ok(ActivationReport {
            native,
            binding,
            library,
            patch,
            venv_created,
            install,
        })
    }
}
