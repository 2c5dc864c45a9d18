//! Full activation against an in-memory "forge" and a scripted toolchain.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use mclenv_core::config::{Descriptor, PathsConfig};
use mclenv_core::error::{BootstrapError, Step};
use mclenv_core::model::{ContentHash, ToolchainSpec};
use mclenv_env::fetch::SourceTransport;
use mclenv_env::install::{InstallOutcome, InstallState};
use mclenv_env::lock::ActivationLock;
use mclenv_env::runner::{CommandRunner, ToolCommand, ToolOutput};
use mclenv_env::venv::VirtualEnv;
use mclenv_env::{ActivationPlan, Bootstrap, NoProgress, SourceKind};

const SETUP_PY: &str = "from setuptools import setup, Extension\n\
ext = Extension('pymcl', sources=['pymcl.cpp'], include_dirs=['mcl/include'], library_dirs=['mcl/lib'], libraries=['mcl'])\n\
setup(name='pymcl', ext_modules=[ext])\n";

fn tarball(prefix: &str, files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}/{}", prefix, name), content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

struct Forge {
    archives: HashMap<String, Vec<u8>>,
    downloads: Cell<usize>,
}

impl Forge {
    fn new(setup_py: &str) -> Self {
        let mut archives = HashMap::new();
        archives.insert(
            "mem://herumi/mcl/v2.14".to_string(),
            tarball(
                "mcl-2.14",
                &[
                    ("Makefile", "all:\n\t$(CXX) -c src/fp.cpp\n"),
                    ("include/mcl/bn.h", "#pragma once\n"),
                    ("include/cybozu/atoi.hpp", "#pragma once\n"),
                    ("lib/.emptydir", ""),
                    ("src/fp.cpp", "int fp;\n"),
                ],
            ),
        );
        archives.insert(
            "mem://Jemtaly/pymcl/main".to_string(),
            tarball("pymcl-main", &[("setup.py", setup_py), ("pymcl.cpp", "// ext\n")]),
        );
        Self {
            archives,
            downloads: Cell::new(0),
        }
    }
}

impl SourceTransport for Forge {
    fn download(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        self.downloads.set(self.downloads.get() + 1);
        self.archives
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("server returned HTTP 404"))
    }
}

/// Simulates make, venv and pip with just enough side effects for the
/// pipeline's own checks to pass.
#[derive(Default)]
struct Host {
    installed: Cell<bool>,
    calls: RefCell<Vec<ToolCommand>>,
}

impl Host {
    fn count(&self, pred: impl Fn(&ToolCommand) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    fn makes(&self) -> usize {
        self.count(|c| c.program_name() == "make")
    }

    fn pip_installs(&self) -> usize {
        self.count(|c| c.args.get(2).map(String::as_str) == Some("install"))
    }
}

impl CommandRunner for Host {
    fn run(&self, cmd: &ToolCommand) -> std::io::Result<ToolOutput> {
        self.calls.borrow_mut().push(cmd.clone());
        if cmd.program_name() == "make" {
            let lib = cmd.cwd.as_ref().unwrap().join("lib");
            fs::write(lib.join("libmcl.a"), "!<arch>\n")?;
            return Ok(ToolOutput::ok(""));
        }
        let args: Vec<&str> = cmd.args.iter().map(String::as_str).collect();
        let out = match args.as_slice() {
            ["-m", "venv", dir] => {
                let python = VirtualEnv::new(Path::new(dir)).python();
                fs::create_dir_all(python.parent().unwrap())?;
                fs::write(&python, "")?;
                ToolOutput::ok("")
            }
            ["-m", "pip", "show", _] if self.installed.get() => ToolOutput::ok("Name: pymcl\n"),
            ["-m", "pip", "show", pkg] => {
                ToolOutput::failed(1, &format!("WARNING: Package(s) not found: {}\n", pkg))
            }
            ["-m", "pip", "install", ..] => {
                self.installed.set(true);
                ToolOutput::ok("Successfully installed pymcl\n")
            }
            ["-c", _] => ToolOutput::ok(""),
            other => ToolOutput::failed(127, &format!("unexpected command {:?}", other)),
        };
        Ok(out)
    }
}

fn plan(project: &Path) -> ActivationPlan {
    let mut descriptor = Descriptor::default();
    descriptor.archive_url = "mem://{owner}/{repo}/{rev}".into();
    descriptor.native.jobs = Some(2);
    ActivationPlan {
        paths: PathsConfig::resolve(project, &descriptor.paths),
        descriptor,
        toolchain: ToolchainSpec {
            cc: PathBuf::from("/usr/bin/cc"),
            cxx: PathBuf::from("/usr/bin/c++"),
        },
        python: PathBuf::from("/usr/bin/python3"),
        force_reinstall: false,
    }
}

#[test]
fn second_activation_is_a_no_op() {
    let tmp = tempfile::tempdir().unwrap();
    let forge = Forge::new(SETUP_PY);
    let host = Host::default();
    let plan = plan(tmp.path());
    let boot = Bootstrap::new(&host, &forge, &NoProgress);

    let first = boot.activate(&plan).unwrap();
    assert_eq!(first.install.outcome, InstallOutcome::Installed);
    assert!(first.venv_created);
    assert!(!first.library.reused);
    first.library.layout.validate().unwrap();
    assert!(first.library.layout.include_dir.join("mcl/bn.h").is_file());
    assert!(first.library.layout.include_dir.join("cybozu/atoi.hpp").is_file());
    assert!(first.library.layout.lib_dir.join("libmcl.a").is_file());

    let patched = fs::read_to_string(plan.paths.staging_dir.join("setup.py")).unwrap();
    let include = first.library.layout.include_dir.to_string_lossy().replace('\\', "/");
    assert!(patched.contains(&format!("include_dirs=['{}']", include)), "{}", patched);
    assert!(patched.starts_with("import os\n"));

    let makes = host.makes();
    let installs = host.pip_installs();
    assert_eq!((makes, installs), (1, 1));

    let second = boot.activate(&plan).unwrap();
    assert_eq!(second.install.outcome, InstallOutcome::AlreadyInstalled);
    assert_eq!(
        second.install.states,
        vec![
            InstallState::NotChecked,
            InstallState::Checking,
            InstallState::AlreadyInstalled
        ]
    );
    assert!(second.library.reused);
    assert!(!second.venv_created);
    assert_eq!(host.makes(), makes);
    assert_eq!(host.pip_installs(), installs);
    assert_eq!(first.native.hash, second.native.hash);
    assert_eq!(first.binding.hash, second.binding.hash);
}

#[test]
fn toolchain_change_rebuilds_and_reinstalls() {
    let tmp = tempfile::tempdir().unwrap();
    let forge = Forge::new(SETUP_PY);
    let host = Host::default();
    let mut plan = plan(tmp.path());
    let boot = Bootstrap::new(&host, &forge, &NoProgress);
    boot.activate(&plan).unwrap();

    plan.toolchain = ToolchainSpec {
        cc: PathBuf::from("/usr/bin/clang"),
        cxx: PathBuf::from("/usr/bin/clang++"),
    };
    let second = boot.activate(&plan).unwrap();
    assert!(!second.library.reused);
    assert_eq!(second.install.outcome, InstallOutcome::Installed);
    assert_eq!((host.makes(), host.pip_installs()), (2, 2));

    let calls = host.calls.borrow();
    let last_install = calls
        .iter()
        .rev()
        .find(|c| c.args.get(2).map(String::as_str) == Some("install"))
        .unwrap();
    assert!(last_install.args.iter().any(|a| a == "--force-reinstall"));
    assert!(last_install
        .envs
        .contains(&("CXX".to_string(), "/usr/bin/clang++".to_string())));
}

#[cfg(unix)]
#[test]
fn held_lock_stops_before_build() {
    let tmp = tempfile::tempdir().unwrap();
    let forge = Forge::new(SETUP_PY);
    let host = Host::default();
    let plan = plan(tmp.path());
    let _held = ActivationLock::acquire(&plan.paths.lock_file).unwrap();

    let err = Bootstrap::new(&host, &forge, &NoProgress)
        .activate(&plan)
        .unwrap_err();
    assert!(matches!(err, BootstrapError::Lock { .. }), "{}", err);
    assert_eq!(host.makes(), 0);
    assert!(!plan.paths.install_dir.exists());
}

#[test]
fn prefetched_hash_pins_the_native_source() {
    let tmp = tempfile::tempdir().unwrap();
    let forge = Forge::new(SETUP_PY);
    let host = Host::default();
    let mut plan = plan(tmp.path());
    let boot = Bootstrap::new(&host, &forge, &NoProgress);

    let fetched = boot
        .fetch(&plan.descriptor, &plan.paths, SourceKind::Native)
        .unwrap();
    plan.descriptor.native.source.hash = Some(fetched.hash.clone());
    let downloads = forge.downloads.get();

    let report = boot.activate(&plan).unwrap();
    assert!(report.native.reused);
    assert_eq!(report.native.path, fetched.path);
    // Only the branch-tracked binding was downloaded again.
    assert_eq!(forge.downloads.get(), downloads + 1);
}

#[test]
fn integrity_mismatch_stops_before_build() {
    let tmp = tempfile::tempdir().unwrap();
    let forge = Forge::new(SETUP_PY);
    let host = Host::default();
    let mut plan = plan(tmp.path());
    let wrong: ContentHash = "0".repeat(64).parse().unwrap();
    plan.descriptor.native.source.hash = Some(wrong);

    let err = Bootstrap::new(&host, &forge, &NoProgress)
        .activate(&plan)
        .unwrap_err();
    assert!(matches!(err, BootstrapError::FetchIntegrity { .. }), "{}", err);
    assert_eq!(err.step(), Step::Fetch);
    assert!(host.calls.borrow().is_empty());
    let stored = fs::read_dir(&plan.paths.store_dir).unwrap().count();
    assert_eq!(stored, 0);
    assert!(!plan.paths.install_dir.exists());
}

#[test]
fn unpatchable_build_script_stops_before_install() {
    let tmp = tempfile::tempdir().unwrap();
    let forge = Forge::new("setup(include_dirs=['third_party/include'], library_dirs=['mcl/lib'])\n");
    let host = Host::default();
    let plan = plan(tmp.path());

    let err = Bootstrap::new(&host, &forge, &NoProgress)
        .activate(&plan)
        .unwrap_err();
    match &err {
        BootstrapError::PatchNotApplied { label, found, .. } => {
            assert_eq!(label, "headers");
            assert_eq!(*found, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(host.pip_installs(), 0);
    assert!(!plan.paths.venv_dir.exists());
}

#[test]
fn missing_archive_is_a_fetch_error() {
    let tmp = tempfile::tempdir().unwrap();
    let forge = Forge::new(SETUP_PY);
    let host = Host::default();
    let mut plan = plan(tmp.path());
    plan.descriptor.binding.source.repo = "pymcl-fork".into();

    let err = Bootstrap::new(&host, &forge, &NoProgress)
        .activate(&plan)
        .unwrap_err();
    assert!(matches!(err, BootstrapError::Fetch { .. }), "{}", err);
    assert!(err.to_string().contains("mem://Jemtaly/pymcl-fork/main"));
}
