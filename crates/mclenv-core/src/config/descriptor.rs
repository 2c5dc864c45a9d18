//! Environment descriptor: what to fetch, how to build it, where to put it.
//!
//! Layering, later wins: built-in defaults, `mclenv.yaml`, `MCLENV_*` variables,
//! then CLI flags (applied by the binary).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::env_keys::{paths, sources, toolchain};
use super::loader::{env_optional, env_parse};
use crate::error::BootstrapError;
use crate::model::{ContentHash, PinnedSource, Revision};

pub const DESCRIPTOR_FILE: &str = "mclenv.yaml";

pub const DEFAULT_ARCHIVE_URL: &str = "https://github.com/{owner}/{repo}/archive/{rev}.tar.gz";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Descriptor {
    /// Download URL template for both sources.
    pub archive_url: String,
    pub native: NativeSection,
    pub binding: BindingSection,
    pub toolchain: ToolchainSection,
    pub paths: PathsSection,
    pub patch: PatchSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NativeSection {
    pub source: PinnedSource,
    /// Header namespaces copied from `include/` into the install tree.
    pub headers: Vec<String>,
    /// Extra make targets; empty means the Makefile's default goal.
    pub make_targets: Vec<String>,
    pub jobs: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BindingSection {
    pub source: PinnedSource,
    /// Distribution name, as `pip show` knows it.
    pub package: String,
    /// Import name used for the post-install import check.
    pub module: String,
    /// Build script inside the binding tree that gets patched.
    pub build_script: String,
    /// Must be true when `source.revision` is a branch: following a moving head
    /// is an explicit choice, never a silent default.
    pub track_branch: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainSection {
    pub cc: String,
    pub cxx: String,
    /// Base interpreter used to create the venv; `None` searches python3, python.
    pub python: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsSection {
    pub state_dir: Option<PathBuf>,
    pub staging_dir: Option<PathBuf>,
    pub venv_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PatchSection {
    pub rules: Vec<PatchRuleSpec>,
    /// Lines inserted at the top of the build script when missing.
    pub imports: Vec<String>,
}

/// A substitution rule before the build layout is known.
///
/// `replacement` may use `{include}`, `{lib}` and `{prefix}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchRuleSpec {
    pub label: String,
    pub pattern: String,
    pub replacement: String,
    #[serde(default = "default_min_matches")]
    pub min_matches: usize,
}

fn default_min_matches() -> usize {
    1
}

impl Default for Descriptor {
    fn default() -> Self {
        Self {
            archive_url: DEFAULT_ARCHIVE_URL.to_string(),
            native: NativeSection::default(),
            binding: BindingSection::default(),
            toolchain: ToolchainSection::default(),
            paths: PathsSection::default(),
            patch: PatchSection::default(),
        }
    }
}

impl Default for NativeSection {
    fn default() -> Self {
        Self {
            source: PinnedSource::new("herumi", "mcl", Revision::Tag("v2.14".into())),
            headers: vec!["mcl".into(), "cybozu".into()],
            make_targets: Vec::new(),
            jobs: None,
        }
    }
}

impl Default for BindingSection {
    fn default() -> Self {
        Self {
            source: PinnedSource::new("Jemtaly", "pymcl", Revision::Branch("main".into())),
            package: "pymcl".into(),
            module: "pymcl".into(),
            build_script: "setup.py".into(),
            track_branch: true,
        }
    }
}

impl Default for ToolchainSection {
    fn default() -> Self {
        Self {
            cc: "cc".into(),
            cxx: "c++".into(),
            python: None,
        }
    }
}

impl Default for PatchSection {
    fn default() -> Self {
        Self {
            rules: vec![
                PatchRuleSpec {
                    label: "headers".into(),
                    pattern: "mcl/include".into(),
                    replacement: "{include}".into(),
                    min_matches: 1,
                },
                PatchRuleSpec {
                    label: "libraries".into(),
                    pattern: "mcl/lib".into(),
                    replacement: "{lib}".into(),
                    min_matches: 1,
                },
            ],
            imports: vec!["import os".into()],
        }
    }
}

impl Descriptor {
    /// Load defaults, then `explicit` (must exist) or `<project>/mclenv.yaml` (if present),
    /// then environment overrides, then validate.
    pub fn load(project: &Path, explicit: Option<&Path>) -> Result<Self, BootstrapError> {
        let file = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => Some(project.join(DESCRIPTOR_FILE)).filter(|p| p.is_file()),
        };
        let mut desc = match file {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    BootstrapError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                let desc = Self::from_yaml(&content).map_err(|e| {
                    BootstrapError::Config(format!("{}: {}", path.display(), e))
                })?;
                tracing::debug!(path = %path.display(), "loaded descriptor");
                desc
            }
            None => Self::default(),
        };
        desc.apply_env()?;
        desc.validate()?;
        Ok(desc)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Overlay `MCLENV_*` variables.
    pub fn apply_env(&mut self) -> Result<(), BootstrapError> {
        if let Some(url) = env_optional(sources::MCLENV_ARCHIVE_URL, &[]) {
            self.archive_url = url;
        }
        if let Some(hash) = env_parse::<ContentHash>(sources::MCLENV_NATIVE_HASH, &[])
            .map_err(BootstrapError::Config)?
        {
            self.native.source.hash = Some(hash);
        }
        if let Some(raw) = env_optional(sources::MCLENV_BINDING_REV, &[]) {
            self.binding.source.revision = parse_revision(&raw).map_err(|e| {
                BootstrapError::Config(format!("{}={}: {}", sources::MCLENV_BINDING_REV, raw, e))
            })?;
        }
        if let Some(hash) = env_parse::<ContentHash>(sources::MCLENV_BINDING_HASH, &[])
            .map_err(BootstrapError::Config)?
        {
            self.binding.source.hash = Some(hash);
        }
        if let Some(cc) = env_optional(toolchain::MCLENV_CC, toolchain::CC_ALIASES) {
            self.toolchain.cc = cc;
        }
        if let Some(cxx) = env_optional(toolchain::MCLENV_CXX, toolchain::CXX_ALIASES) {
            self.toolchain.cxx = cxx;
        }
        if let Some(py) = env_optional(toolchain::MCLENV_PYTHON, &[]) {
            self.toolchain.python = Some(py);
        }
        if let Some(jobs) =
            env_parse::<usize>(toolchain::MCLENV_JOBS, &[]).map_err(BootstrapError::Config)?
        {
            self.native.jobs = Some(jobs);
        }
        if let Some(dir) = env_optional(paths::MCLENV_STATE_DIR, &[]) {
            self.paths.state_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = env_optional(paths::MCLENV_STAGING_DIR, &[]) {
            self.paths.staging_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = env_optional(paths::MCLENV_VENV_DIR, &[]) {
            self.paths.venv_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), BootstrapError> {
        let bad = |msg: String| Err(BootstrapError::Config(msg));
        for (what, src) in [("native", &self.native.source), ("binding", &self.binding.source)] {
            if src.owner.trim().is_empty() || src.repo.trim().is_empty() {
                return bad(format!("{}.source needs owner and repo", what));
            }
            if src.revision.as_ref_str().trim().is_empty() {
                return bad(format!("{}.source.revision is empty", what));
            }
        }
        if self.binding.source.revision.is_mutable() && !self.binding.track_branch {
            return bad(format!(
                "binding is pinned to {} but binding.track_branch is false; \
                 pin a tag/commit or set track_branch: true",
                self.binding.source.revision
            ));
        }
        if self.native.headers.is_empty() {
            return bad("native.headers must name at least one header namespace".into());
        }
        if self.native.jobs == Some(0) {
            return bad("native.jobs must be at least 1".into());
        }
        if self.toolchain.cc.trim().is_empty() || self.toolchain.cxx.trim().is_empty() {
            return bad("toolchain.cc and toolchain.cxx must both be set".into());
        }
        if self.binding.package.trim().is_empty() || self.binding.build_script.trim().is_empty() {
            return bad("binding.package and binding.build_script must be set".into());
        }
        for rule in &self.patch.rules {
            if rule.pattern.is_empty() {
                return bad(format!("patch rule '{}' has an empty pattern", rule.label));
            }
            if rule.min_matches == 0 {
                return bad(format!(
                    "patch rule '{}' must require at least one match",
                    rule.label
                ));
            }
        }
        if !self.archive_url.contains("{rev}") {
            return bad(format!("archive_url has no {{rev}} placeholder: {}", self.archive_url));
        }
        Ok(())
    }
}

/// `branch:main`, `tag:v2.14`, `commit:<sha>`; a bare value is a branch.
pub fn parse_revision(raw: &str) -> Result<Revision, String> {
    let raw = raw.trim();
    let (kind, value) = raw.split_once(':').unwrap_or(("branch", raw));
    if value.trim().is_empty() {
        return Err("empty revision".into());
    }
    let value = value.trim().to_string();
    match kind.trim() {
        "branch" => Ok(Revision::Branch(value)),
        "tag" => Ok(Revision::Tag(value)),
        "commit" => Ok(Revision::Commit(value)),
        other => Err(format!("unknown revision kind '{}'", other)),
    }
}
