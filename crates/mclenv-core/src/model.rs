//! Configuration and state records shared by every bootstrap step.
//!
//! These are plain data: nothing here touches the network or spawns a process.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Revision reference of a remote source tree.
///
/// Tags and commits are treated as immutable; a branch head moves over time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Revision {
    Tag(String),
    Commit(String),
    Branch(String),
}

impl Revision {
    /// The ref as it appears in a download URL.
    pub fn as_ref_str(&self) -> &str {
        match self {
            Revision::Tag(r) | Revision::Commit(r) | Revision::Branch(r) => r,
        }
    }

    pub fn is_mutable(&self) -> bool {
        matches!(self, Revision::Branch(_))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revision::Tag(r) => write!(f, "tag {}", r),
            Revision::Commit(r) => write!(f, "commit {}", r),
            Revision::Branch(r) => write!(f, "branch {}", r),
        }
    }
}

/// SHA-256 tree hash, stored as 64 lowercase hex chars.
///
/// Rendered as `sha256:<hex>`; parsing accepts the bare hex form too.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    pub const PREFIX: &'static str = "sha256:";

    pub fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    pub fn hex(&self) -> &str {
        &self.0
    }

    /// First `n` hex chars, used in directory names.
    pub fn short(&self, n: usize) -> &str {
        &self.0[..n.min(self.0.len())]
    }
}

impl FromStr for ContentHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let hex_part = s.strip_prefix(Self::PREFIX).unwrap_or(s).to_ascii_lowercase();
        if hex_part.len() != 64 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!(
                "invalid content hash '{}': expected 64 hex chars, optionally prefixed with '{}'",
                s,
                Self::PREFIX
            ));
        }
        Ok(Self(hex_part))
    }
}

impl TryFrom<String> for ContentHash {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentHash> for String {
    fn from(value: ContentHash) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0)
    }
}

/// One remote source tree, identified by owner/repo and a revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinnedSource {
    pub owner: String,
    pub repo: String,
    /// `revision: {tag: v2.14}` in YAML rather than a `!tag` node.
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub revision: Revision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<ContentHash>,
}

impl PinnedSource {
    pub fn new(owner: &str, repo: &str, revision: Revision) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            revision,
            hash: None,
        }
    }

    pub fn with_hash(mut self, hash: ContentHash) -> Self {
        self.hash = Some(hash);
        self
    }

    /// `owner/repo@ref`, used in log lines and errors.
    pub fn slug(&self) -> String {
        format!("{}/{}@{}", self.owner, self.repo, self.revision.as_ref_str())
    }

    /// Render a download URL from a template with `{owner}`, `{repo}` and `{rev}` placeholders.
    pub fn archive_url(&self, template: &str) -> String {
        template
            .replace("{owner}", &self.owner)
            .replace("{repo}", &self.repo)
            .replace("{rev}", self.revision.as_ref_str())
    }

    /// Only a pinned hash makes two fetches comparable byte for byte.
    pub fn is_reproducible(&self) -> bool {
        self.hash.is_some()
    }
}

/// Compilers used for both the native build and the binding build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainSpec {
    pub cc: PathBuf,
    pub cxx: PathBuf,
}

impl ToolchainSpec {
    /// `CC` / `CXX` pairs for child process environments and make overrides.
    pub fn env_pairs(&self) -> [(&'static str, String); 2] {
        [
            ("CC", self.cc.to_string_lossy().to_string()),
            ("CXX", self.cxx.to_string_lossy().to_string()),
        ]
    }
}

impl fmt::Display for ToolchainSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CC={} CXX={}", self.cc.display(), self.cxx.display())
    }
}

/// Install tree produced by the native build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutputLayout {
    pub root: PathBuf,
    pub include_dir: PathBuf,
    pub lib_dir: PathBuf,
}

impl BuildOutputLayout {
    pub fn under(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            include_dir: root.join("include"),
            lib_dir: root.join("lib"),
        }
    }

    /// Both directories must exist and be non-empty before anything links against them.
    pub fn validate(&self) -> Result<()> {
        for (what, dir) in [("include", &self.include_dir), ("lib", &self.lib_dir)] {
            if !dir.is_dir() {
                anyhow::bail!("{} directory missing: {}", what, dir.display());
            }
            let mut entries = std::fs::read_dir(dir)?;
            if entries.next().is_none() {
                anyhow::bail!("{} directory is empty: {}", what, dir.display());
            }
        }
        Ok(())
    }
}

/// Writable copy of the binding source, recreated on every activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingInstallTree {
    pub root: PathBuf,
    pub build_script: PathBuf,
}

impl WorkingInstallTree {
    pub fn new(root: &Path, build_script: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            build_script: root.join(build_script),
        }
    }
}

/// Result of asking the environment whether the binding package is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Present,
    Absent,
    ProbeError(String),
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeResult::Present => write!(f, "installed"),
            ProbeResult::Absent => write!(f, "not installed"),
            ProbeResult::ProbeError(msg) => write!(f, "unknown ({})", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentState {
    pub venv_present: bool,
    pub binding: ProbeResult,
}
