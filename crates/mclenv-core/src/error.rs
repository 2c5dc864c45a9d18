//! Error taxonomy for the bootstrap sequence.
//!
//! Every error is fatal: there is no retry layer. Each variant knows which step
//! produced it and, where a subprocess was involved, carries the tool's raw output
//! so the CLI can print it verbatim.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::ContentHash;

/// The step that failed, printed as a short label in front of the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Config,
    Fetch,
    Build,
    Stage,
    Patch,
    Install,
    Lock,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::Config => "config",
            Step::Fetch => "fetch",
            Step::Build => "build",
            Step::Stage => "stage",
            Step::Patch => "patch",
            Step::Install => "install",
            Step::Lock => "lock",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("{0}")]
    Config(String),

    #[error("failed to fetch {slug} from {url}: {message}")]
    Fetch {
        slug: String,
        url: String,
        message: String,
    },

    #[error("content hash mismatch for {slug}: expected {expected}, got {actual}")]
    FetchIntegrity {
        slug: String,
        expected: ContentHash,
        actual: ContentHash,
    },

    #[error("native build failed: {message}")]
    Build { message: String, output: String },

    #[error("staging failed at {}: {source}", .path.display())]
    StageIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "patch rule '{label}' matched {found} time(s) in {} (need at least {required}); pattern: {pattern:?}",
        .script.display()
    )]
    PatchNotApplied {
        label: String,
        pattern: String,
        script: PathBuf,
        found: usize,
        required: usize,
    },

    #[error("invalid patch rules: {0}")]
    PatchRules(String),

    #[error("cannot rewrite {}: {source}", .script.display())]
    PatchIo {
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("binding install failed: {message}")]
    Install { message: String, output: String },

    #[error("cannot lock {}: {message}", .path.display())]
    Lock { path: PathBuf, message: String },
}

impl BootstrapError {
    pub fn step(&self) -> Step {
        match self {
            BootstrapError::Config(_) => Step::Config,
            BootstrapError::Fetch { .. } | BootstrapError::FetchIntegrity { .. } => Step::Fetch,
            BootstrapError::Build { .. } => Step::Build,
            BootstrapError::StageIo { .. } => Step::Stage,
            BootstrapError::PatchNotApplied { .. }
            | BootstrapError::PatchRules(_)
            | BootstrapError::PatchIo { .. } => Step::Patch,
            BootstrapError::Install { .. } => Step::Install,
            BootstrapError::Lock { .. } => Step::Lock,
        }
    }

    /// Captured stdout/stderr of the failing tool, if any.
    pub fn tool_output(&self) -> Option<&str> {
        match self {
            BootstrapError::Build { output, .. } | BootstrapError::Install { output, .. } => {
                Some(output.as_str()).filter(|o| !o.trim().is_empty())
            }
            _ => None,
        }
    }

    pub fn build(message: impl Into<String>) -> Self {
        BootstrapError::Build {
            message: message.into(),
            output: String::new(),
        }
    }

    pub fn install(message: impl Into<String>) -> Self {
        BootstrapError::Install {
            message: message.into(),
            output: String::new(),
        }
    }
}

pub type BootstrapResult<T> = Result<T, BootstrapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_labels() {
        let err = BootstrapError::PatchNotApplied {
            label: "include".into(),
            pattern: "mcl/include".into(),
            script: PathBuf::from(".pymcl/setup.py"),
            found: 0,
            required: 1,
        };
        assert_eq!(err.step(), Step::Patch);
        assert_eq!(err.step().to_string(), "patch");
        let msg = err.to_string();
        assert!(msg.contains("matched 0 time(s)"), "{}", msg);
        assert!(msg.contains("\"mcl/include\""), "{}", msg);
    }

    #[test]
    fn test_tool_output_only_when_non_empty() {
        let err = BootstrapError::Install {
            message: "pip exited with status 1".into(),
            output: "error: command 'g++' failed".into(),
        };
        assert_eq!(err.tool_output(), Some("error: command 'g++' failed"));
        assert_eq!(BootstrapError::build("no lib").tool_output(), None);
    }
}
