//! Subprocess seam: every external tool (make, python, pip) goes through
//! [`CommandRunner`], so the bootstrap steps can be driven by a scripted runner in tests.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// A fully described invocation: program, args, extra env, working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            envs: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn envs<I, K, V>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.envs
            .extend(envs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    /// File name of the program, e.g. `make` or `python`.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for a in &self.args {
            if a.contains(' ') {
                write!(f, " {:?}", a)?;
            } else {
                write!(f, " {}", a)?;
            }
        }
        Ok(())
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn ok(stdout: &str) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: &str) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn status_label(&self) -> String {
        match self.code {
            Some(c) => format!("exit status {}", c),
            None => "termination by signal".to_string(),
        }
    }

    /// stdout followed by stderr, for diagnostics.
    pub fn combined(&self) -> String {
        let mut s = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        s.push_str(self.stdout.trim_end());
        if !self.stdout.trim().is_empty() && !self.stderr.trim().is_empty() {
            s.push('\n');
        }
        s.push_str(self.stderr.trim_end());
        s
    }
}

pub trait CommandRunner {
    /// Run to completion and capture output. `Err` only when the process could not be spawned.
    fn run(&self, cmd: &ToolCommand) -> std::io::Result<ToolOutput>;
}

/// Runs commands on the host with `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &ToolCommand) -> std::io::Result<ToolOutput> {
        tracing::debug!(command = %cmd, cwd = ?cmd.cwd, "spawn");
        let mut c = Command::new(&cmd.program);
        c.args(&cmd.args);
        for (k, v) in &cmd.envs {
            c.env(k, v);
        }
        if let Some(ref dir) = cmd.cwd {
            c.current_dir(dir);
        }
        let out = c.output()?;
        let output = ToolOutput {
            code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
        };
        tracing::debug!(command = %cmd.program_name(), status = %output.status_label(), "exit");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_args_with_spaces() {
        let cmd = ToolCommand::new("/usr/bin/python3")
            .args(["-c", "import pymcl"])
            .env("CC", "/usr/bin/cc");
        assert_eq!(cmd.to_string(), "/usr/bin/python3 -c \"import pymcl\"");
        assert_eq!(cmd.program_name(), "python3");
    }

    #[test]
    fn test_combined_output() {
        let out = ToolOutput {
            code: Some(2),
            stdout: "compiling\n".into(),
            stderr: "error: boom\n".into(),
        };
        assert_eq!(out.combined(), "compiling\nerror: boom");
        assert!(!out.success());
        assert_eq!(out.status_label(), "exit status 2");
        assert_eq!(ToolOutput::failed(1, "x").combined(), "x");
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_captures_output() {
        let out = SystemRunner
            .run(&ToolCommand::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]))
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[test]
    fn test_system_runner_spawn_failure_is_err() {
        assert!(SystemRunner
            .run(&ToolCommand::new("/definitely/not/a/real/tool"))
            .is_err());
    }
}
