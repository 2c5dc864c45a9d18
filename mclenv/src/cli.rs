use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// mclenv - reproducible mcl + pymcl development environment
#[derive(Parser, Debug)]
#[command(name = "mclenv")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command that needs the descriptor.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Project directory (state, staging and venv live under it)
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub project: PathBuf,

    /// Descriptor file (default: <project>/mclenv.yaml if present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Compiler and interpreter overrides; these win over descriptor and env.
#[derive(Args, Debug, Clone, Default)]
pub struct ToolchainArgs {
    /// C compiler for both the native build and the binding build
    #[arg(long, value_name = "PATH")]
    pub cc: Option<String>,

    /// C++ compiler for both the native build and the binding build
    #[arg(long, value_name = "PATH")]
    pub cxx: Option<String>,

    /// Base Python interpreter used to create the venv
    #[arg(long, value_name = "PATH")]
    pub python: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceArg {
    Native,
    Binding,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch, build, stage, patch and install; a no-op when already installed
    Activate {
        #[command(flatten)]
        project: ProjectArgs,

        #[command(flatten)]
        toolchain: ToolchainArgs,

        /// Reinstall the binding even if pip reports it present
        #[arg(long)]
        force_reinstall: bool,
    },

    /// Fetch one source into the store and print its content hash (the value to pin)
    Prefetch {
        #[arg(value_enum)]
        source: SourceArg,

        #[command(flatten)]
        project: ProjectArgs,
    },

    /// Show venv, binding and native install state
    Status {
        #[command(flatten)]
        project: ProjectArgs,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a command inside the environment
    Run {
        #[command(flatten)]
        project: ProjectArgs,

        /// Command and arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        cmd: Vec<String>,
    },

    /// Run the project's unittest suites inside the environment
    Test {
        #[command(flatten)]
        project: ProjectArgs,

        /// Test file pattern passed to unittest discovery
        #[arg(long, default_value = "test_*.py")]
        pattern: String,

        /// Directory to start discovery in (relative to the project)
        #[arg(long, value_name = "DIR", default_value = ".")]
        start_dir: PathBuf,
    },

    /// Remove build scratch and staging dirs; --all also removes store, install tree and venv
    Clean {
        #[command(flatten)]
        project: ProjectArgs,

        /// Also remove the source store, native install tree and venv
        #[arg(long)]
        all: bool,

        /// Show what would be removed without deleting
        #[arg(long)]
        dry_run: bool,
    },
}
