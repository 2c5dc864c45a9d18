//! Environment variable keys. Primary names are `MCLENV_*`; aliases follow in order.

/// Layout of the environment on disk.
pub mod paths {
    pub const MCLENV_STATE_DIR: &str = "MCLENV_STATE_DIR";
    pub const MCLENV_STAGING_DIR: &str = "MCLENV_STAGING_DIR";
    pub const MCLENV_VENV_DIR: &str = "MCLENV_VENV_DIR";
}

/// Compilers and interpreter.
pub mod toolchain {
    pub const MCLENV_CC: &str = "MCLENV_CC";
    pub const CC_ALIASES: &[&str] = &["CC"];

    pub const MCLENV_CXX: &str = "MCLENV_CXX";
    pub const CXX_ALIASES: &[&str] = &["CXX"];

    pub const MCLENV_PYTHON: &str = "MCLENV_PYTHON";

    /// Parallel make jobs for the native build.
    pub const MCLENV_JOBS: &str = "MCLENV_JOBS";
}

/// Source pins.
pub mod sources {
    /// URL template with `{owner}`, `{repo}` and `{rev}` placeholders.
    pub const MCLENV_ARCHIVE_URL: &str = "MCLENV_ARCHIVE_URL";

    pub const MCLENV_NATIVE_HASH: &str = "MCLENV_NATIVE_HASH";

    /// Binding revision override: `branch:<name>`, `tag:<name>` or `commit:<sha>`.
    pub const MCLENV_BINDING_REV: &str = "MCLENV_BINDING_REV";
    pub const MCLENV_BINDING_HASH: &str = "MCLENV_BINDING_HASH";
}

/// Logging.
pub mod observability {
    pub const MCLENV_QUIET: &str = "MCLENV_QUIET";
    pub const MCLENV_LOG_LEVEL: &str = "MCLENV_LOG_LEVEL";
    pub const MCLENV_LOG_JSON: &str = "MCLENV_LOG_JSON";
}
