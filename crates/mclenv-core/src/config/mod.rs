//! Configuration layer.
//!
//! All environment variable reads are funnelled through this module; the rest of
//! the workspace sees structured config only.
//!
//! - `loader`: `env_or`, `env_optional`, `env_bool`, `.env` loading
//! - `env_keys`: key constants and their aliases
//! - `descriptor`: the YAML environment descriptor and its defaults
//! - `schema`: resolved paths and observability settings

pub mod descriptor;
pub mod env_keys;
pub mod loader;
pub mod schema;

pub use descriptor::{
    BindingSection, Descriptor, NativeSection, PatchRuleSpec, PatchSection, PathsSection,
    ToolchainSection, DESCRIPTOR_FILE,
};
pub use loader::{env_bool, env_optional, env_or, env_parse, load_dotenv_from_dir};
pub use schema::{ObservabilityConfig, PathsConfig};
