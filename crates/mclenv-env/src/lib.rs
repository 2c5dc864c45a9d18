pub mod build;
pub mod fetch;
pub mod fsutil;
pub mod install;
pub mod lock;
pub mod patch;
pub mod pipeline;
pub mod runner;
pub mod stage;
pub mod toolchain;
pub mod venv;

pub use pipeline::{ActivationPlan, ActivationReport, Bootstrap, NoProgress, Progress, SourceKind};
