//! `info_log!`: step progress that `MCLENV_QUIET=1` silences.
//!
//! Warnings and errors go through `tracing` directly and are never suppressed.

/// `tracing::info!` unless quiet mode is on. The calling crate needs `tracing`.
#[macro_export]
macro_rules! info_log {
    ($($arg:tt)*) => {{
        if !$crate::log::is_quiet() {
            ::tracing::info!($($arg)*);
        }
    }};
}

pub fn is_quiet() -> bool {
    crate::config::ObservabilityConfig::from_env().quiet
}
