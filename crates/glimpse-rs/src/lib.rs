//! Public SDK surface for Glimpse.
//!
//! This crate re-exports the core building blocks and provides a small
//! initialization helper to keep consumer setup consistent.

/// Re-export for convenience.
pub use glimpse_rs_config as config;
pub use glimpse_rs_core as core;
/// Re-export for convenience.
pub use glimpse_rs_memory as memory;
/// Re-export for convenience.
pub use glimpse_rs_protocol as protocol;

pub use glimpse_rs_core::{AskOutcome, AskStream, Assistant, GlimpseCoreError};

#[inline]
/// Initialize logging using env_logger if the "logging" feature is enabled.
///
/// Logs go to stderr so stdout stays free for answers and protocol output.
/// `RUST_LOG` controls verbosity.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::builder()
            .format_timestamp_millis()
            .parse_default_env()
            .try_init();
    }
}
