//! Tracing bootstrap.

use tracing_subscriber::EnvFilter;

use crate::config::WorkbenchConfig;

/// Install the global fmt subscriber. `RUST_LOG` wins over the config's
/// `debug` flag. Calling this more than once is harmless.
pub fn init_tracing(config: &WorkbenchConfig) -> bool {
    let fallback = format!("{},annotation_workbench={}", config.log_level(), config.log_level());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with_target(false)
        .try_init()
        .is_ok()
}
