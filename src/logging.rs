use tracing_subscriber::EnvFilter;

use crate::error::MonitorError;

/// Installs the global fmt subscriber. `RUST_LOG` takes precedence over
/// `default_filter`.
pub fn init_tracing(default_filter: &str) -> Result<(), MonitorError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| MonitorError::Startup(format!("invalid log filter {default_filter:?}: {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| MonitorError::Startup(format!("logging initialization failed: {e}")))
}
