use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Install the global tracing subscriber.
///
/// Defaults to `info` for our crates; `RUST_LOG` overrides.
pub fn init(service_name: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,antidelete=info,antidelete_core=info,antidelete_telegram=info,{service_name}=info"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install tracing subscriber: {e}")))
}
