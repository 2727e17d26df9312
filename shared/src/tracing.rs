use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global fmt subscriber. `RUST_LOG` wins over `default_directives`.
pub fn init(default_directives: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

/// Initialise tracing with `<calling crate>=info` as the default filter.
#[macro_export]
macro_rules! init_tracing {
    () => {
        $crate::tracing::init(&format!("{}=info", env!("CARGO_CRATE_NAME")))
    };
}
