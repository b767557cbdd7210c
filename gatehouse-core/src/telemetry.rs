//! Tracing setup for binaries and tests embedding the bootstrapper.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVES: &str = "info,gatehouse_core=info,reqwest=warn,hyper=warn";

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_directives`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(default_directives: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
