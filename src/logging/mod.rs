//! Logging initialisation.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "crawld=info,sqlx=warn,tower_http=info";

/// Initialise the global tracing subscriber.
///
/// Honours `RUST_LOG` when set, otherwise falls back to the crate default.
pub fn init() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
