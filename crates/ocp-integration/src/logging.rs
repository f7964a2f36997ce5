//! Ambient logging setup, patterned on the API binary's
//! `tracing_subscriber::registry()...init()` call.

use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Initializes the global tracing subscriber exactly once per process.
/// Safe to call from multiple call sites (tests, multiple `ControlPlane`
/// instances); later calls are no-ops.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("ocp=info"));

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}
