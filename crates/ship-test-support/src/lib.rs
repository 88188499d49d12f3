//! Shared test events, handlers and utilities for Ship.

mod clock;
mod events;
mod handlers;
mod transport;

use std::sync::Once;

use tracing_subscriber::EnvFilter;

pub use clock::FixedClock;
pub use events::{AccountOpened, FundsDeposited, envelope, sample_registry};
pub use handlers::{
    FailingHandler, PanickingHandler, RecordingHandler, RecordingRawHandler, SlowHandler,
};
pub use transport::FailingTransport;

static TRACING: Once = Once::new();

/// Installs a test log subscriber once per process. Filtered by `RUST_LOG`,
/// `warn` by default.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
