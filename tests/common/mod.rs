//! Shared test setup.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs an env-filtered tracing subscriber once per test binary. Run
/// with `RUST_LOG=cml=trace` to see rendezvous and wheel tracing while a
/// test runs; harmless (and silent) with no filter set.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
