//! Tracing initialization for the audit pipeline.
//!
//! Production binaries call [`init_tracing`] once at startup; tests call
//! [`init_test_tracing`], which is safe to invoke from every test function.

use std::sync::Once;

use tracing::subscriber::set_global_default;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

// Tests initialize tracing from many #[tokio::test] entry points, but the
// global subscriber can only be installed once per process.
static TEST_TRACING: Once = Once::new();

/// Initializes the global tracing subscriber for production use.
///
/// The filter is taken from `RUST_LOG` when set, otherwise `info`. Panics if
/// a global subscriber was already installed, which indicates a double
/// initialization bug in the caller.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::NONE)
        .with_target(true)
        .finish();

    set_global_default(subscriber).expect("tracing subscriber already installed");
}

/// Initializes tracing for tests.
///
/// Uses a compact format writing to the test-captured output and installs
/// the subscriber at most once per process, so every test can call this
/// unconditionally.
pub fn init_test_tracing() {
    TEST_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .compact()
            .finish();

        // Another harness may have installed a subscriber first; that is
        // fine for tests.
        let _ = set_global_default(subscriber);
    });
}
