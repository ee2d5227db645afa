//! Tracing subscriber setup shared by the binary and the tests

use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber filtered by `RUST_LOG`, or by `default_level`
/// when `RUST_LOG` is unset.
///
/// Safe to call more than once; only the first call installs anything, which
/// is what parallel tests need.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Like [`init`] but writes through the test harness's captured output
pub fn init_for_tests() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
