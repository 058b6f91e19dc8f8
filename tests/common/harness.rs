//! tests/common/harness.rs
use kestrel_runtime::config::Config;
use kestrel_runtime::ids::AtomicIdSource;
use kestrel_runtime::timer::ManualClock;
use kestrel_runtime::ModuleRegistry;
use std::sync::{Arc, Once};
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::fmt::format::FmtSpan;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "kestrel_runtime=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::FULL)
            .with_test_writer()
            .init();
    });
}

/// A registry driven by a manual clock, so timer tests control time.
pub struct TestHarness {
    pub registry: Arc<ModuleRegistry>,
    pub clock: ManualClock,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        init_tracing();
        let clock = ManualClock::new(0);
        let registry = ModuleRegistry::with_parts(config, Arc::new(clock.clone()), Arc::new(AtomicIdSource::new()));
        Self {
            registry: Arc::new(registry),
            clock,
        }
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
