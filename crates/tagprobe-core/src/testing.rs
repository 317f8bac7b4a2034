//! The test registry and the test task.
//!
//! A test is a named procedure that runs against the connected peripheral,
//! logs what it does and reports success or failure. The registry is fixed
//! at compile time.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use tagprobe_types::DeviceHandle;

use crate::adapter::BleAdapter;
use crate::error::{Error, Result};
use crate::procedures;
use crate::state::Action;
use crate::store::Store;

/// Future returned by a test procedure; resolves to `true` on success.
pub type TestFuture = BoxFuture<'static, bool>;

/// Everything a test procedure needs.
#[derive(Clone)]
pub struct TestContext {
    /// The adapter the peripheral is connected through.
    pub adapter: Arc<dyn BleAdapter>,
    /// The connected peripheral.
    pub device: DeviceHandle,
    /// Where log entries go.
    pub store: Arc<Store>,
}

impl TestContext {
    /// Create a context.
    pub fn new(adapter: Arc<dyn BleAdapter>, device: DeviceHandle, store: Arc<Store>) -> Self {
        Self {
            adapter,
            device,
            store,
        }
    }

    /// Append a line to the event log.
    pub fn log(&self, message: impl Into<String>) {
        self.store.log(message);
    }

    /// Append an error to the event log in the diagnostic format.
    pub fn log_error(&self, error: &Error) {
        self.store.dispatch(Action::log_error(error));
    }

    /// Turn a procedure body's outcome into the boolean a test reports,
    /// logging the error if there is one.
    pub fn report(&self, outcome: Result<()>) -> bool {
        match outcome {
            Ok(()) => true,
            Err(e) => {
                warn!("Test procedure failed: {}", e);
                self.log_error(&e);
                false
            }
        }
    }
}

impl fmt::Debug for TestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestContext")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

/// A registered test.
#[derive(Clone, Copy)]
pub struct TestDescriptor {
    /// Stable identifier used in commands.
    pub id: &'static str,
    /// Human readable title.
    pub title: &'static str,
    /// The procedure.
    pub execute: fn(TestContext) -> TestFuture,
}

impl fmt::Debug for TestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestDescriptor")
            .field("id", &self.id)
            .field("title", &self.title)
            .finish()
    }
}

/// Every registered test, in display order.
pub static TESTS: &[TestDescriptor] = &[
    TestDescriptor {
        id: "READ_ALL_CHARACTERISTICS",
        title: "Read all characteristics",
        execute: procedures::read_all_characteristics,
    },
    TestDescriptor {
        id: "READ_TEMPERATURE",
        title: "Read temperature",
        execute: procedures::read_temperature,
    },
];

/// Look up a registered test by id.
pub fn find_test(id: &str) -> Option<&'static TestDescriptor> {
    TESTS.iter().find(|test| test.id == id)
}

/// Run test `id` against the connected peripheral.
///
/// Logs the start, and on completion a summary with the elapsed time,
/// then dispatches [`Action::TestFinished`]. When cancelled, it returns at
/// once without a summary and without `TestFinished`; the connection
/// manager's cleanup covers that. An unknown id is logged and finishes
/// immediately.
#[instrument(skip(context, token), fields(device = %context.device.id()))]
pub async fn run_test(context: TestContext, id: String, token: CancellationToken) {
    let store = Arc::clone(&context.store);
    let Some(test) = find_test(&id) else {
        warn!("Unknown test requested: {}", id);
        store.log(format!("Unknown test: {}", id));
        store.dispatch(Action::TestFinished);
        return;
    };

    store.log(format!("Executing test: {}", id));
    info!("Executing test {}", test.id);
    let start = Instant::now();
    let success = tokio::select! {
        biased;
        _ = token.cancelled() => {
            info!("Test {} cancelled", test.id);
            return;
        }
        success = (test.execute)(context) => success,
    };

    let elapsed_ms = start.elapsed().as_millis();
    if success {
        store.log(format!("Test finished successfully! ({} ms)", elapsed_ms));
    } else {
        store.log(format!("Test failed! ({} ms)", elapsed_ms));
    }
    info!("Test {} finished: success={}", test.id, success);
    store.dispatch(Action::TestFinished);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAdapter;
    use crate::state::ActionKind;

    #[test]
    fn test_registry() {
        let ids: Vec<_> = TESTS.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["READ_ALL_CHARACTERISTICS", "READ_TEMPERATURE"]);
        assert_eq!(find_test("READ_TEMPERATURE").map(|t| t.title), Some("Read temperature"));
        assert!(find_test("read_temperature").is_none());
    }

    #[tokio::test]
    async fn test_unknown_test_finishes() {
        let adapter = Arc::new(MockAdapter::new());
        let store = Arc::new(Store::new());
        let mut finished = store.subscribe(&[ActionKind::TestFinished]);
        let context = TestContext::new(adapter.clone(), adapter.device(), Arc::clone(&store));

        run_test(context, "NOPE".into(), CancellationToken::new()).await;

        assert_eq!(store.state().latest_log(), Some("Unknown test: NOPE"));
        assert_eq!(finished.try_recv(), Some(Action::TestFinished));
    }

    #[tokio::test]
    async fn test_failure_summary() {
        // Not connected, so every GATT call fails.
        let adapter = Arc::new(MockAdapter::new());
        let store = Arc::new(Store::new());
        let context = TestContext::new(adapter.clone(), adapter.device(), Arc::clone(&store));

        run_test(
            context,
            "READ_ALL_CHARACTERISTICS".into(),
            CancellationToken::new(),
        )
        .await;

        let logs: Vec<_> = store.state().logs.iter().rev().cloned().collect();
        assert_eq!(logs[0], "Executing test: READ_ALL_CHARACTERISTICS");
        assert!(logs[1].starts_with("ERROR: Device "));
        assert!(logs[2].starts_with("Test failed! ("));
        assert!(logs[2].ends_with(" ms)"));
    }

    #[tokio::test]
    async fn test_cancelled_before_completion_has_no_summary() {
        let adapter = Arc::new(MockAdapter::new());
        let store = Arc::new(Store::new());
        let mut finished = store.subscribe(&[ActionKind::TestFinished]);
        let context = TestContext::new(adapter.clone(), adapter.device(), Arc::clone(&store));
        let token = CancellationToken::new();
        token.cancel();

        run_test(context, "READ_TEMPERATURE".into(), token).await;

        assert_eq!(
            store.state().latest_log(),
            Some("Executing test: READ_TEMPERATURE")
        );
        assert_eq!(finished.try_recv(), None);
    }
}
