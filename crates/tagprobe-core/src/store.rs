//! The single-writer state container.
//!
//! All mutation goes through [`Store::dispatch`], which reduces the action
//! into a new state, publishes the resulting snapshot and forwards the
//! action to every subscribed action channel, all inside one short critical
//! section. Readers never see a partially applied state, and every action
//! channel observes actions in dispatch order.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::debug;

use tagprobe_types::DeviceHandle;

use crate::state::{Action, ActionKind, ApplicationState, reduce};
use crate::subscription::{Emitter, Subscription};

struct ActionChannel {
    kinds: Option<HashSet<ActionKind>>,
    emitter: Emitter<Action>,
}

impl ActionChannel {
    fn wants(&self, kind: ActionKind) -> bool {
        self.kinds.as_ref().is_none_or(|kinds| kinds.contains(&kind))
    }
}

struct Inner {
    state: Arc<ApplicationState>,
    channels: Vec<ActionChannel>,
}

/// Shared application state container.
///
/// Wrap in an `Arc` to share it between tasks.
pub struct Store {
    inner: Mutex<Inner>,
    snapshots: watch::Sender<Arc<ApplicationState>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Create a store holding the default state.
    pub fn new() -> Self {
        Self::with_state(ApplicationState::default())
    }

    /// Create a store holding `state`.
    pub fn with_state(state: ApplicationState) -> Self {
        let state = Arc::new(state);
        let (snapshots, _) = watch::channel(Arc::clone(&state));
        Self {
            inner: Mutex::new(Inner {
                state,
                channels: Vec::new(),
            }),
            snapshots,
        }
    }

    /// The current state snapshot.
    pub fn state(&self) -> Arc<ApplicationState> {
        Arc::clone(&self.lock().state)
    }

    /// Watch state snapshots. The receiver starts at the current state.
    pub fn watch(&self) -> watch::Receiver<Arc<ApplicationState>> {
        self.snapshots.subscribe()
    }

    /// Apply an action.
    pub fn dispatch(&self, action: impl Into<Action>) {
        let action = action.into();
        let kind = action.kind();
        debug!("dispatch {:?}", action);

        let mut inner = self.lock();
        let next = Arc::new(reduce(&inner.state, &action));
        inner.state = Arc::clone(&next);
        self.snapshots.send_replace(next);

        inner.channels.retain(|channel| {
            if !channel.wants(kind) {
                return !channel.emitter.is_closed();
            }
            channel.emitter.send(action.clone()).is_ok()
        });
    }

    /// Subscribe to every action dispatched from now on, of the given kinds.
    ///
    /// The queue is unbounded, so no action is lost between reads.
    pub fn subscribe(&self, kinds: &[ActionKind]) -> Subscription<Action> {
        self.register(Some(kinds.iter().copied().collect()))
    }

    /// Subscribe to every action dispatched from now on.
    pub fn subscribe_all(&self) -> Subscription<Action> {
        self.register(None)
    }

    fn register(&self, kinds: Option<HashSet<ActionKind>>) -> Subscription<Action> {
        let (emitter, subscription) = Subscription::channel();
        self.lock().channels.push(ActionChannel { kinds, emitter });
        subscription
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // The critical section never panics mid-update; recover the guard.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Command emitters ---

    /// Append a line to the event log.
    pub fn log(&self, message: impl Into<String>) {
        self.dispatch(Action::Log(message.into()));
    }

    /// Empty the event log.
    pub fn clear_logs(&self) {
        self.dispatch(Action::ClearLogs);
    }

    /// Ask the connection manager to connect to `device`.
    pub fn connect(&self, device: DeviceHandle) {
        self.dispatch(Action::Connect(device));
    }

    /// Connect to the active device, if there is one.
    ///
    /// Returns the device the command was issued for.
    pub fn connect_active(&self) -> Option<DeviceHandle> {
        let device = self.state().active_device.clone()?;
        self.connect(device.clone());
        Some(device)
    }

    /// Ask the connection manager to disconnect.
    pub fn disconnect(&self) {
        self.dispatch(Action::Disconnect);
    }

    /// Ask the connection manager to run a test.
    pub fn execute_test(&self, id: impl Into<String>) {
        self.dispatch(Action::ExecuteTest(id.into()));
    }

    /// Forget the active device.
    pub fn forget_device(&self) {
        self.dispatch(Action::ForgetDevice);
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Store")
            .field("state", &inner.state)
            .field("channels", &inner.channels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagprobe_types::{AdapterState, ConnectionState};

    #[test]
    fn test_dispatch_updates_state() {
        let store = Store::new();
        store.dispatch(Action::AdapterStateChanged(AdapterState::PoweredOn));
        assert_eq!(store.state().adapter_state, AdapterState::PoweredOn);
        assert_eq!(store.state().latest_log(), Some("BLE state changed: PoweredOn"));
    }

    #[test]
    fn test_filtered_subscription_sees_only_its_kinds_in_order() {
        let store = Store::new();
        let mut sub = store.subscribe(&[ActionKind::Disconnect, ActionKind::ExecuteTest]);

        store.log("ignored");
        store.execute_test("A");
        store.dispatch(Action::ConnectionStateChanged(ConnectionState::Connected));
        store.disconnect();
        store.execute_test("B");

        assert_eq!(sub.try_recv(), Some(Action::ExecuteTest("A".into())));
        assert_eq!(sub.try_recv(), Some(Action::Disconnect));
        assert_eq!(sub.try_recv(), Some(Action::ExecuteTest("B".into())));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_closed_subscriptions_are_pruned() {
        let store = Store::new();
        let sub = store.subscribe_all();
        let _other = store.subscribe(&[ActionKind::Connect]);
        drop(sub);
        store.log("x");
        assert_eq!(store.lock().channels.len(), 1);
    }

    #[tokio::test]
    async fn test_watch_sees_latest_snapshot() {
        let store = Store::new();
        let mut rx = store.watch();
        store.log("hello");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().latest_log(), Some("hello"));
    }

    #[test]
    fn test_connect_active() {
        let store = Store::new();
        let mut sub = store.subscribe(&[ActionKind::Connect]);
        assert_eq!(store.connect_active(), None);
        assert_eq!(sub.try_recv(), None);

        let device = DeviceHandle::new("tag");
        store.dispatch(Action::DeviceDiscovered(device.clone()));
        assert_eq!(store.connect_active(), Some(device.clone()));
        assert_eq!(sub.try_recv(), Some(Action::Connect(device)));
    }
}
