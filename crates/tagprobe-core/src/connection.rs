//! The connection manager.
//!
//! One long-running task owns the connection lifecycle:
//!
//! ```text
//! Idle -> Connecting -> Discovering -> Connected -> Disconnecting -> Idle
//! ```
//!
//! While connected it races user commands (disconnect, run test) against
//! an unsolicited disconnect from the peripheral. Whatever ends the
//! connection, cleanup runs: the running test is cancelled, the disconnect
//! subscription is released, then `TestFinished` and
//! `ConnectionStateChanged(Disconnected)` are dispatched.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use tagprobe_types::{ConnectionState, DeviceHandle};

use crate::adapter::BleAdapter;
use crate::error::{Error, Result};
use crate::state::{Action, ActionKind};
use crate::store::Store;
use crate::subscription::Subscription;
use crate::task::TaskHandle;
use crate::testing::{TestContext, run_test};

/// Drives one peripheral at a time through its connection lifecycle.
pub struct ConnectionManager {
    adapter: Arc<dyn BleAdapter>,
    store: Arc<Store>,
    connects: Subscription<Action>,
}

/// Resources held for the duration of one connection.
struct Session {
    device: DeviceHandle,
    commands: Subscription<Action>,
    disconnected: Option<Subscription<Option<Error>>>,
    test: Option<TaskHandle>,
}

/// How the connected phase ended.
enum Ended {
    ByUser,
    ByDevice,
    Shutdown,
}

impl ConnectionManager {
    /// Create a manager. Connect commands are queued from this point on.
    pub fn new(adapter: Arc<dyn BleAdapter>, store: Arc<Store>) -> Self {
        let connects = store.subscribe(&[ActionKind::Connect]);
        Self {
            adapter,
            store,
            connects,
        }
    }

    /// Serve connect commands one at a time until cancelled.
    ///
    /// A connect command issued while a connection is active waits in the
    /// queue until the current cycle is back to idle.
    #[instrument(skip_all)]
    pub async fn run(mut self, token: CancellationToken) {
        loop {
            let action = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                action = self.connects.recv() => action,
            };
            match action {
                Some(Action::Connect(device)) => self.handle_connection(device, &token).await,
                Some(_) => {}
                None => break,
            }
            if token.is_cancelled() {
                break;
            }
        }
        debug!("Connection manager stopped");
    }

    /// Run one full connection cycle, always ending in `Disconnected`.
    pub async fn handle_connection(&self, device: DeviceHandle, token: &CancellationToken) {
        info!("Connecting to {}", device);
        let mut session = Session {
            commands: self
                .store
                .subscribe(&[ActionKind::Disconnect, ActionKind::ExecuteTest]),
            device,
            disconnected: None,
            test: None,
        };

        match self.drive(&mut session, token).await {
            Ok(Ended::ByUser) => info!("Disconnected by user"),
            Ok(Ended::ByDevice) => info!("Disconnected by device"),
            Ok(Ended::Shutdown) | Err(Error::Cancelled) => debug!("Connection cycle cancelled"),
            Err(e) => {
                warn!("Connection to {} failed: {}", session.device, e);
                self.store.dispatch(Action::log_error(&e));
            }
        }

        self.cleanup(session).await;
    }

    async fn drive(&self, session: &mut Session, token: &CancellationToken) -> Result<Ended> {
        let device = session.device.clone();
        let mut disconnected = self.adapter.on_disconnected(&device).await?;

        self.store
            .dispatch(Action::ConnectionStateChanged(ConnectionState::Connecting));
        cancellable(token, self.adapter.connect(&device)).await?;

        self.store
            .dispatch(Action::ConnectionStateChanged(ConnectionState::Discovering));
        cancellable(token, self.adapter.discover_services(&device)).await?;

        // Tests requested before the connection was up never reached the
        // state and are dropped. A queued disconnect still applies.
        let mut disconnect_queued = false;
        while let Some(command) = session.commands.try_recv() {
            disconnect_queued |= command == Action::Disconnect;
        }
        self.store
            .dispatch(Action::ConnectionStateChanged(ConnectionState::Connected));
        if disconnect_queued {
            self.disconnect_by_user(&device).await?;
            session.disconnected = Some(disconnected);
            return Ok(Ended::ByUser);
        }

        let ended = loop {
            tokio::select! {
                _ = token.cancelled() => {
                    self.adapter.cancel_connection(&device).await?;
                    break Ended::Shutdown;
                }
                command = session.commands.recv() => match command {
                    Some(Action::Disconnect) => {
                        self.disconnect_by_user(&device).await?;
                        break Ended::ByUser;
                    }
                    Some(Action::ExecuteTest(id)) => {
                        if let Some(running) = session.test.take() {
                            debug!("Cancelling running test before starting {}", id);
                            running.cancel().await;
                        }
                        let context = TestContext::new(
                            Arc::clone(&self.adapter),
                            device.clone(),
                            Arc::clone(&self.store),
                        );
                        session.test = Some(TaskHandle::spawn(move |token| {
                            run_test(context, id, token)
                        }));
                    }
                    Some(_) => {}
                    None => break Ended::Shutdown,
                },
                notification = disconnected.recv() => {
                    self.store.log("Disconnected by device...");
                    if let Some(Some(error)) = notification {
                        self.store.dispatch(Action::log_error(&error));
                    }
                    break Ended::ByDevice;
                }
            }
        };

        session.disconnected = Some(disconnected);
        Ok(ended)
    }

    async fn disconnect_by_user(&self, device: &DeviceHandle) -> Result<()> {
        self.store.log("Disconnected by user...");
        self.store
            .dispatch(Action::ConnectionStateChanged(ConnectionState::Disconnecting));
        self.adapter.cancel_connection(device).await
    }

    async fn cleanup(&self, session: Session) {
        let Session {
            commands,
            disconnected,
            test,
            ..
        } = session;

        if let Some(test) = test {
            test.cancel().await;
        }
        drop(disconnected);
        drop(commands);

        self.store.dispatch(Action::TestFinished);
        self.store
            .dispatch(Action::ConnectionStateChanged(ConnectionState::Disconnected));
    }
}

async fn cancellable<T>(
    token: &CancellationToken,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::Cancelled),
        result = operation => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAdapter;

    fn connection_states(actions: &mut Subscription<Action>) -> Vec<ConnectionState> {
        let mut states = Vec::new();
        while let Some(action) = actions.try_recv() {
            if let Action::ConnectionStateChanged(state) = action {
                states.push(state);
            }
        }
        states
    }

    #[tokio::test]
    async fn test_connect_failure_cleans_up() {
        let adapter = Arc::new(MockAdapter::new());
        adapter.fail_next_connects(1);
        let store = Arc::new(Store::new());
        let mut actions = store.subscribe_all();
        let manager = ConnectionManager::new(adapter.clone(), Arc::clone(&store));

        manager
            .handle_connection(adapter.device(), &CancellationToken::new())
            .await;

        assert_eq!(
            connection_states(&mut actions),
            vec![ConnectionState::Connecting, ConnectionState::Disconnected]
        );
        let logs: Vec<_> = store.state().logs.iter().cloned().collect();
        assert!(
            logs.iter()
                .any(|l| l.starts_with("ERROR: ") && l.contains("reason: GATT_ERROR"))
        );
        assert_eq!(adapter.disconnect_subscriber_count(adapter.device().id()), 0);
    }

    #[tokio::test]
    async fn test_discover_failure_cleans_up() {
        let adapter = Arc::new(MockAdapter::new());
        adapter.fail_next_discoveries(1);
        let store = Arc::new(Store::new());
        let mut actions = store.subscribe_all();
        let manager = ConnectionManager::new(adapter.clone(), Arc::clone(&store));

        manager
            .handle_connection(adapter.device(), &CancellationToken::new())
            .await;

        assert_eq!(
            connection_states(&mut actions),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Discovering,
                ConnectionState::Disconnected
            ]
        );
        assert_eq!(store.state().current_test_id, None);
    }

    #[tokio::test]
    async fn test_shutdown_while_connected_cancels_connection() {
        let adapter = Arc::new(MockAdapter::new());
        let store = Arc::new(Store::new());
        let token = CancellationToken::new();
        let mut states = store.subscribe(&[ActionKind::ConnectionStateChanged]);
        let manager = ConnectionManager::new(adapter.clone(), Arc::clone(&store));
        let device = adapter.device();

        let task = tokio::spawn({
            let token = token.clone();
            async move { manager.run(token).await }
        });

        store.connect(device.clone());
        loop {
            if states.recv().await == Some(Action::ConnectionStateChanged(ConnectionState::Connected)) {
                break;
            }
        }
        token.cancel();
        task.await.unwrap();

        assert_eq!(adapter.cancel_calls(), 1);
        assert!(!adapter.is_connected(device.id()));
        assert_eq!(store.state().connection_state, ConnectionState::Disconnected);
    }
}
