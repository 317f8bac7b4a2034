//! The root supervisor.
//!
//! [`Orchestrator`] forks the three permanent tasks (adapter-state watcher,
//! scan controller, connection manager) under one cancellation token and
//! owns their shutdown. Front ends talk to it only through the command
//! emitters and the state projection.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tagprobe_types::DeviceHandle;

use crate::adapter::{BleAdapter, ScanOptions};
use crate::connection::ConnectionManager;
use crate::permission::{PlatformPermission, ScanPermission};
use crate::scan::ScanController;
use crate::state::ApplicationState;
use crate::store::Store;
use crate::task::TaskHandle;
use crate::view::StatusView;
use crate::watcher::watch_adapter_state;

/// Builder for an [`Orchestrator`].
pub struct OrchestratorBuilder {
    adapter: Arc<dyn BleAdapter>,
    store: Option<Arc<Store>>,
    permission: Arc<dyn ScanPermission>,
    scan_options: ScanOptions,
}

impl OrchestratorBuilder {
    /// Use an existing store instead of a fresh one.
    #[must_use]
    pub fn store(mut self, store: Arc<Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the scan permission hook.
    #[must_use]
    pub fn permission(mut self, permission: Arc<dyn ScanPermission>) -> Self {
        self.permission = permission;
        self
    }

    /// Set the scan options.
    #[must_use]
    pub fn scan_options(mut self, options: ScanOptions) -> Self {
        self.scan_options = options;
        self
    }

    /// Fork the permanent tasks. Must be called inside a tokio runtime.
    pub fn start(self) -> Orchestrator {
        let store = self.store.unwrap_or_default();
        let token = CancellationToken::new();

        // Subscribers first, so the watcher's first notification is seen.
        let scan_controller = ScanController::new(
            Arc::clone(&self.adapter),
            Arc::clone(&store),
            self.permission,
            self.scan_options,
        );
        let connection_manager =
            ConnectionManager::new(Arc::clone(&self.adapter), Arc::clone(&store));

        let connection = TaskHandle::spawn_child(&token, |token| connection_manager.run(token));
        let scan = TaskHandle::spawn_child(&token, |token| scan_controller.run(token));
        let watcher = {
            let adapter = Arc::clone(&self.adapter);
            let store = Arc::clone(&store);
            TaskHandle::spawn_child(&token, move |token| {
                watch_adapter_state(adapter, store, token)
            })
        };
        info!("Orchestrator started");

        Orchestrator {
            store,
            token,
            tasks: vec![watcher, scan, connection],
        }
    }
}

/// Running orchestration tasks plus the store they share.
pub struct Orchestrator {
    store: Arc<Store>,
    token: CancellationToken,
    tasks: Vec<TaskHandle>,
}

impl Orchestrator {
    /// Start building an orchestrator over `adapter`.
    pub fn builder(adapter: Arc<dyn BleAdapter>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            adapter,
            store: None,
            permission: Arc::new(PlatformPermission::current()),
            scan_options: ScanOptions::default(),
        }
    }

    /// Start with default settings.
    pub fn start(adapter: Arc<dyn BleAdapter>) -> Self {
        Self::builder(adapter).start()
    }

    /// The shared store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// The current state snapshot.
    pub fn state(&self) -> Arc<ApplicationState> {
        self.store.state()
    }

    /// Watch state snapshots.
    pub fn watch(&self) -> watch::Receiver<Arc<ApplicationState>> {
        self.store.watch()
    }

    /// The current presentation projection.
    pub fn view(&self) -> StatusView {
        StatusView::new(&self.store.state())
    }

    /// Whether the orchestrator is still running.
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    // --- Command emitters ---

    /// Empty the event log.
    pub fn clear_logs(&self) {
        self.store.clear_logs();
    }

    /// Connect to the active device, if there is one.
    pub fn connect_active(&self) -> Option<DeviceHandle> {
        self.store.connect_active()
    }

    /// Disconnect the current device.
    pub fn disconnect(&self) {
        self.store.disconnect();
    }

    /// Run a registered test on the connected device.
    pub fn execute_test(&self, id: impl Into<String>) {
        self.store.execute_test(id);
    }

    /// Forget the active device.
    pub fn forget_device(&self) {
        self.store.forget_device();
    }

    /// Cancel every task and wait for their cleanup to finish.
    pub async fn shutdown(self) {
        info!("Orchestrator shutting down");
        self.token.cancel();
        for task in self.tasks {
            task.join().await;
        }
        info!("Orchestrator stopped");
    }
}
