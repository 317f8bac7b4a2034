//! Scan control.
//!
//! [`ScanController`] decides whether scanning should run and owns the one
//! [`run_scan`] task that does it. Scanning should run while the adapter is
//! powered on and no connection is in progress or established.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use tagprobe_types::{AdapterState, ConnectionState};

use crate::adapter::{BleAdapter, ScanEvent, ScanOptions};
use crate::permission::ScanPermission;
use crate::state::{Action, ActionKind};
use crate::store::Store;
use crate::subscription::Subscription;
use crate::task::TaskHandle;

/// Whether scanning should be active for the given states.
pub fn should_scan(adapter_state: AdapterState, connection_state: ConnectionState) -> bool {
    adapter_state.is_powered_on() && connection_state.allows_scanning()
}

/// Starts and stops the scan task as adapter and connection state change.
pub struct ScanController {
    adapter: Arc<dyn BleAdapter>,
    store: Arc<Store>,
    permission: Arc<dyn ScanPermission>,
    options: ScanOptions,
    transitions: Subscription<Action>,
    adapter_state: AdapterState,
    connection_state: ConnectionState,
    scan_task: Option<TaskHandle>,
}

impl ScanController {
    /// Create a controller. State transitions are queued from this point on;
    /// nothing runs until [`ScanController::run`] or
    /// [`ScanController::observe`] is called.
    pub fn new(
        adapter: Arc<dyn BleAdapter>,
        store: Arc<Store>,
        permission: Arc<dyn ScanPermission>,
        options: ScanOptions,
    ) -> Self {
        let transitions = store.subscribe(&[
            ActionKind::AdapterStateChanged,
            ActionKind::ConnectionStateChanged,
        ]);
        Self {
            adapter,
            store,
            permission,
            options,
            transitions,
            adapter_state: AdapterState::default(),
            connection_state: ConnectionState::default(),
            scan_task: None,
        }
    }

    /// Whether scanning should be active for the last observed states.
    pub fn should_scan(&self) -> bool {
        should_scan(self.adapter_state, self.connection_state)
    }

    /// Whether a scan task currently holds the scan slot.
    ///
    /// A task that ended on its own (for example after a permission denial)
    /// keeps the slot until scanning should stop, so it is not restarted.
    pub fn is_scanning(&self) -> bool {
        self.scan_task.is_some()
    }

    /// Update the local mirrors from one action and start or stop the scan
    /// task if the decision flipped. Other actions are ignored.
    pub async fn observe(&mut self, action: &Action) {
        match action {
            Action::AdapterStateChanged(state) => self.adapter_state = *state,
            Action::ConnectionStateChanged(state) => self.connection_state = *state,
            _ => return,
        }
        self.reconcile().await;
    }

    async fn reconcile(&mut self) {
        let should_scan = self.should_scan();
        if should_scan == self.is_scanning() {
            return;
        }

        if let Some(task) = self.scan_task.take() {
            debug!("Stopping scan task");
            task.cancel().await;
        }
        if should_scan {
            debug!("Starting scan task");
            let adapter = Arc::clone(&self.adapter);
            let store = Arc::clone(&self.store);
            let permission = Arc::clone(&self.permission);
            let options = self.options.clone();
            self.scan_task = Some(TaskHandle::spawn(move |token| {
                run_scan(adapter, store, permission, options, token)
            }));
        }
    }

    /// Follow adapter and connection state changes until cancelled, then
    /// stop any running scan.
    #[instrument(skip_all)]
    pub async fn run(mut self, token: CancellationToken) {
        // Anything dispatched before the subscription existed is already in
        // the state; replaying a value that is also queued cannot flip twice.
        let state = self.store.state();
        self.adapter_state = state.adapter_state;
        self.connection_state = state.connection_state;
        self.reconcile().await;

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                action = self.transitions.recv() => match action {
                    Some(action) => self.observe(&action).await,
                    None => break,
                },
            }
        }

        if let Some(task) = self.scan_task.take() {
            task.cancel().await;
        }
    }
}

/// Scan for peripherals until cancelled.
///
/// Checks (and if needed requests) the scan permission, starts the scan and
/// republishes discoveries as [`Action::DeviceDiscovered`]. Scan errors are
/// logged and scanning continues. On every exit path after the scan was
/// started, "Scanning stopped..." is logged, the event stream is released
/// and the hardware scan is stopped exactly once.
#[instrument(skip_all)]
pub async fn run_scan(
    adapter: Arc<dyn BleAdapter>,
    store: Arc<Store>,
    permission: Arc<dyn ScanPermission>,
    options: ScanOptions,
    token: CancellationToken,
) {
    if permission.is_required() {
        store.log("Scanning: Checking permissions...");
        let granted = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            granted = permission.check() => granted,
        };
        if !granted {
            store.log("Scanning: Permissions disabled, showing...");
            let status = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                status = permission.request() => status,
            };
            if !status.is_granted() {
                info!("Scan permission not granted: {:?}", status);
                store.log("Scanning: Permissions not granted, aborting...");
                return;
            }
        }
    }

    store.log("Scanning started...");
    info!("Scanning started");
    let mut events = match adapter.start_scan(options).await {
        Ok(events) => Some(events),
        Err(e) => {
            warn!("Failed to start scan: {}", e);
            store.dispatch(Action::log_error(&e));
            None
        }
    };

    if let Some(events) = events.as_mut() {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                event = events.recv() => match event {
                    Some(ScanEvent::Discovered(device)) => {
                        debug!("Discovered {}", device);
                        store.dispatch(Action::DeviceDiscovered(device));
                    }
                    Some(ScanEvent::Error(e)) => {
                        warn!("Scan error: {}", e);
                        store.log(e.to_string());
                    }
                    None => {
                        debug!("Scan event stream closed");
                        break;
                    }
                },
            }
        }
    }

    store.log("Scanning stopped...");
    drop(events);
    if let Err(e) = adapter.stop_scan().await {
        warn!("Failed to stop scan: {}", e);
    }
    info!("Scanning stopped");
}
