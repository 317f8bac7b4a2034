//! Orchestration core for the tagprobe BLE peripheral test bench.
//!
//! This crate coordinates one peripheral's discovery, connection and
//! scripted tests on top of an asynchronous, event-emitting adapter.
//!
//! # Architecture
//!
//! All state lives in a [`Store`] and changes only through [`Action`]s
//! reduced by [`reduce`]. Three permanent tasks react to those actions:
//!
//! | Task | Follows | Emits |
//! |------|---------|-------|
//! | [`watch_adapter_state`] | adapter power notifications | `AdapterStateChanged` |
//! | [`ScanController`] | adapter and connection state | starts/stops [`run_scan`] |
//! | [`ConnectionManager`] | `Connect`, `Disconnect`, `ExecuteTest` | `ConnectionStateChanged`, runs [`run_test`] |
//!
//! The [`Orchestrator`] forks them and owns their shutdown.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tagprobe_core::{BtleplugAdapter, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = Arc::new(BtleplugAdapter::new().await?);
//!     let orchestrator = Orchestrator::start(adapter);
//!
//!     let mut states = orchestrator.watch();
//!     while states.changed().await.is_ok() {
//!         if orchestrator.view().can_connect {
//!             orchestrator.connect_active();
//!             break;
//!         }
//!     }
//!
//!     orchestrator.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod btle;
pub mod connection;
pub mod error;
pub mod mock;
pub mod permission;
pub mod procedures;
pub mod runtime;
pub mod scan;
pub mod state;
pub mod store;
pub mod subscription;
pub mod task;
pub mod testing;
pub mod view;
pub mod watcher;

// Re-export the shared types crate
pub use tagprobe_types::{AdapterState, ConnectionState, DeviceHandle, uuids};

// Core exports
pub use adapter::{
    BleAdapter, CharacteristicInfo, CharacteristicProperties, ScanEvent, ScanOptions, ServiceInfo,
};
pub use btle::BtleplugAdapter;
pub use connection::ConnectionManager;
pub use error::{BleError, BleErrorCode, Error, Result};
pub use mock::{MockAdapter, MockAdapterBuilder};
pub use permission::{PermissionStatus, Platform, PlatformPermission, ScanPermission};
pub use runtime::{Orchestrator, OrchestratorBuilder};
pub use scan::{ScanController, run_scan};
pub use state::{Action, ActionKind, ApplicationState, reduce};
pub use store::Store;
pub use subscription::{Emitter, Subscription};
pub use task::TaskHandle;
pub use testing::{TESTS, TestContext, TestDescriptor, find_test, run_test};
pub use view::StatusView;
pub use watcher::watch_adapter_state;
