//! The hardware adapter seam.
//!
//! This module provides the [`BleAdapter`] trait that abstracts over the
//! btleplug stack ([`crate::BtleplugAdapter`]) and the scriptable in-memory
//! adapter used for tests and demo mode ([`crate::MockAdapter`]).
//!
//! Notification-style operations return a [`Subscription`]; dropping it
//! releases the underlying registration.

use async_trait::async_trait;
use uuid::Uuid;

use tagprobe_types::{AdapterState, DeviceHandle};

use crate::error::{Error, Result};
use crate::subscription::Subscription;

/// Options for starting a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Report every advertisement, not only the first one per peripheral.
    pub allow_duplicates: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            allow_duplicates: true,
        }
    }
}

impl ScanOptions {
    /// Set whether duplicate advertisements are reported.
    #[must_use]
    pub fn allow_duplicates(mut self, allow: bool) -> Self {
        self.allow_duplicates = allow;
        self
    }
}

/// One item from a running scan.
#[derive(Debug)]
pub enum ScanEvent {
    /// A peripheral advertisement was seen.
    Discovered(DeviceHandle),
    /// The scan reported an error. The scan keeps running.
    Error(Error),
}

/// Capabilities of a GATT characteristic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharacteristicProperties {
    /// The value can be read.
    pub readable: bool,
    /// The value can be written with a response.
    pub writable_with_response: bool,
    /// The value can be written without a response.
    pub writable_without_response: bool,
    /// The characteristic supports notifications.
    pub notifiable: bool,
}

impl CharacteristicProperties {
    /// Read-only characteristic.
    pub const READ: Self = Self {
        readable: true,
        writable_with_response: false,
        writable_without_response: false,
        notifiable: false,
    };

    /// Readable and writable with response.
    pub const READ_WRITE: Self = Self {
        readable: true,
        writable_with_response: true,
        writable_without_response: false,
        notifiable: false,
    };
}

/// A discovered GATT characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicInfo {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// UUID of the service that owns it.
    pub service_uuid: Uuid,
    /// What the characteristic supports.
    pub properties: CharacteristicProperties,
}

/// A discovered GATT service with its characteristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Service UUID.
    pub uuid: Uuid,
    /// Characteristics in discovery order.
    pub characteristics: Vec<CharacteristicInfo>,
}

impl ServiceInfo {
    /// Find a characteristic of this service by UUID.
    pub fn characteristic(&self, uuid: Uuid) -> Option<&CharacteristicInfo> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

/// Trait abstracting the host Bluetooth adapter.
///
/// # Example
///
/// ```ignore
/// use tagprobe_core::{BleAdapter, ScanEvent, ScanOptions};
///
/// async fn first_device<A: BleAdapter>(adapter: &A) -> tagprobe_core::Result<()> {
///     let mut scan = adapter.start_scan(ScanOptions::default()).await?;
///     if let Some(ScanEvent::Discovered(device)) = scan.recv().await {
///         println!("found {}", device);
///     }
///     drop(scan);
///     adapter.stop_scan().await
/// }
/// ```
#[async_trait]
pub trait BleAdapter: Send + Sync {
    // --- Adapter ---

    /// Subscribe to power-state changes.
    ///
    /// The current state is delivered first, then every change in order.
    async fn power_state_changes(&self) -> Result<Subscription<AdapterState>>;

    /// Start scanning with no service filter.
    async fn start_scan(&self, options: ScanOptions) -> Result<Subscription<ScanEvent>>;

    /// Stop a scan started with [`BleAdapter::start_scan`].
    async fn stop_scan(&self) -> Result<()>;

    // --- Connection ---

    /// Connect to a discovered peripheral.
    async fn connect(&self, device: &DeviceHandle) -> Result<()>;

    /// Discover all services and characteristics of a connected peripheral.
    async fn discover_services(&self, device: &DeviceHandle) -> Result<()>;

    /// Cancel the connection (or a pending connection attempt).
    async fn cancel_connection(&self, device: &DeviceHandle) -> Result<()>;

    /// Subscribe to an unsolicited disconnect of `device`.
    ///
    /// Yields once per disconnect, carrying the error the stack reported, if
    /// any.
    async fn on_disconnected(&self, device: &DeviceHandle) -> Result<Subscription<Option<Error>>>;

    // --- GATT ---

    /// Services discovered on a connected peripheral.
    async fn services(&self, device: &DeviceHandle) -> Result<Vec<ServiceInfo>>;

    /// Read a characteristic value.
    async fn read_characteristic(
        &self,
        device: &DeviceHandle,
        characteristic: &CharacteristicInfo,
    ) -> Result<Vec<u8>>;

    /// Write a characteristic value and wait for the response.
    async fn write_characteristic_with_response(
        &self,
        device: &DeviceHandle,
        characteristic: &CharacteristicInfo,
        value: &[u8],
    ) -> Result<()>;
}
