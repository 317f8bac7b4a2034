//! Mock adapter implementation for testing and demo mode.
//!
//! This module provides an in-memory [`BleAdapter`] that behaves like a host
//! adapter with a single SensorTag-like peripheral in range, without
//! requiring actual BLE hardware.
//!
//! # Features
//!
//! - **Scripted events**: Change the power state, inject scan results and
//!   scan errors, or make the peripheral drop the connection
//! - **Failure injection**: Fail the next N connect or discovery attempts
//! - **Latency simulation**: Delay connects and characteristic reads
//! - **Call accounting**: Count scan starts/stops and connection cancels

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use tagprobe_types::{AdapterState, DeviceHandle, uuids};

use crate::adapter::{
    BleAdapter, CharacteristicInfo, CharacteristicProperties, ScanEvent, ScanOptions, ServiceInfo,
};
use crate::error::{BleError, BleErrorCode, Error, Result};
use crate::subscription::{Emitter, Subscription};

/// Raw IR temperature sample served by the default profile (25.0 °C / 21.5 °C).
pub const MOCK_IR_TEMPERATURE: [u8; 4] = [0x80, 0x0C, 0xC0, 0x0A];

type Registry<T> = Arc<Mutex<Vec<(u64, Emitter<T>)>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A mock host adapter for testing.
///
/// Implements [`BleAdapter`] for use in the orchestrator and in tests.
///
/// # Example
///
/// ```
/// use tagprobe_core::{BleAdapter, MockAdapter, ScanEvent, ScanOptions};
///
/// #[tokio::main]
/// async fn main() {
///     let adapter = MockAdapter::new();
///     let mut scan = adapter.start_scan(ScanOptions::default()).await.unwrap();
///     match scan.recv().await {
///         Some(ScanEvent::Discovered(device)) => assert_eq!(device.name(), Some("SensorTag")),
///         other => panic!("unexpected {:?}", other),
///     }
///     adapter.stop_scan().await.unwrap();
///     assert_eq!(adapter.stop_scan_calls(), 1);
/// }
/// ```
pub struct MockAdapter {
    devices: Vec<DeviceHandle>,
    power_state: Mutex<AdapterState>,
    power_subscribers: Registry<AdapterState>,
    scan: Mutex<Option<Emitter<ScanEvent>>>,
    connected: Mutex<HashSet<String>>,
    disconnect_subscribers: Arc<Mutex<HashMap<String, Vec<(u64, Emitter<Option<Error>>)>>>>,
    services: Mutex<Vec<ServiceInfo>>,
    values: Mutex<HashMap<Uuid, Vec<u8>>>,
    writes: Mutex<Vec<(Uuid, Vec<u8>)>>,
    next_id: AtomicU64,
    start_scan_calls: AtomicU32,
    stop_scan_calls: AtomicU32,
    connect_calls: AtomicU32,
    cancel_calls: AtomicU32,
    /// Simulated read latency in milliseconds (0 = no delay).
    read_latency_ms: AtomicU64,
    /// Simulated connect latency in milliseconds (0 = no delay).
    connect_latency_ms: AtomicU64,
    connect_failures: AtomicU32,
    discover_failures: AtomicU32,
}

impl std::fmt::Debug for MockAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockAdapter")
            .field("devices", &self.devices)
            .field("power_state", &*lock(&self.power_state))
            .field("scanning", &lock(&self.scan).is_some())
            .finish()
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdapter {
    /// Create a powered-on adapter with one SensorTag in range.
    pub fn new() -> Self {
        MockAdapterBuilder::new().build()
    }

    /// Create a builder for a customized adapter.
    pub fn builder() -> MockAdapterBuilder {
        MockAdapterBuilder::new()
    }

    /// The first peripheral in range.
    pub fn device(&self) -> DeviceHandle {
        self.devices
            .first()
            .cloned()
            .unwrap_or_else(|| DeviceHandle::new("MOCK-000000"))
    }

    /// All peripherals in range.
    pub fn devices(&self) -> &[DeviceHandle] {
        &self.devices
    }

    /// The services and characteristics of a SensorTag.
    pub fn sensor_tag_profile() -> Vec<ServiceInfo> {
        let characteristic = |service_uuid, uuid, properties| CharacteristicInfo {
            uuid,
            service_uuid,
            properties,
        };
        vec![
            ServiceInfo {
                uuid: uuids::GAP_SERVICE,
                characteristics: vec![
                    characteristic(
                        uuids::GAP_SERVICE,
                        uuid::uuid!("00002a00-0000-1000-8000-00805f9b34fb"),
                        CharacteristicProperties::READ,
                    ),
                    characteristic(
                        uuids::GAP_SERVICE,
                        uuids::GAP_APPEARANCE,
                        CharacteristicProperties::READ,
                    ),
                ],
            },
            ServiceInfo {
                uuid: uuids::IR_TEMPERATURE_SERVICE,
                characteristics: vec![
                    characteristic(
                        uuids::IR_TEMPERATURE_SERVICE,
                        uuids::IR_TEMPERATURE_DATA,
                        CharacteristicProperties {
                            notifiable: true,
                            ..CharacteristicProperties::READ
                        },
                    ),
                    characteristic(
                        uuids::IR_TEMPERATURE_SERVICE,
                        uuids::IR_TEMPERATURE_CONFIG,
                        CharacteristicProperties::READ_WRITE,
                    ),
                    characteristic(
                        uuids::IR_TEMPERATURE_SERVICE,
                        uuids::IR_TEMPERATURE_PERIOD,
                        CharacteristicProperties::READ_WRITE,
                    ),
                ],
            },
        ]
    }

    fn sensor_tag_values() -> HashMap<Uuid, Vec<u8>> {
        HashMap::from([
            (
                uuid::uuid!("00002a00-0000-1000-8000-00805f9b34fb"),
                b"SensorTag".to_vec(),
            ),
            (uuids::GAP_APPEARANCE, vec![0x00, 0x00]),
            (uuids::IR_TEMPERATURE_DATA, MOCK_IR_TEMPERATURE.to_vec()),
            (uuids::IR_TEMPERATURE_CONFIG, vec![0x00]),
            // 300 ms, in units of 10 ms.
            (uuids::IR_TEMPERATURE_PERIOD, vec![30]),
        ])
    }

    // --- Scripting ---

    /// Change the power state and notify every subscriber.
    pub fn set_power_state(&self, state: AdapterState) {
        let mut subscribers = lock(&self.power_subscribers);
        *lock(&self.power_state) = state;
        subscribers.retain(|(_, tx)| tx.send(state).is_ok());
    }

    /// The current power state.
    pub fn power_state(&self) -> AdapterState {
        *lock(&self.power_state)
    }

    /// Report a discovery on the running scan. Returns false if not scanning.
    pub fn emit_discovery(&self, device: DeviceHandle) -> bool {
        self.emit_scan_event(ScanEvent::Discovered(device))
    }

    /// Report a scan error on the running scan. Returns false if not scanning.
    pub fn emit_scan_error(&self, error: BleError) -> bool {
        self.emit_scan_event(ScanEvent::Error(Error::Ble(error)))
    }

    fn emit_scan_event(&self, event: ScanEvent) -> bool {
        lock(&self.scan)
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Make the peripheral drop the connection on its own.
    ///
    /// Returns the number of disconnect subscribers notified.
    pub fn trigger_disconnect(&self, device_id: &str, error: Option<BleError>) -> usize {
        lock(&self.connected).remove(device_id);
        let subscribers = lock(&self.disconnect_subscribers);
        let Some(subscribers) = subscribers.get(device_id) else {
            return 0;
        };
        subscribers
            .iter()
            .filter(|(_, tx)| tx.send(error.clone().map(Error::Ble)).is_ok())
            .count()
    }

    /// Fail the next `count` connect attempts.
    pub fn fail_next_connects(&self, count: u32) {
        self.connect_failures.store(count, Ordering::Relaxed);
    }

    /// Fail the next `count` service discoveries.
    pub fn fail_next_discoveries(&self, count: u32) {
        self.discover_failures.store(count, Ordering::Relaxed);
    }

    /// Set simulated read latency.
    ///
    /// Set to `Duration::ZERO` to disable latency simulation.
    pub fn set_read_latency(&self, latency: Duration) {
        self.read_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Set simulated connect latency.
    ///
    /// Set to `Duration::ZERO` to disable latency simulation.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Replace the value served for a characteristic.
    pub fn set_value(&self, uuid: Uuid, value: Vec<u8>) {
        lock(&self.values).insert(uuid, value);
    }

    /// Replace the GATT profile.
    pub fn set_services(&self, services: Vec<ServiceInfo>) {
        *lock(&self.services) = services;
    }

    // --- Accounting ---

    /// Number of `start_scan` calls.
    pub fn start_scan_calls(&self) -> u32 {
        self.start_scan_calls.load(Ordering::SeqCst)
    }

    /// Number of `stop_scan` calls.
    pub fn stop_scan_calls(&self) -> u32 {
        self.stop_scan_calls.load(Ordering::SeqCst)
    }

    /// Number of `connect` calls.
    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Number of `cancel_connection` calls.
    pub fn cancel_calls(&self) -> u32 {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    /// Whether a scan is running.
    pub fn is_scanning(&self) -> bool {
        lock(&self.scan).is_some()
    }

    /// Whether the peripheral is connected.
    pub fn is_connected(&self, device_id: &str) -> bool {
        lock(&self.connected).contains(device_id)
    }

    /// Number of live power-state subscriptions.
    pub fn power_subscriber_count(&self) -> usize {
        lock(&self.power_subscribers).len()
    }

    /// Number of live disconnect subscriptions for a peripheral.
    pub fn disconnect_subscriber_count(&self, device_id: &str) -> usize {
        lock(&self.disconnect_subscribers)
            .get(device_id)
            .map_or(0, Vec::len)
    }

    /// Every value written, in order.
    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        lock(&self.writes).clone()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn check_connected(&self, device: &DeviceHandle) -> Result<()> {
        if self.is_connected(device.id()) {
            Ok(())
        } else {
            Err(Error::ble(
                BleErrorCode::DeviceNotConnected,
                format!("Device {} is not connected", device.id()),
            ))
        }
    }

    fn check_known(&self, device: &DeviceHandle) -> Result<()> {
        if self.devices.iter().any(|d| d.id() == device.id()) {
            Ok(())
        } else {
            Err(Error::device_not_found(device.id()))
        }
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn simulate_latency(latency_ms: &AtomicU64) {
        let latency = latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
    }
}

#[async_trait]
impl BleAdapter for MockAdapter {
    async fn power_state_changes(&self) -> Result<Subscription<AdapterState>> {
        let (tx, subscription) = Subscription::channel();
        let id = self.next_id();
        {
            // Hold the registry while reading the state so no change slips
            // between the current value and the first notification.
            let mut subscribers = lock(&self.power_subscribers);
            let _ = tx.send(*lock(&self.power_state));
            subscribers.push((id, tx));
        }
        let registry = Arc::clone(&self.power_subscribers);
        Ok(subscription.on_close(move || {
            lock(&registry).retain(|(sub_id, _)| *sub_id != id);
        }))
    }

    async fn start_scan(&self, options: ScanOptions) -> Result<Subscription<ScanEvent>> {
        self.start_scan_calls.fetch_add(1, Ordering::SeqCst);
        if !self.power_state().is_powered_on() {
            return Err(Error::ble(
                BleErrorCode::BluetoothPoweredOff,
                "Bluetooth is powered off",
            ));
        }
        let (tx, subscription) = Subscription::channel();
        for device in &self.devices {
            let _ = tx.send(ScanEvent::Discovered(device.clone()));
            if options.allow_duplicates {
                let _ = tx.send(ScanEvent::Discovered(device.clone()));
            }
        }
        *lock(&self.scan) = Some(tx);
        Ok(subscription)
    }

    async fn stop_scan(&self) -> Result<()> {
        self.stop_scan_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.scan).take();
        Ok(())
    }

    async fn connect(&self, device: &DeviceHandle) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        Self::simulate_latency(&self.connect_latency_ms).await;
        self.check_known(device)?;
        if Self::take_failure(&self.connect_failures) {
            return Err(Error::Ble(
                BleError::new(
                    BleErrorCode::DeviceConnectionFailed,
                    format!("Device {} connection failed", device.id()),
                )
                .with_reason("GATT_ERROR")
                .with_android_error_code(133),
            ));
        }
        lock(&self.connected).insert(device.id().to_string());
        Ok(())
    }

    async fn discover_services(&self, device: &DeviceHandle) -> Result<()> {
        self.check_connected(device)?;
        if Self::take_failure(&self.discover_failures) {
            return Err(Error::ble(
                BleErrorCode::ServicesDiscoveryFailed,
                format!("Services discovery failed for device {}", device.id()),
            ));
        }
        Ok(())
    }

    async fn cancel_connection(&self, device: &DeviceHandle) -> Result<()> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.connected).remove(device.id());
        Ok(())
    }

    async fn on_disconnected(&self, device: &DeviceHandle) -> Result<Subscription<Option<Error>>> {
        let (tx, subscription) = Subscription::channel();
        let id = self.next_id();
        let key = device.id().to_string();
        lock(&self.disconnect_subscribers)
            .entry(key.clone())
            .or_default()
            .push((id, tx));
        let registry = Arc::clone(&self.disconnect_subscribers);
        Ok(subscription.on_close(move || {
            let mut registry = lock(&registry);
            if let Some(subscribers) = registry.get_mut(&key) {
                subscribers.retain(|(sub_id, _)| *sub_id != id);
                if subscribers.is_empty() {
                    registry.remove(&key);
                }
            }
        }))
    }

    async fn services(&self, device: &DeviceHandle) -> Result<Vec<ServiceInfo>> {
        self.check_connected(device)?;
        Ok(lock(&self.services).clone())
    }

    async fn read_characteristic(
        &self,
        device: &DeviceHandle,
        characteristic: &CharacteristicInfo,
    ) -> Result<Vec<u8>> {
        self.check_connected(device)?;
        Self::simulate_latency(&self.read_latency_ms).await;
        if !characteristic.properties.readable {
            return Err(Error::ble(
                BleErrorCode::CharacteristicReadFailed,
                format!("Characteristic {} is not readable", characteristic.uuid),
            ));
        }
        lock(&self.values)
            .get(&characteristic.uuid)
            .cloned()
            .ok_or_else(|| {
                Error::characteristic_not_found(
                    characteristic.uuid.to_string(),
                    lock(&self.services).len(),
                )
            })
    }

    async fn write_characteristic_with_response(
        &self,
        device: &DeviceHandle,
        characteristic: &CharacteristicInfo,
        value: &[u8],
    ) -> Result<()> {
        self.check_connected(device)?;
        if !characteristic.properties.writable_with_response {
            return Err(Error::ble(
                BleErrorCode::CharacteristicWriteFailed,
                format!("Characteristic {} is not writable", characteristic.uuid),
            ));
        }
        lock(&self.values).insert(characteristic.uuid, value.to_vec());
        lock(&self.writes).push((characteristic.uuid, value.to_vec()));
        Ok(())
    }
}

/// Builder for creating mock adapters with custom settings.
#[derive(Debug)]
pub struct MockAdapterBuilder {
    devices: Vec<DeviceHandle>,
    power_state: AdapterState,
    services: Vec<ServiceInfo>,
    values: HashMap<Uuid, Vec<u8>>,
    read_latency: Duration,
    connect_latency: Duration,
}

impl Default for MockAdapterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdapterBuilder {
    /// Create a new builder with a SensorTag profile and a random address.
    pub fn new() -> Self {
        let address = format!("MOCK-{:06X}", rand::random::<u32>() % 0xFFFFFF);
        Self {
            devices: vec![DeviceHandle::with_name(address, "SensorTag")],
            power_state: AdapterState::PoweredOn,
            services: MockAdapter::sensor_tag_profile(),
            values: MockAdapter::sensor_tag_values(),
            read_latency: Duration::ZERO,
            connect_latency: Duration::ZERO,
        }
    }

    /// Set the initial power state.
    #[must_use]
    pub fn power_state(mut self, state: AdapterState) -> Self {
        self.power_state = state;
        self
    }

    /// Replace the peripherals in range.
    #[must_use]
    pub fn devices(mut self, devices: Vec<DeviceHandle>) -> Self {
        self.devices = devices;
        self
    }

    /// Replace the GATT profile.
    #[must_use]
    pub fn services(mut self, services: Vec<ServiceInfo>) -> Self {
        self.services = services;
        self
    }

    /// Set the value served for a characteristic.
    #[must_use]
    pub fn value(mut self, uuid: Uuid, value: Vec<u8>) -> Self {
        self.values.insert(uuid, value);
        self
    }

    /// Set simulated read latency.
    #[must_use]
    pub fn read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = latency;
        self
    }

    /// Set simulated connect latency.
    #[must_use]
    pub fn connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }

    /// Build the mock adapter.
    pub fn build(self) -> MockAdapter {
        MockAdapter {
            devices: self.devices,
            power_state: Mutex::new(self.power_state),
            power_subscribers: Arc::new(Mutex::new(Vec::new())),
            scan: Mutex::new(None),
            connected: Mutex::new(HashSet::new()),
            disconnect_subscribers: Arc::new(Mutex::new(HashMap::new())),
            services: Mutex::new(self.services),
            values: Mutex::new(self.values),
            writes: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            start_scan_calls: AtomicU32::new(0),
            stop_scan_calls: AtomicU32::new(0),
            connect_calls: AtomicU32::new(0),
            cancel_calls: AtomicU32::new(0),
            read_latency_ms: AtomicU64::new(self.read_latency.as_millis() as u64),
            connect_latency_ms: AtomicU64::new(self.connect_latency.as_millis() as u64),
            connect_failures: AtomicU32::new(0),
            discover_failures: AtomicU32::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_power_subscription_starts_with_current_state() {
        let adapter = MockAdapter::builder()
            .power_state(AdapterState::PoweredOff)
            .build();
        let mut states = adapter.power_state_changes().await.unwrap();
        assert_eq!(states.recv().await, Some(AdapterState::PoweredOff));

        adapter.set_power_state(AdapterState::PoweredOn);
        assert_eq!(states.recv().await, Some(AdapterState::PoweredOn));

        assert_eq!(adapter.power_subscriber_count(), 1);
        drop(states);
        assert_eq!(adapter.power_subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_scan_requires_power() {
        let adapter = MockAdapter::builder()
            .power_state(AdapterState::PoweredOff)
            .build();
        assert!(adapter.start_scan(ScanOptions::default()).await.is_err());
        assert_eq!(adapter.start_scan_calls(), 1);
        assert!(!adapter.is_scanning());
    }

    #[tokio::test]
    async fn test_scan_events() {
        let adapter = MockAdapter::new();
        let mut scan = adapter
            .start_scan(ScanOptions::default().allow_duplicates(false))
            .await
            .unwrap();
        assert!(matches!(scan.recv().await, Some(ScanEvent::Discovered(_))));

        assert!(adapter.emit_scan_error(BleError::new(BleErrorCode::Unknown, "boom")));
        assert!(matches!(scan.recv().await, Some(ScanEvent::Error(_))));

        adapter.stop_scan().await.unwrap();
        assert!(!adapter.emit_discovery(adapter.device()));
        assert!(scan.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_connect_failure_injection() {
        let adapter = MockAdapter::new();
        let device = adapter.device();
        adapter.fail_next_connects(1);

        let err = adapter.connect(&device).await.unwrap_err();
        assert!(err.log_line().contains("android: 133"));
        assert!(!adapter.is_connected(device.id()));

        adapter.connect(&device).await.unwrap();
        assert!(adapter.is_connected(device.id()));
        assert_eq!(adapter.connect_calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_device_not_found() {
        let adapter = MockAdapter::new();
        let err = adapter
            .connect(&DeviceHandle::new("nobody"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(_)));
    }

    #[tokio::test]
    async fn test_trigger_disconnect() {
        let adapter = MockAdapter::new();
        let device = adapter.device();
        adapter.connect(&device).await.unwrap();
        let mut disconnected = adapter.on_disconnected(&device).await.unwrap();

        let error = BleError::new(BleErrorCode::DeviceDisconnected, "link lost");
        assert_eq!(adapter.trigger_disconnect(device.id(), Some(error)), 1);
        let notified = disconnected.recv().await.unwrap();
        assert!(matches!(notified, Some(Error::Ble(ref e)) if e.message == "link lost"));
        assert!(!adapter.is_connected(device.id()));

        drop(disconnected);
        assert_eq!(adapter.disconnect_subscriber_count(device.id()), 0);
    }

    #[tokio::test]
    async fn test_gatt_read_write() {
        let adapter = MockAdapter::new();
        let device = adapter.device();
        adapter.connect(&device).await.unwrap();
        adapter.discover_services(&device).await.unwrap();

        let services = adapter.services(&device).await.unwrap();
        let ir = services
            .iter()
            .find(|s| s.uuid == uuids::IR_TEMPERATURE_SERVICE)
            .unwrap();
        let data = ir.characteristic(uuids::IR_TEMPERATURE_DATA).unwrap();
        let config = ir.characteristic(uuids::IR_TEMPERATURE_CONFIG).unwrap();

        assert_eq!(
            adapter.read_characteristic(&device, data).await.unwrap(),
            MOCK_IR_TEMPERATURE.to_vec()
        );
        assert!(
            adapter
                .write_characteristic_with_response(&device, data, &[1])
                .await
                .is_err()
        );
        adapter
            .write_characteristic_with_response(&device, config, &[1])
            .await
            .unwrap();
        assert_eq!(adapter.writes(), vec![(uuids::IR_TEMPERATURE_CONFIG, vec![1])]);
    }
}
