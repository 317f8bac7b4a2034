//! btleplug-backed adapter.
//!
//! Every notification-style operation subscribes to the central's event
//! stream and spawns a small forwarding task; closing the returned
//! [`Subscription`] aborts that task.

use btleplug::api::{
    Central, CentralEvent, CentralState, CharPropFlags, Characteristic, Manager as _,
    Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use tracing::{debug, info, warn};

use async_trait::async_trait;

use tagprobe_types::{AdapterState, DeviceHandle};

use crate::adapter::{
    BleAdapter, CharacteristicInfo, CharacteristicProperties, ScanEvent, ScanOptions, ServiceInfo,
};
use crate::error::{Error, Result};
use crate::subscription::Subscription;

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms, they are
/// MAC addresses. This strips the `PeripheralId(...)` debug wrapper.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Map btleplug's adapter state onto ours.
pub fn adapter_state_from(state: CentralState) -> AdapterState {
    match state {
        CentralState::PoweredOn => AdapterState::PoweredOn,
        CentralState::PoweredOff => AdapterState::PoweredOff,
        _ => AdapterState::Unknown,
    }
}

/// Map btleplug's characteristic flags onto ours.
pub fn properties_from(flags: CharPropFlags) -> CharacteristicProperties {
    CharacteristicProperties {
        readable: flags.contains(CharPropFlags::READ),
        writable_with_response: flags.contains(CharPropFlags::WRITE),
        writable_without_response: flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
        notifiable: flags.contains(CharPropFlags::NOTIFY),
    }
}

/// Whether a device passes an optional case-insensitive name filter.
pub fn matches_name_filter(filter: Option<&str>, device: &DeviceHandle) -> bool {
    match filter {
        None => true,
        Some(filter) => device
            .name()
            .is_some_and(|name| name.to_lowercase().contains(&filter.to_lowercase())),
    }
}

/// A host adapter reached through btleplug.
#[derive(Debug, Clone)]
pub struct BtleplugAdapter {
    adapter: Adapter,
    name_filter: Option<String>,
}

impl BtleplugAdapter {
    /// Use the first adapter on this host.
    pub async fn new() -> Result<Self> {
        Self::with_index(0).await
    }

    /// Use the adapter at `index` in the host's adapter list.
    pub async fn with_index(index: usize) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let count = adapters.len();
        let adapter = adapters.into_iter().nth(index).ok_or_else(|| {
            warn!("Adapter index {} out of range ({} available)", index, count);
            Error::NoAdapter
        })?;
        match adapter.adapter_info().await {
            Ok(info_str) => info!("Using adapter {}: {}", index, info_str),
            Err(e) => debug!("Adapter info unavailable: {}", e),
        }
        Ok(Self {
            adapter,
            name_filter: None,
        })
    }

    /// Only report devices whose advertised name contains `filter`.
    #[must_use]
    pub fn with_name_filter(mut self, filter: Option<String>) -> Self {
        self.name_filter = filter;
        self
    }

    async fn peripheral(&self, device: &DeviceHandle) -> Result<Peripheral> {
        for peripheral in self.adapter.peripherals().await? {
            if format_peripheral_id(&peripheral.id()) == device.id() {
                return Ok(peripheral);
            }
        }
        Err(Error::device_not_found(device.id()))
    }

    fn characteristic(
        &self,
        peripheral: &Peripheral,
        info: &CharacteristicInfo,
    ) -> Result<Characteristic> {
        let characteristics = peripheral.characteristics();
        characteristics
            .iter()
            .find(|c| c.uuid == info.uuid && c.service_uuid == info.service_uuid)
            .cloned()
            .ok_or_else(|| {
                Error::characteristic_not_found(info.uuid.to_string(), peripheral.services().len())
            })
    }
}

async fn device_handle(adapter: &Adapter, id: &PeripheralId) -> Result<DeviceHandle> {
    let peripheral = adapter.peripheral(id).await?;
    let id = format_peripheral_id(id);
    let name = peripheral
        .properties()
        .await?
        .and_then(|properties| properties.local_name);
    Ok(match name {
        Some(name) => DeviceHandle::with_name(id, name),
        None => DeviceHandle::new(id),
    })
}

#[async_trait]
impl BleAdapter for BtleplugAdapter {
    async fn power_state_changes(&self) -> Result<Subscription<AdapterState>> {
        let mut events = self.adapter.events().await?;
        let current = adapter_state_from(self.adapter.adapter_state().await?);

        let (tx, subscription) = Subscription::channel();
        let _ = tx.send(current);
        let forwarder = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::StateUpdate(state) = event
                    && tx.send(adapter_state_from(state)).is_err()
                {
                    break;
                }
            }
        });
        let abort = forwarder.abort_handle();
        Ok(subscription.on_close(move || abort.abort()))
    }

    async fn start_scan(&self, options: ScanOptions) -> Result<Subscription<ScanEvent>> {
        // Subscribe before starting so the first advertisements are not missed.
        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;

        let adapter = self.adapter.clone();
        let name_filter = self.name_filter.clone();
        let (tx, subscription) = Subscription::channel();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let id = match event {
                    CentralEvent::DeviceDiscovered(id) => id,
                    CentralEvent::DeviceUpdated(id) if options.allow_duplicates => id,
                    _ => continue,
                };
                let event = match device_handle(&adapter, &id).await {
                    Ok(device) if matches_name_filter(name_filter.as_deref(), &device) => {
                        ScanEvent::Discovered(device)
                    }
                    Ok(_) => continue,
                    Err(e) => ScanEvent::Error(e),
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        });
        let abort = forwarder.abort_handle();
        Ok(subscription.on_close(move || abort.abort()))
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, device: &DeviceHandle) -> Result<()> {
        let peripheral = self.peripheral(device).await?;
        if !peripheral.is_connected().await? {
            peripheral.connect().await?;
        }
        Ok(())
    }

    async fn discover_services(&self, device: &DeviceHandle) -> Result<()> {
        let peripheral = self.peripheral(device).await?;
        peripheral.discover_services().await?;
        debug!(
            "Discovered {} services on {}",
            peripheral.services().len(),
            device
        );
        Ok(())
    }

    async fn cancel_connection(&self, device: &DeviceHandle) -> Result<()> {
        let peripheral = self.peripheral(device).await?;
        peripheral.disconnect().await?;
        Ok(())
    }

    async fn on_disconnected(&self, device: &DeviceHandle) -> Result<Subscription<Option<Error>>> {
        let mut events = self.adapter.events().await?;
        let target = device.id().to_string();

        let (tx, subscription) = Subscription::channel();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(id) = event
                    && format_peripheral_id(&id) == target
                    && tx.send(None).is_err()
                {
                    break;
                }
            }
        });
        let abort = forwarder.abort_handle();
        Ok(subscription.on_close(move || abort.abort()))
    }

    async fn services(&self, device: &DeviceHandle) -> Result<Vec<ServiceInfo>> {
        let peripheral = self.peripheral(device).await?;
        Ok(peripheral
            .services()
            .into_iter()
            .map(|service| ServiceInfo {
                uuid: service.uuid,
                characteristics: service
                    .characteristics
                    .into_iter()
                    .map(|c| CharacteristicInfo {
                        uuid: c.uuid,
                        service_uuid: c.service_uuid,
                        properties: properties_from(c.properties),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn read_characteristic(
        &self,
        device: &DeviceHandle,
        characteristic: &CharacteristicInfo,
    ) -> Result<Vec<u8>> {
        let peripheral = self.peripheral(device).await?;
        let characteristic = self.characteristic(&peripheral, characteristic)?;
        Ok(peripheral.read(&characteristic).await?)
    }

    async fn write_characteristic_with_response(
        &self,
        device: &DeviceHandle,
        characteristic: &CharacteristicInfo,
        value: &[u8],
    ) -> Result<()> {
        let peripheral = self.peripheral(device).await?;
        let characteristic = self.characteristic(&peripheral, characteristic)?;
        peripheral
            .write(&characteristic, value, WriteType::WithResponse)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_state_mapping() {
        assert_eq!(adapter_state_from(CentralState::PoweredOn), AdapterState::PoweredOn);
        assert_eq!(adapter_state_from(CentralState::PoweredOff), AdapterState::PoweredOff);
        assert_eq!(adapter_state_from(CentralState::Unknown), AdapterState::Unknown);
    }

    #[test]
    fn test_properties_mapping() {
        let props = properties_from(CharPropFlags::READ | CharPropFlags::WRITE);
        assert_eq!(props, CharacteristicProperties::READ_WRITE);

        let props = properties_from(CharPropFlags::NOTIFY | CharPropFlags::WRITE_WITHOUT_RESPONSE);
        assert!(!props.readable && !props.writable_with_response);
        assert!(props.notifiable && props.writable_without_response);
    }

    #[test]
    fn test_name_filter() {
        let tag = DeviceHandle::with_name("AA", "CC2650 SensorTag");
        let anonymous = DeviceHandle::new("BB");
        assert!(matches_name_filter(None, &tag));
        assert!(matches_name_filter(None, &anonymous));
        assert!(matches_name_filter(Some("sensortag"), &tag));
        assert!(!matches_name_filter(Some("aranet"), &tag));
        assert!(!matches_name_filter(Some("sensortag"), &anonymous));
    }
}
