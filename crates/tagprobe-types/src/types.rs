//! Core types shared by the orchestration layer and its front ends.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Power state of the local Bluetooth adapter.
///
/// Mirrors the states reported by the common mobile and desktop BLE stacks.
/// Stacks that only know a subset (btleplug reports `Unknown`, `PoweredOn`
/// and `PoweredOff`) simply never produce the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AdapterState {
    /// State has not been reported yet.
    #[default]
    Unknown,
    /// The adapter is resetting; the state will change shortly.
    Resetting,
    /// The platform does not support Bluetooth Low Energy.
    Unsupported,
    /// The application is not authorized to use Bluetooth.
    Unauthorized,
    /// Bluetooth is turned off.
    PoweredOff,
    /// Bluetooth is on and ready.
    PoweredOn,
}

impl AdapterState {
    /// All states, in declaration order.
    pub const ALL: [AdapterState; 6] = [
        AdapterState::Unknown,
        AdapterState::Resetting,
        AdapterState::Unsupported,
        AdapterState::Unauthorized,
        AdapterState::PoweredOff,
        AdapterState::PoweredOn,
    ];

    /// The state name as reported in the event log.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterState::Unknown => "Unknown",
            AdapterState::Resetting => "Resetting",
            AdapterState::Unsupported => "Unsupported",
            AdapterState::Unauthorized => "Unauthorized",
            AdapterState::PoweredOff => "PoweredOff",
            AdapterState::PoweredOn => "PoweredOn",
        }
    }

    /// Whether the adapter can scan and connect.
    #[must_use]
    pub fn is_powered_on(&self) -> bool {
        matches!(self, AdapterState::PoweredOn)
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterState {
    type Err = ParseError;

    /// Parse a state name, case-insensitively, ignoring `_` and `-`.
    ///
    /// ```
    /// use tagprobe_types::AdapterState;
    ///
    /// assert_eq!("powered_on".parse(), Ok(AdapterState::PoweredOn));
    /// assert_eq!("PoweredOff".parse(), Ok(AdapterState::PoweredOff));
    /// assert!("sleepy".parse::<AdapterState>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        AdapterState::ALL
            .into_iter()
            .find(|state| state.as_str().to_lowercase() == normalized)
            .ok_or_else(|| ParseError::UnknownState(s.to_string()))
    }
}

/// Lifecycle state of the single managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum ConnectionState {
    /// No connection and none in progress.
    #[default]
    Disconnected,
    /// A connection attempt is in progress.
    Connecting,
    /// Connected; services and characteristics are being discovered.
    Discovering,
    /// Connected and ready for tests.
    Connected,
    /// A user-requested disconnect is in progress.
    Disconnecting,
}

impl ConnectionState {
    /// The state name as reported in the event log.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Discovering => "DISCOVERING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Disconnecting => "DISCONNECTING",
        }
    }

    /// Whether scanning may run while the connection is in this state.
    #[must_use]
    pub fn allows_scanning(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Disconnecting
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An opaque handle to one discovered peripheral.
///
/// The identifier is whatever the platform uses to address the peripheral
/// (a MAC address on Linux/Windows, a CoreBluetooth UUID on macOS); the
/// name is the advertised local name, if any.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceHandle {
    id: String,
    name: Option<String>,
}

impl DeviceHandle {
    /// Create a handle without a display name.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    /// Create a handle with a display name.
    pub fn with_name(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
        }
    }

    /// The platform identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The advertised name, if known.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The name if known, otherwise the identifier.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.id),
            None => f.write_str(&self.id),
        }
    }
}

/// Minimum payload length of the IR temperature data characteristic.
pub const MIN_IR_TEMPERATURE_BYTES: usize = 4;

/// A reading from the SensorTag IR temperature sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IrTemperature {
    /// Object (infrared) temperature in °C.
    pub object: f32,
    /// Die (ambient) temperature in °C.
    pub ambient: f32,
}

impl IrTemperature {
    /// Parse the IR temperature data characteristic.
    ///
    /// The byte format is:
    /// - bytes 0-1: object temperature (u16 LE, 14-bit value in the upper bits)
    /// - bytes 2-3: ambient temperature (u16 LE, 14-bit value in the upper bits)
    ///
    /// Each 14-bit value is in units of 0.03125 °C.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] if `data` contains fewer than
    /// [`MIN_IR_TEMPERATURE_BYTES`] bytes.
    #[must_use = "parsing returns a Result that should be handled"]
    pub fn from_bytes(data: &[u8]) -> Result<Self, ParseError> {
        use bytes::Buf;

        if data.len() < MIN_IR_TEMPERATURE_BYTES {
            return Err(ParseError::InsufficientBytes {
                expected: MIN_IR_TEMPERATURE_BYTES,
                actual: data.len(),
            });
        }

        let mut buf = data;
        let object_raw = buf.get_u16_le();
        let ambient_raw = buf.get_u16_le();

        Ok(IrTemperature {
            object: Self::convert(object_raw),
            ambient: Self::convert(ambient_raw),
        })
    }

    fn convert(raw: u16) -> f32 {
        f32::from(raw >> 2) * 0.03125
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_state_names() {
        assert_eq!(AdapterState::PoweredOn.to_string(), "PoweredOn");
        assert_eq!(AdapterState::default(), AdapterState::Unknown);
        for state in AdapterState::ALL {
            assert_eq!(state.as_str().parse::<AdapterState>(), Ok(state));
        }
    }

    #[test]
    fn test_connection_state_scanning() {
        assert!(ConnectionState::Disconnected.allows_scanning());
        assert!(ConnectionState::Disconnecting.allows_scanning());
        assert!(!ConnectionState::Connecting.allows_scanning());
        assert!(!ConnectionState::Discovering.allows_scanning());
        assert!(!ConnectionState::Connected.allows_scanning());
    }

    #[test]
    fn test_device_handle_display() {
        let bare = DeviceHandle::new("AA:BB:CC:DD:EE:FF");
        assert_eq!(bare.display_name(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(bare.to_string(), "AA:BB:CC:DD:EE:FF");

        let named = DeviceHandle::with_name("AA:BB:CC:DD:EE:FF", "SensorTag");
        assert_eq!(named.display_name(), "SensorTag");
        assert_eq!(named.to_string(), "SensorTag (AA:BB:CC:DD:EE:FF)");
    }

    #[test]
    fn test_ir_temperature_from_bytes() {
        // 25.0 °C => 800 in 1/32 °C units => raw 800 << 2 = 3200 (0x0C80)
        // 21.5 °C => 688 => raw 2752 (0x0AC0)
        let reading = IrTemperature::from_bytes(&[0x80, 0x0C, 0xC0, 0x0A]).unwrap();
        assert!((reading.object - 25.0).abs() < 0.001);
        assert!((reading.ambient - 21.5).abs() < 0.001);
    }

    #[test]
    fn test_ir_temperature_too_short() {
        let err = IrTemperature::from_bytes(&[0x01, 0x02]).unwrap_err();
        assert_eq!(
            err,
            ParseError::InsufficientBytes {
                expected: 4,
                actual: 2
            }
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_connection_state_serde() {
        let json = serde_json::to_string(&ConnectionState::Connected).unwrap();
        assert_eq!(json, "\"CONNECTED\"");
    }
}
