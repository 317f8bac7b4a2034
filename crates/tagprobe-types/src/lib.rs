//! Platform-agnostic types for the tagprobe BLE test bench.
//!
//! This crate holds the plain data types shared by the orchestration layer
//! (tagprobe-core) and its front ends:
//!
//! - Adapter power and connection states
//! - Discovered device handles
//! - UUID constants and payload decoding for the built-in tests
//! - Error types for data parsing
//!
//! # Example
//!
//! ```
//! use tagprobe_types::{AdapterState, ConnectionState, DeviceHandle};
//!
//! let device = DeviceHandle::with_name("AA:BB:CC:DD:EE:FF", "SensorTag");
//! assert_eq!(device.display_name(), "SensorTag");
//! assert!(AdapterState::PoweredOn.is_powered_on());
//! assert_eq!(ConnectionState::Connecting.to_string(), "CONNECTING");
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use types::{
    AdapterState, ConnectionState, DeviceHandle, IrTemperature, MIN_IR_TEMPERATURE_BYTES,
};
pub use uuid as uuids;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn ir_temperature_never_panics(data in proptest::collection::vec(any::<u8>(), 0..16)) {
            let result = IrTemperature::from_bytes(&data);
            prop_assert_eq!(result.is_ok(), data.len() >= MIN_IR_TEMPERATURE_BYTES);
        }

        #[test]
        fn ir_temperature_in_sensor_range(object in any::<u16>(), ambient in any::<u16>()) {
            let mut data = object.to_le_bytes().to_vec();
            data.extend_from_slice(&ambient.to_le_bytes());
            let reading = IrTemperature::from_bytes(&data).unwrap();
            // 14-bit values in 1/32 °C steps top out just under 512 °C.
            prop_assert!(reading.object >= 0.0 && reading.object < 512.0);
            prop_assert!(reading.ambient >= 0.0 && reading.ambient < 512.0);
        }

        #[test]
        fn adapter_state_parse_is_case_insensitive(idx in 0usize..6, upper in any::<bool>()) {
            let state = AdapterState::ALL[idx];
            let name = if upper {
                state.as_str().to_uppercase()
            } else {
                state.as_str().to_lowercase()
            };
            prop_assert_eq!(name.parse::<AdapterState>(), Ok(state));
        }
    }
}
