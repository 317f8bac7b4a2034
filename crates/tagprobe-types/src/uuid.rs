//! Bluetooth UUIDs used by the built-in test procedures.
//!
//! The sensor UUIDs follow the TI SensorTag layout, where every sensor
//! service exposes a data, a configuration and a period characteristic.

use uuid::{Uuid, uuid};

// --- Standard BLE UUIDs ---

/// Generic Access Profile (GAP) service.
pub const GAP_SERVICE: Uuid = uuid!("00001800-0000-1000-8000-00805f9b34fb");

/// GAP appearance characteristic. Skipped when reading everything, since some
/// stacks refuse to read it.
pub const GAP_APPEARANCE: Uuid = uuid!("00002a02-0000-1000-8000-00805f9b34fb");

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = uuid!("0000180a-0000-1000-8000-00805f9b34fb");

// --- SensorTag IR temperature ---

/// IR temperature service.
pub const IR_TEMPERATURE_SERVICE: Uuid = uuid!("f000aa00-0451-4000-b000-000000000000");

/// IR temperature data (object and ambient raw values).
pub const IR_TEMPERATURE_DATA: Uuid = uuid!("f000aa01-0451-4000-b000-000000000000");

/// IR temperature configuration. Write `0x01` to enable, `0x00` to disable.
pub const IR_TEMPERATURE_CONFIG: Uuid = uuid!("f000aa02-0451-4000-b000-000000000000");

/// IR temperature measurement period, in units of 10 ms.
pub const IR_TEMPERATURE_PERIOD: Uuid = uuid!("f000aa03-0451-4000-b000-000000000000");

/// Value written to a sensor configuration characteristic to enable it.
pub const SENSOR_ENABLE: u8 = 0x01;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_uuids_share_base() {
        let base = IR_TEMPERATURE_SERVICE.as_bytes();
        for id in [IR_TEMPERATURE_DATA, IR_TEMPERATURE_CONFIG, IR_TEMPERATURE_PERIOD] {
            // Only byte 3 (the AAxx suffix) differs.
            assert_eq!(&id.as_bytes()[4..], &base[4..]);
            assert_eq!(&id.as_bytes()[..3], &base[..3]);
        }
    }

    #[test]
    fn test_gap_appearance_string() {
        assert!(GAP_APPEARANCE.to_string().starts_with("00002a02"));
    }
}
