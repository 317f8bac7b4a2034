//! Error types for tagprobe-core.
//!
//! Every failure that reaches the user does so through the event log, never
//! through a separate alert channel. [`Error::log_line`] renders any error
//! into the diagnostic log entry, carrying the structured [`BleError`]
//! fields (code, reason and platform subcodes) when the adapter supplied
//! them.
//!
//! # Where errors stop
//!
//! | Source | Handled by | Effect |
//! |--------|------------|--------|
//! | Scan stream error | scan task | logged, scanning continues |
//! | Connect / discover / cancel failure | connection manager | logged, cleanup, back to idle |
//! | Permission denial | scan task | logged, scan task ends |
//! | Test procedure failure | test procedure | logged, test reports failure |

use std::fmt;

use thiserror::Error;

/// Errors that can occur while orchestrating a peripheral.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Error reported by the btleplug stack.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Structured error reported by an adapter binding.
    #[error(transparent)]
    Ble(#[from] BleError),

    /// No Bluetooth adapter is available on this host.
    #[error("No Bluetooth adapter available")]
    NoAdapter,

    /// The peripheral is not known to the adapter.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Required GATT service not found on the peripheral.
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    /// Required GATT characteristic not found on the peripheral.
    #[error("Characteristic not found: {uuid} (searched in {service_count} services)")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
        /// Number of services that were searched.
        service_count: usize,
    },

    /// A value read from the peripheral could not be decoded.
    #[error("Invalid reading format: expected {expected} bytes, got {actual}")]
    InvalidReadingFormat {
        /// Expected data size.
        expected: usize,
        /// Actual data size received.
        actual: usize,
    },

    /// Failed to parse data received from the peripheral.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The requested test id is not registered.
    #[error("Unknown test: {0}")]
    UnknownTest(String),

    /// Scan permission was not granted.
    #[error("Scan permission not granted")]
    PermissionDenied,

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Category of a [`BleError`].
///
/// This enum is marked `#[non_exhaustive]` to allow adding new codes
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum BleErrorCode {
    /// Unclassified failure.
    Unknown,
    /// The operation was cancelled before it completed.
    OperationCancelled,
    /// The operation timed out in the adapter.
    OperationTimedOut,
    /// The adapter does not support the operation.
    BluetoothUnsupported,
    /// The application is not allowed to use Bluetooth.
    BluetoothUnauthorized,
    /// Bluetooth is turned off.
    BluetoothPoweredOff,
    /// The scan could not be started.
    ScanStartFailed,
    /// The connection attempt failed.
    DeviceConnectionFailed,
    /// The peripheral disconnected.
    DeviceDisconnected,
    /// The peripheral is not known to the adapter.
    DeviceNotFound,
    /// The operation needs a connection that does not exist.
    DeviceNotConnected,
    /// Service discovery failed.
    ServicesDiscoveryFailed,
    /// A service or characteristic was not found.
    CharacteristicNotFound,
    /// A characteristic read failed.
    CharacteristicReadFailed,
    /// A characteristic write failed.
    CharacteristicWriteFailed,
}

impl BleErrorCode {
    /// The code name as it appears in the event log.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UnknownError",
            Self::OperationCancelled => "OperationCancelled",
            Self::OperationTimedOut => "OperationTimedOut",
            Self::BluetoothUnsupported => "BluetoothUnsupported",
            Self::BluetoothUnauthorized => "BluetoothUnauthorized",
            Self::BluetoothPoweredOff => "BluetoothPoweredOff",
            Self::ScanStartFailed => "ScanStartFailed",
            Self::DeviceConnectionFailed => "DeviceConnectionFailed",
            Self::DeviceDisconnected => "DeviceDisconnected",
            Self::DeviceNotFound => "DeviceNotFound",
            Self::DeviceNotConnected => "DeviceNotConnected",
            Self::ServicesDiscoveryFailed => "ServicesDiscoveryFailed",
            Self::CharacteristicNotFound => "CharacteristicNotFound",
            Self::CharacteristicReadFailed => "CharacteristicReadFailed",
            Self::CharacteristicWriteFailed => "CharacteristicWriteFailed",
        }
    }
}

impl fmt::Display for BleErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured adapter error with platform diagnostic subcodes.
///
/// Desktop stacks rarely fill the subcodes; mobile stacks report the ATT
/// status and the native iOS/Android codes alongside the message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BleError {
    /// Error category.
    pub code: BleErrorCode,
    /// Human readable message.
    pub message: String,
    /// Platform-provided reason, if any.
    pub reason: Option<String>,
    /// ATT protocol error code.
    pub att_error_code: Option<u8>,
    /// CoreBluetooth error code.
    pub ios_error_code: Option<i32>,
    /// Android GATT status code.
    pub android_error_code: Option<i32>,
}

impl BleError {
    /// Create an error with only a code and message.
    pub fn new(code: BleErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            reason: None,
            att_error_code: None,
            ios_error_code: None,
            android_error_code: None,
        }
    }

    /// Attach a platform reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach an ATT error code.
    #[must_use]
    pub fn with_att_error_code(mut self, code: u8) -> Self {
        self.att_error_code = Some(code);
        self
    }

    /// Attach an iOS error code.
    #[must_use]
    pub fn with_ios_error_code(mut self, code: i32) -> Self {
        self.ios_error_code = Some(code);
        self
    }

    /// Attach an Android error code.
    #[must_use]
    pub fn with_android_error_code(mut self, code: i32) -> Self {
        self.android_error_code = Some(code);
        self
    }

    /// Render the diagnostic event log entry.
    ///
    /// ```
    /// use tagprobe_core::{BleError, BleErrorCode};
    ///
    /// let err = BleError::new(BleErrorCode::DeviceDisconnected, "Device was disconnected")
    ///     .with_android_error_code(8);
    /// assert_eq!(
    ///     err.log_line(),
    ///     "ERROR: Device was disconnected, code: DeviceDisconnected, reason: null, \
    ///      ATT: null, iOS: null, android: 8"
    /// );
    /// ```
    pub fn log_line(&self) -> String {
        format!(
            "ERROR: {}, code: {}, reason: {}, ATT: {}, iOS: {}, android: {}",
            self.message,
            self.code,
            or_null(self.reason.as_deref()),
            or_null(self.att_error_code),
            or_null(self.ios_error_code),
            or_null(self.android_error_code),
        )
    }
}

fn or_null<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "null".to_string(), |v| v.to_string())
}

impl Error {
    /// Create a structured adapter error.
    pub fn ble(code: BleErrorCode, message: impl Into<String>) -> Self {
        Self::Ble(BleError::new(code, message))
    }

    /// Create a device not found error for a specific identifier.
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::DeviceNotFound(identifier.into())
    }

    /// Create an unknown test error.
    pub fn unknown_test(id: impl Into<String>) -> Self {
        Self::UnknownTest(id.into())
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl Into<String>, service_count: usize) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.into(),
            service_count,
        }
    }

    /// Project this error onto the structured adapter error shape.
    pub fn to_ble_error(&self) -> BleError {
        let code = match self {
            Error::Ble(err) => return err.clone(),
            Error::Bluetooth(err) => return ble_error_from_btleplug(err),
            Error::NoAdapter => BleErrorCode::BluetoothUnsupported,
            Error::DeviceNotFound(_) => BleErrorCode::DeviceNotFound,
            Error::ServiceNotFound(_) | Error::CharacteristicNotFound { .. } => {
                BleErrorCode::CharacteristicNotFound
            }
            Error::InvalidReadingFormat { .. } | Error::InvalidData(_) => {
                BleErrorCode::CharacteristicReadFailed
            }
            Error::PermissionDenied => BleErrorCode::BluetoothUnauthorized,
            Error::Cancelled => BleErrorCode::OperationCancelled,
            Error::UnknownTest(_) => BleErrorCode::Unknown,
        };
        BleError::new(code, self.to_string())
    }

    /// Render the diagnostic event log entry for this error.
    pub fn log_line(&self) -> String {
        self.to_ble_error().log_line()
    }
}

fn ble_error_from_btleplug(err: &btleplug::Error) -> BleError {
    use btleplug::Error as E;

    let code = match err {
        E::PermissionDenied => BleErrorCode::BluetoothUnauthorized,
        E::DeviceNotFound => BleErrorCode::DeviceNotFound,
        E::NotConnected => BleErrorCode::DeviceNotConnected,
        E::NoSuchCharacteristic | E::UnexpectedCharacteristic => {
            BleErrorCode::CharacteristicNotFound
        }
        E::NotSupported(_) => BleErrorCode::BluetoothUnsupported,
        E::TimedOut(_) => BleErrorCode::OperationTimedOut,
        _ => BleErrorCode::Unknown,
    };
    let ble = BleError::new(code, err.to_string());
    match err {
        E::RuntimeError(reason) | E::NotSupported(reason) => ble.with_reason(reason.clone()),
        E::Other(source) => ble.with_reason(source.to_string()),
        _ => ble,
    }
}

impl From<tagprobe_types::ParseError> for Error {
    fn from(err: tagprobe_types::ParseError) -> Self {
        match err {
            tagprobe_types::ParseError::InsufficientBytes { expected, actual } => {
                Error::InvalidReadingFormat { expected, actual }
            }
            // Handle future ParseError variants (non_exhaustive)
            _ => Error::InvalidData(err.to_string()),
        }
    }
}

/// Result type alias using tagprobe-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_display() {
        let err = Error::device_not_found("AA:BB:CC:DD:EE:FF");
        assert!(err.to_string().contains("AA:BB:CC:DD:EE:FF"));

        let err = Error::characteristic_not_found("f000aa01", 3);
        assert!(err.to_string().contains("f000aa01"));
        assert!(err.to_string().contains("3 services"));

        let err = Error::unknown_test("NOPE");
        assert_eq!(err.to_string(), "Unknown test: NOPE");
    }

    #[test]
    fn test_ble_error_log_line_all_fields() {
        let err = BleError::new(BleErrorCode::DeviceConnectionFailed, "Connection failed")
            .with_reason("GATT_ERROR")
            .with_att_error_code(0x0E)
            .with_ios_error_code(7)
            .with_android_error_code(133);
        assert_eq!(
            err.log_line(),
            "ERROR: Connection failed, code: DeviceConnectionFailed, reason: GATT_ERROR, \
             ATT: 14, iOS: 7, android: 133"
        );
    }

    #[test]
    fn test_error_log_line_passes_ble_error_through() {
        let ble = BleError::new(BleErrorCode::ScanStartFailed, "scan refused").with_ios_error_code(1);
        let err = Error::from(ble.clone());
        assert_eq!(err.log_line(), ble.log_line());
        assert_eq!(err.to_string(), "scan refused");
    }

    #[test]
    fn test_btleplug_error_conversion() {
        let err: Error = btleplug::Error::DeviceNotFound.into();
        assert!(matches!(err, Error::Bluetooth(_)));
        assert_eq!(err.to_ble_error().code, BleErrorCode::DeviceNotFound);

        let err: Error = btleplug::Error::TimedOut(Duration::from_secs(5)).into();
        assert_eq!(err.to_ble_error().code, BleErrorCode::OperationTimedOut);

        let err: Error = btleplug::Error::RuntimeError("dbus gone".into()).into();
        let ble = err.to_ble_error();
        assert_eq!(ble.code, BleErrorCode::Unknown);
        assert_eq!(ble.reason.as_deref(), Some("dbus gone"));
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = tagprobe_types::ParseError::InsufficientBytes {
            expected: 4,
            actual: 1,
        }
        .into();
        assert!(matches!(
            err,
            Error::InvalidReadingFormat {
                expected: 4,
                actual: 1
            }
        ));
        assert!(err.log_line().starts_with("ERROR: Invalid reading format"));
    }

    #[test]
    fn test_cancelled_log_line() {
        assert_eq!(
            Error::Cancelled.log_line(),
            "ERROR: Operation cancelled, code: OperationCancelled, reason: null, \
             ATT: null, iOS: null, android: null"
        );
    }
}
