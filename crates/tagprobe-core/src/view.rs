//! Read-only projection of the application state for front ends.

use serde::Serialize;

use tagprobe_types::{ConnectionState, DeviceHandle};

use crate::state::ApplicationState;

/// What a front end shows and which commands it offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
    /// One-line connection status.
    pub label: String,
    /// The active device, if any.
    pub active_device: Option<DeviceHandle>,
    /// Id of the running test, if any.
    pub current_test_id: Option<String>,
    /// A connect command would be served.
    pub can_connect: bool,
    /// A disconnect command would be served.
    pub can_disconnect: bool,
    /// A test can be started.
    pub can_execute_tests: bool,
    /// There is a device to forget.
    pub can_forget: bool,
}

impl StatusView {
    /// Project a state snapshot.
    pub fn new(state: &ApplicationState) -> Self {
        let connection = state.connection_state;
        Self {
            label: status_label(state),
            active_device: state.active_device.clone(),
            current_test_id: state.current_test_id.clone(),
            can_connect: state.active_device.is_some()
                && connection == ConnectionState::Disconnected,
            can_disconnect: connection == ConnectionState::Connected,
            can_execute_tests: connection == ConnectionState::Connected
                && state.current_test_id.is_none(),
            can_forget: state.active_device.is_some(),
        }
    }
}

impl From<&ApplicationState> for StatusView {
    fn from(state: &ApplicationState) -> Self {
        Self::new(state)
    }
}

/// The status line for a state.
pub fn status_label(state: &ApplicationState) -> String {
    match state.connection_state {
        ConnectionState::Connecting => "Connecting...".to_string(),
        ConnectionState::Discovering => "Discovering...".to_string(),
        ConnectionState::Connected => "Connected".to_string(),
        ConnectionState::Disconnected | ConnectionState::Disconnecting => {
            match &state.active_device {
                Some(device) => format!("Found {}", device.id()),
                None => "Searching...".to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(connection_state: ConnectionState, device: bool) -> ApplicationState {
        ApplicationState {
            connection_state,
            active_device: device.then(|| DeviceHandle::new("AA:BB")),
            ..Default::default()
        }
    }

    #[test]
    fn test_labels() {
        assert_eq!(status_label(&state(ConnectionState::Disconnected, false)), "Searching...");
        assert_eq!(status_label(&state(ConnectionState::Disconnected, true)), "Found AA:BB");
        assert_eq!(status_label(&state(ConnectionState::Disconnecting, true)), "Found AA:BB");
        assert_eq!(status_label(&state(ConnectionState::Connecting, true)), "Connecting...");
        assert_eq!(status_label(&state(ConnectionState::Discovering, true)), "Discovering...");
        assert_eq!(status_label(&state(ConnectionState::Connected, true)), "Connected");
    }

    #[test]
    fn test_command_availability() {
        let idle = StatusView::new(&state(ConnectionState::Disconnected, false));
        assert!(!idle.can_connect && !idle.can_forget && !idle.can_disconnect);

        let found = StatusView::new(&state(ConnectionState::Disconnected, true));
        assert!(found.can_connect && found.can_forget);
        assert!(!found.can_execute_tests);

        let mut connected = state(ConnectionState::Connected, true);
        let view = StatusView::new(&connected);
        assert!(view.can_disconnect && view.can_execute_tests && !view.can_connect);

        connected.current_test_id = Some("READ_TEMPERATURE".into());
        let view = StatusView::from(&connected);
        assert!(view.can_disconnect);
        assert!(!view.can_execute_tests);
    }
}
