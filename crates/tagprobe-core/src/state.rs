//! Application state and its reducer.
//!
//! [`reduce`] is the only way state changes: a pure function from the
//! current state and one [`Action`] to the next state. The [`crate::Store`]
//! applies it atomically and publishes the result.

use std::collections::VecDeque;

use serde::Serialize;

use tagprobe_types::{AdapterState, ConnectionState, DeviceHandle};

use crate::error::Error;

/// Everything the front end renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplicationState {
    /// Event log, newest entry first.
    pub logs: VecDeque<String>,
    /// Last reported adapter power state.
    pub adapter_state: AdapterState,
    /// The first device discovered since the last forget.
    pub active_device: Option<DeviceHandle>,
    /// Lifecycle state of the managed connection.
    pub connection_state: ConnectionState,
    /// Id of the test currently running, if any.
    pub current_test_id: Option<String>,
}

impl ApplicationState {
    /// The most recent log entry.
    pub fn latest_log(&self) -> Option<&str> {
        self.logs.front().map(String::as_str)
    }

    /// Whether a test is running.
    pub fn is_test_running(&self) -> bool {
        self.current_test_id.is_some()
    }
}

/// Every state transition and command.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Prepend an entry to the event log.
    Log(String),
    /// Empty the event log.
    ClearLogs,
    /// Command: connect to a device.
    Connect(DeviceHandle),
    /// Command: disconnect the current device.
    Disconnect,
    /// The connection manager entered a new state.
    ConnectionStateChanged(ConnectionState),
    /// The adapter reported a power state.
    AdapterStateChanged(AdapterState),
    /// A scan reported a device.
    DeviceDiscovered(DeviceHandle),
    /// Drop the active device so the next discovery replaces it.
    ForgetDevice,
    /// Command: run a registered test on the connected device.
    ExecuteTest(String),
    /// The running test ended (or never started).
    TestFinished,
}

/// Discriminant of an [`Action`], used to filter action subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Log,
    ClearLogs,
    Connect,
    Disconnect,
    ConnectionStateChanged,
    AdapterStateChanged,
    DeviceDiscovered,
    ForgetDevice,
    ExecuteTest,
    TestFinished,
}

impl Action {
    /// Log entry for an error, in the diagnostic format.
    pub fn log_error(error: &Error) -> Self {
        Action::Log(error.log_line())
    }

    /// The discriminant of this action.
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Log(_) => ActionKind::Log,
            Action::ClearLogs => ActionKind::ClearLogs,
            Action::Connect(_) => ActionKind::Connect,
            Action::Disconnect => ActionKind::Disconnect,
            Action::ConnectionStateChanged(_) => ActionKind::ConnectionStateChanged,
            Action::AdapterStateChanged(_) => ActionKind::AdapterStateChanged,
            Action::DeviceDiscovered(_) => ActionKind::DeviceDiscovered,
            Action::ForgetDevice => ActionKind::ForgetDevice,
            Action::ExecuteTest(_) => ActionKind::ExecuteTest,
            Action::TestFinished => ActionKind::TestFinished,
        }
    }
}

impl From<String> for Action {
    fn from(message: String) -> Self {
        Action::Log(message)
    }
}

impl From<&str> for Action {
    fn from(message: &str) -> Self {
        Action::Log(message.to_string())
    }
}

/// Apply one action to a state, producing the next state.
///
/// Commands (`Connect`, `Disconnect`) leave the state untouched; they only
/// matter to the tasks subscribed to them.
pub fn reduce(state: &ApplicationState, action: &Action) -> ApplicationState {
    let mut next = state.clone();
    match action {
        Action::Log(message) => {
            next.logs.push_front(message.clone());
        }

        Action::ClearLogs => {
            next.logs.clear();
        }

        Action::ConnectionStateChanged(connection_state) => {
            next.connection_state = *connection_state;
            next.logs
                .push_front(format!("Connection state changed: {}", connection_state));
        }

        Action::AdapterStateChanged(adapter_state) => {
            next.adapter_state = *adapter_state;
            next.logs
                .push_front(format!("BLE state changed: {}", adapter_state));
        }

        Action::DeviceDiscovered(device) => {
            if next.active_device.is_none() {
                next.logs.push_front(format!("SensorTag found: {}", device.id()));
                next.active_device = Some(device.clone());
            }
        }

        Action::ForgetDevice => {
            next.active_device = None;
        }

        Action::ExecuteTest(id) => {
            if next.connection_state == ConnectionState::Connected {
                next.current_test_id = Some(id.clone());
            }
        }

        Action::TestFinished => {
            next.current_test_id = None;
        }

        Action::Connect(_) | Action::Disconnect => {}
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> ApplicationState {
        ApplicationState {
            connection_state: ConnectionState::Connected,
            ..Default::default()
        }
    }

    #[test]
    fn test_log_is_newest_first() {
        let state = reduce(&ApplicationState::default(), &"one".into());
        let state = reduce(&state, &"two".into());
        assert_eq!(state.logs, VecDeque::from(vec!["two".to_string(), "one".to_string()]));
        assert_eq!(state.latest_log(), Some("two"));

        let state = reduce(&state, &Action::ClearLogs);
        assert!(state.logs.is_empty());
    }

    #[test]
    fn test_connection_state_log_line() {
        let state = reduce(
            &ApplicationState::default(),
            &Action::ConnectionStateChanged(ConnectionState::Connecting),
        );
        assert_eq!(state.connection_state, ConnectionState::Connecting);
        assert_eq!(state.latest_log(), Some("Connection state changed: CONNECTING"));
    }

    #[test]
    fn test_adapter_state_log_line() {
        let state = reduce(
            &ApplicationState::default(),
            &Action::AdapterStateChanged(AdapterState::PoweredOn),
        );
        assert_eq!(state.adapter_state, AdapterState::PoweredOn);
        assert_eq!(state.latest_log(), Some("BLE state changed: PoweredOn"));
    }

    #[test]
    fn test_first_discovery_wins() {
        let first = DeviceHandle::new("first");
        let second = DeviceHandle::new("second");
        let state = reduce(&ApplicationState::default(), &Action::DeviceDiscovered(first.clone()));
        assert_eq!(state.latest_log(), Some("SensorTag found: first"));

        let again = reduce(&state, &Action::DeviceDiscovered(second.clone()));
        assert_eq!(again, state);

        let forgotten = reduce(&again, &Action::ForgetDevice);
        assert_eq!(forgotten.active_device, None);
        assert_eq!(forgotten.logs, again.logs);

        let replaced = reduce(&forgotten, &Action::DeviceDiscovered(second.clone()));
        assert_eq!(replaced.active_device, Some(second));
    }

    #[test]
    fn test_execute_test_requires_connected() {
        let idle = ApplicationState::default();
        assert_eq!(reduce(&idle, &Action::ExecuteTest("A".into())), idle);

        let state = reduce(&connected(), &Action::ExecuteTest("A".into()));
        assert_eq!(state.current_test_id.as_deref(), Some("A"));
        assert!(state.is_test_running());

        let state = reduce(&state, &Action::TestFinished);
        assert_eq!(state.current_test_id, None);
    }

    #[test]
    fn test_commands_do_not_change_state() {
        let state = connected();
        assert_eq!(reduce(&state, &Action::Disconnect), state);
        assert_eq!(reduce(&state, &Action::Connect(DeviceHandle::new("x"))), state);
    }

    #[test]
    fn test_action_kind() {
        assert_eq!(Action::TestFinished.kind(), ActionKind::TestFinished);
        assert_eq!(
            Action::ExecuteTest("A".into()).kind(),
            ActionKind::ExecuteTest
        );
        assert_eq!(
            Action::log_error(&Error::Cancelled),
            Action::Log(Error::Cancelled.log_line())
        );
    }
}
