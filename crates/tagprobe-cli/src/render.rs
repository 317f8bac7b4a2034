//! Terminal rendering of the event log.

use tagprobe_core::{ApplicationState, StatusView};

/// Turns successive state snapshots into terminal lines.
///
/// The store keeps the log newest-first; the terminal shows it oldest-first,
/// so only entries added since the previous snapshot are printed, in
/// reverse. A status line is added whenever the status label changes.
#[derive(Debug, Default)]
pub struct Renderer {
    shown: usize,
    newest: Option<String>,
    label: Option<String>,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines to print for `state`.
    pub fn render(&mut self, state: &ApplicationState) -> Vec<String> {
        let total = state.logs.len();
        // Snapshots can skip a clear. The previously newest entry must sit
        // right behind the added ones, otherwise everything is new.
        let added = match total.checked_sub(self.shown) {
            Some(added) if state.logs.get(added) == self.newest.as_ref() => added,
            _ => total,
        };

        let mut lines: Vec<String> = state.logs.iter().take(added).rev().cloned().collect();
        self.shown = total;
        self.newest = state.logs.front().cloned();

        let label = StatusView::from(state).label;
        if self.label.as_deref() != Some(label.as_str()) {
            lines.push(format!("[{}]", label));
            self.label = Some(label);
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagprobe_core::{Action, ConnectionState, DeviceHandle, reduce};

    #[test]
    fn test_first_render_shows_status() {
        let mut renderer = Renderer::new();
        assert_eq!(
            renderer.render(&ApplicationState::default()),
            vec!["[Searching...]"]
        );
        assert!(renderer.render(&ApplicationState::default()).is_empty());
    }

    #[test]
    fn test_new_logs_oldest_first() {
        let mut renderer = Renderer::new();
        let mut state = reduce(&ApplicationState::default(), &Action::Log("one".into()));
        renderer.render(&state);

        state = reduce(&state, &Action::Log("two".into()));
        state = reduce(&state, &Action::Log("three".into()));
        assert_eq!(renderer.render(&state), vec!["two", "three"]);
    }

    #[test]
    fn test_status_line_on_label_change() {
        let mut renderer = Renderer::new();
        renderer.render(&ApplicationState::default());

        let device = DeviceHandle::with_name("AA:BB", "SensorTag");
        let state = reduce(
            &ApplicationState::default(),
            &Action::DeviceDiscovered(device),
        );
        assert_eq!(
            renderer.render(&state),
            vec!["SensorTag found: AA:BB", "[Found AA:BB]"]
        );

        let state = reduce(
            &state,
            &Action::ConnectionStateChanged(ConnectionState::Connecting),
        );
        assert_eq!(
            renderer.render(&state),
            vec!["Connection state changed: CONNECTING", "[Connecting...]"]
        );
    }

    #[test]
    fn test_cleared_log_restarts() {
        let mut renderer = Renderer::new();
        let state = reduce(&ApplicationState::default(), &Action::Log("old".into()));
        renderer.render(&state);

        let state = reduce(&state, &Action::ClearLogs);
        assert!(renderer.render(&state).is_empty());
        let state = reduce(&state, &Action::Log("new".into()));
        assert_eq!(renderer.render(&state), vec!["new"]);
    }

    #[test]
    fn test_clear_between_snapshots_shows_all_new() {
        let mut renderer = Renderer::new();
        let state = reduce(&ApplicationState::default(), &Action::Log("old".into()));
        renderer.render(&state);

        let mut state = reduce(&state, &Action::ClearLogs);
        for message in ["first", "second", "third"] {
            state = reduce(&state, &Action::Log(message.into()));
        }
        assert_eq!(renderer.render(&state), vec!["first", "second", "third"]);

        let state = reduce(&state, &Action::Log("fourth".into()));
        assert_eq!(renderer.render(&state), vec!["fourth"]);
    }
}
