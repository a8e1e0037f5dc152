//! TUI application state and logic.

use crate::core::{JobWatcher, MergedView};

/// Actions that can be triggered by user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    Up,
    Down,
    Top,
    Reconnect,
}

/// Main TUI application state.
pub struct WatchApp {
    pub view: MergedView,
    /// Selected row in the timeline (0 = newest).
    pub selected: usize,
    pub running: bool,
    pub notice: Option<String>,
}

impl WatchApp {
    pub fn new(view: MergedView) -> Self {
        Self {
            view,
            selected: 0,
            running: true,
            notice: None,
        }
    }

    /// Replace the rendered view.
    ///
    /// New events are prepended, so a selection away from the top is
    /// shifted down to keep pointing at the same event.
    pub fn update_view(&mut self, view: MergedView) {
        let added = view.timeline.len().saturating_sub(self.view.timeline.len());
        if self.selected > 0 {
            self.selected += added;
        }
        self.view = view;
        self.selected = self.selected.min(self.view.timeline.len().saturating_sub(1));
    }

    /// Handle an action and update state accordingly.
    pub fn handle_action(&mut self, action: Action, watcher: &mut JobWatcher) {
        match action {
            Action::Quit => self.running = false,
            Action::Up => self.selected = self.selected.saturating_sub(1),
            Action::Down => {
                if self.selected + 1 < self.view.timeline.len() {
                    self.selected += 1;
                }
            }
            Action::Top => self.selected = 0,
            Action::Reconnect => {
                let reconnected = watcher
                    .active_mut()
                    .is_some_and(|job_view| job_view.reconnect());
                self.notice = Some(if reconnected {
                    "Reconnecting stream...".to_string()
                } else {
                    "Stream is still active".to_string()
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ConnectionState, Status, StreamEvent};
    use chrono::Utc;

    fn view_with(events: usize) -> MergedView {
        MergedView {
            job_id: "J1".to_string(),
            job: None,
            timeline: (0..events)
                .map(|i| StreamEvent {
                    device_serial: format!("D{i}"),
                    status: Status::Running.into(),
                    message: String::new(),
                    timestamp: Utc::now(),
                    trace_id: None,
                    trace_url: None,
                })
                .collect(),
            is_live: true,
            connection: ConnectionState::Open,
        }
    }

    #[test]
    fn selection_follows_event_when_new_ones_arrive() {
        let mut app = WatchApp::new(view_with(3));
        app.selected = 1;
        app.update_view(view_with(5));
        assert_eq!(app.selected, 3);
    }

    #[test]
    fn selection_at_top_stays_on_newest() {
        let mut app = WatchApp::new(view_with(3));
        app.update_view(view_with(4));
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn selection_is_clamped_when_timeline_is_cleared() {
        let mut app = WatchApp::new(view_with(3));
        app.selected = 2;
        app.update_view(view_with(0));
        assert_eq!(app.selected, 0);
    }
}
