//! Test support: a recording host.
//!
//! Shared by unit and integration tests across the workspace, so it lives in
//! a normal module rather than behind `cfg(test)`.

use crate::host::{LogKind, RunHost};
use crate::robot::RobotState;
use std::cell::RefCell;

/// Everything a [`RecordingHost`] observed, in order.
#[derive(Debug, Clone)]
pub enum HostEvent {
    Log(LogKind, String),
    StateChanged,
    RobotUpdate(String, RobotState),
    Completed(bool, String),
    InputRequested(String),
}

/// Host that records every notification for later assertions.
#[derive(Debug, Default)]
pub struct RecordingHost {
    events: RefCell<Vec<HostEvent>>,
}

impl RecordingHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<HostEvent> {
        self.events.borrow().clone()
    }

    /// All log lines, joined with their kind dropped.
    #[must_use]
    pub fn logs(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                HostEvent::Log(_, msg) => Some(msg.clone()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn completions(&self) -> Vec<(bool, String)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                HostEvent::Completed(success, msg) => Some((*success, msg.clone())),
                _ => None,
            })
            .collect()
    }

    /// Last recorded state snapshot for a robot, if any.
    #[must_use]
    pub fn last_robot_state(&self, name: &str) -> Option<RobotState> {
        self.events
            .borrow()
            .iter()
            .rev()
            .find_map(|e| match e {
                HostEvent::RobotUpdate(n, state) if n == name => Some(state.clone()),
                _ => None,
            })
    }

    #[must_use]
    pub fn last_prompt(&self) -> Option<String> {
        self.events
            .borrow()
            .iter()
            .rev()
            .find_map(|e| match e {
                HostEvent::InputRequested(prompt) => Some(prompt.clone()),
                _ => None,
            })
    }

    /// True if any log line contains `needle`.
    #[must_use]
    pub fn logged(&self, needle: &str) -> bool {
        self.logs().iter().any(|l| l.contains(needle))
    }
}

impl RunHost for RecordingHost {
    fn log(&self, kind: LogKind, message: &str) {
        self.events
            .borrow_mut()
            .push(HostEvent::Log(kind, message.to_string()));
    }

    fn state_changed(&self) {
        self.events.borrow_mut().push(HostEvent::StateChanged);
    }

    fn robot_update(&self, name: &str, state: &RobotState) {
        self.events
            .borrow_mut()
            .push(HostEvent::RobotUpdate(name.to_string(), state.clone()));
    }

    fn completed(&self, success: bool, message: &str) {
        self.events
            .borrow_mut()
            .push(HostEvent::Completed(success, message.to_string()));
    }

    fn input_requested(&self, prompt: &str) {
        self.events
            .borrow_mut()
            .push(HostEvent::InputRequested(prompt.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order() {
        let host = RecordingHost::new();
        host.log(LogKind::Robot, "moved");
        host.completed(false, "boom");

        assert_eq!(host.logs(), vec!["moved".to_string()]);
        assert_eq!(host.completions(), vec![(false, "boom".to_string())]);
        assert!(host.logged("mov"));
        assert!(!host.logged("jump"));
    }
}
