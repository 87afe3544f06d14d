//! Lifecycle state of the synchronizer as seen by its host.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Lifecycle stage of a synchronizer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Created, no lifecycle event handled yet.
    Parsed = 0,
    /// Install in progress.
    Installing = 1,
    /// Core shell staged; waiting to be activated.
    Installed = 2,
    /// Activation in progress.
    Activating = 3,
    /// Controlling clients.
    Activated = 4,
    /// Install failed; this instance will never activate.
    Redundant = 5,
}

impl From<u8> for WorkerState {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Parsed,
            1 => Self::Installing,
            2 => Self::Installed,
            3 => Self::Activating,
            4 => Self::Activated,
            _ => Self::Redundant,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

/// Shared lifecycle flags. All operations are lock-free.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Creates a lifecycle in the [`WorkerState::Parsed`] stage.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(WorkerState::Parsed as u8),
            skip_waiting: AtomicBool::new(false),
            clients_claimed: AtomicBool::new(false),
        }
    }

    /// Returns the current stage.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        WorkerState::from(self.state.load(Ordering::Acquire))
    }

    /// Moves to `next`. A redundant instance stays redundant.
    pub fn transition(&self, next: WorkerState) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (WorkerState::from(current) != WorkerState::Redundant).then_some(next as u8)
            });
    }

    /// Requests that an installed instance activate without waiting for the
    /// previous instance to release its clients.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::Release);
    }

    /// Returns true if skip-waiting was requested.
    #[must_use]
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    /// Returns true if the host may activate this instance now.
    ///
    /// `has_active_predecessor` tells whether an older instance still
    /// controls clients.
    #[must_use]
    pub fn ready_to_activate(&self, has_active_predecessor: bool) -> bool {
        self.state() == WorkerState::Installed
            && (!has_active_predecessor || self.skip_waiting_requested())
    }

    /// Marks all open clients as controlled by this instance.
    pub fn claim_clients(&self) {
        self.clients_claimed.store(true, Ordering::Release);
    }

    /// Returns true once clients have been claimed.
    #[must_use]
    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_u8() {
        for state in [
            WorkerState::Parsed,
            WorkerState::Installing,
            WorkerState::Installed,
            WorkerState::Activating,
            WorkerState::Activated,
            WorkerState::Redundant,
        ] {
            assert_eq!(WorkerState::from(state as u8), state);
        }
        assert_eq!(WorkerState::from(200), WorkerState::Redundant);
    }

    #[test]
    fn redundant_is_sticky() {
        let lifecycle = Lifecycle::new();
        lifecycle.transition(WorkerState::Installing);
        lifecycle.transition(WorkerState::Redundant);
        lifecycle.transition(WorkerState::Activated);
        assert_eq!(lifecycle.state(), WorkerState::Redundant);
    }

    #[test]
    fn waiting_until_skip_requested() {
        let lifecycle = Lifecycle::new();
        assert!(!lifecycle.ready_to_activate(false));

        lifecycle.transition(WorkerState::Installed);
        assert!(lifecycle.ready_to_activate(false));
        assert!(!lifecycle.ready_to_activate(true));

        lifecycle.skip_waiting();
        assert!(lifecycle.ready_to_activate(true));
    }

    #[test]
    fn claim_clients_flag() {
        let lifecycle = Lifecycle::default();
        assert!(!lifecycle.clients_claimed());
        lifecycle.claim_clients();
        assert!(lifecycle.clients_claimed());
    }

    #[test]
    fn display_names() {
        assert_eq!(WorkerState::Activated.to_string(), "activated");
        assert_eq!(WorkerState::Redundant.to_string(), "redundant");
    }
}
