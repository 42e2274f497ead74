//! Continuous listener state machine

use std::fmt;
use thiserror::Error;

/// Listener states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ListenerState {
    #[default]
    Idle,
    Listening,
    CallbackRunning,
    Stopped,
}

impl ListenerState {
    /// Get the string representation
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::CallbackRunning => "callback_running",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error when an invalid state transition is attempted
#[derive(Debug, Clone, Error)]
#[error("Invalid state transition: cannot {action} while in {current_state} state")]
pub struct InvalidStateTransition {
    pub current_state: ListenerState,
    pub action: String,
}

/// Listener session entity.
///
/// State machine:
///   IDLE -> LISTENING (start)
///   LISTENING -> CALLBACK_RUNNING (begin_callback)
///   CALLBACK_RUNNING -> LISTENING (finish_callback)
///   any -> STOPPED (stop)
#[derive(Debug, Default)]
pub struct ListenerSession {
    state: ListenerState,
}

impl ListenerSession {
    pub fn new() -> Self {
        Self {
            state: ListenerState::Idle,
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state == ListenerState::Listening
    }

    pub fn is_stopped(&self) -> bool {
        self.state == ListenerState::Stopped
    }

    /// Transition from IDLE to LISTENING
    pub fn start(&mut self) -> Result<(), InvalidStateTransition> {
        self.transition(ListenerState::Idle, ListenerState::Listening, "start listening")
    }

    /// Transition from LISTENING to CALLBACK_RUNNING
    pub fn begin_callback(&mut self) -> Result<(), InvalidStateTransition> {
        self.transition(
            ListenerState::Listening,
            ListenerState::CallbackRunning,
            "run callback",
        )
    }

    /// Transition from CALLBACK_RUNNING back to LISTENING
    pub fn finish_callback(&mut self) -> Result<(), InvalidStateTransition> {
        self.transition(
            ListenerState::CallbackRunning,
            ListenerState::Listening,
            "finish callback",
        )
    }

    /// Enter STOPPED from any state. Stopping twice is a no-op.
    pub fn stop(&mut self) {
        self.state = ListenerState::Stopped;
    }

    fn transition(
        &mut self,
        from: ListenerState,
        to: ListenerState,
        action: &str,
    ) -> Result<(), InvalidStateTransition> {
        if self.state != from {
            return Err(InvalidStateTransition {
                current_state: self.state,
                action: action.to_string(),
            });
        }
        self.state = to;
        Ok(())
    }
}
