//! Lifecycle of the push channel for one job view.
//!
//! ```text
//!   connecting ──► open ──► errored
//!        │                    │
//!        └────────► errored ──┘ (reconnect: errored ──► connecting)
//!
//!   any state ──► closed (terminal)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Open,
    Errored,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Errored => "errored",
            Self::Closed => "closed",
        }
    }

    /// Events may still be arriving.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Open)
    }

    fn allows(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Open) | (Connecting, Errored) | (Open, Errored) | (Errored, Connecting)
        ) || (next == Closed && *self != Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// Observed the current state again.
    Unchanged,
    /// Not reachable from the current state. Always the case once closed.
    Rejected,
}

/// Guards the connection state so that repeated or late notifications
/// can be fed in without checks at the call site.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn transition(&mut self, next: ConnectionState) -> Transition {
        if self.state == next {
            Transition::Unchanged
        } else if self.state.allows(next) {
            self.state = next;
            Transition::Applied
        } else {
            Transition::Rejected
        }
    }

    /// Moves to `closed`. Returns false if it was already closed.
    pub fn close(&mut self) -> bool {
        self.transition(ConnectionState::Closed) == Transition::Applied
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }
}
