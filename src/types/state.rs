//! Connection state machine shared by the stream connection and the orchestrator.
//!
//! ```text
//!  Disconnected ──► Connecting ──► Connected
//!                     ▲   │            │
//!                     │   ▼            │
//!                   Reconnecting ◄─────┘
//!
//!  any state ──stop──► Disconnected
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one stream connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not running. Initial state, and terminal once stopped.
    #[default]
    Disconnected,

    /// Opening the network source.
    Connecting,

    /// Source open, frames flowing to the relay.
    Connected,

    /// Source lost; waiting out the backoff before the next attempt.
    Reconnecting,
}

impl ConnectionState {
    /// Whether `self -> next` is a legal transition.
    ///
    /// `Disconnected` is reachable from anywhere because stop is valid in every state.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (_, Disconnected)
                | (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Reconnecting)
                | (Connected, Reconnecting)
                | (Reconnecting, Connecting)
        )
    }

    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}
