//! Protocol phases and the legal transitions between them.

use serde::{Deserialize, Serialize};

/// A protocol stage with its own legal packet set and handler.
///
/// A connection's phase only moves forward in declaration order, with one
/// exception: a session may re-enter Configuration from Play to renegotiate
/// during a live backend switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Initial state; the client declares version and intent.
    Handshake,
    /// Server list query; terminal, the connection closes after the pong.
    Status,
    /// Authentication exchange.
    Login,
    /// Session setup: settings, channels, resource packs.
    Configuration,
    /// Active gameplay relay.
    Play,
}

impl Phase {
    /// Whether a transition from `self` to `next` is legal.
    ///
    /// Staying in the same phase is always allowed so idempotent set calls
    /// do not error.
    pub fn can_transition(self, next: Phase) -> bool {
        use Phase::*;
        self == next
            || matches!(
                (self, next),
                (Handshake, Status)
                    | (Handshake, Login)
                    | (Login, Configuration)
                    | (Configuration, Play)
                    | (Play, Configuration)
            )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Handshake => "handshake",
            Phase::Status => "status",
            Phase::Login => "login",
            Phase::Configuration => "configuration",
            Phase::Play => "play",
        };
        f.write_str(name)
    }
}
