//! Protocol model: phases, packet shapes, and frame dispatch.
//!
//! # Data Flow
//! ```text
//! Socket bytes
//!     → codec.rs (varint length framing)
//!     → dispatcher.rs (id lookup against the connection's current phase)
//!     → packet.rs (typed decode of recognized shapes)
//!     → Hand off to the active session handler
//! ```
//!
//! Frames whose id is not recognized for the current phase are handed to the
//! session layer undecoded and are forwarded verbatim by default handlers.

pub mod codec;
pub mod dispatcher;
pub mod packet;
pub mod phase;

/// Direction of a packet relative to the backend servers.
///
/// Frames from the end-user client (and from the proxy acting as a client
/// toward a backend) are serverbound; frames from a backend (and from the
/// proxy toward the end-user) are clientbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Serverbound,
    Clientbound,
}

/// Negotiated protocol version, fixed by the handshake packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion(pub i32);

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}
