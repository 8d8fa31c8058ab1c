//! Crate-wide error types.

use thiserror::Error;

use crate::proto::phase::Phase;

/// Errors surfaced by the packet-routing layer.
///
/// All of these are session-local: the worst-case outcome of any single
/// failure is teardown of the affected session, never the proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The connection's outbound sink is gone (peer disconnected or writer
    /// task exited).
    #[error("connection closed")]
    ConnectionClosed,

    /// The bounded outbound queue is full. Writes are non-blocking at this
    /// layer; the current operation is aborted, never retried.
    #[error("outbound queue full")]
    QueueFull,

    /// Malformed wire data on a recognized packet.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The peer sent something the protocol does not allow in this phase.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Attempted backward phase move outside the Play -> Configuration
    /// re-entry window.
    #[error("illegal phase transition: {from} -> {to}")]
    PhaseTransition { from: Phase, to: Phase },

    /// No backend address available for this session.
    #[error("no backend available")]
    BackendUnavailable,

    /// A backend switch is already in flight for this player.
    #[error("backend switch already in progress")]
    SwitchInProgress,

    /// Resource-pack collaborator failure (logged, treated as handled).
    #[error("resource pack handler: {0}")]
    ResourcePack(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Low-level frame/packet decoding errors.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("varint longer than 5 bytes")]
    VarIntTooLong,

    #[error("frame of {0} bytes exceeds the {1} byte limit")]
    FrameTooLarge(usize, usize),

    #[error("string of {0} bytes exceeds the {1} byte limit")]
    StringTooLarge(usize, usize),

    #[error("invalid utf-8 in string field")]
    InvalidUtf8,

    #[error("packet body truncated")]
    Truncated,
}
