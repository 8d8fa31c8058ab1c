//! Handshake-phase handler: the first packet fixes protocol version and
//! routes the connection toward Status or Login.

use std::sync::Arc;

use crate::proto::dispatcher::PacketFrame;
use crate::proto::packet::Packet;
use crate::proto::phase::Phase;
use crate::session::handler::{NextStep, SessionHandler};
use crate::session::login::LoginHandler;
use crate::session::player::Player;
use crate::session::status::StatusHandler;

pub struct HandshakeHandler {
    _private: (),
}

impl HandshakeHandler {
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for HandshakeHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHandler for HandshakeHandler {
    fn phase(&self) -> Phase {
        Phase::Handshake
    }

    fn handle_packet(&mut self, player: &Arc<Player>, frame: PacketFrame) -> NextStep {
        match frame.packet {
            Some(Packet::Handshake {
                protocol,
                hostname,
                port,
                next,
            }) => {
                player.client().set_protocol_version(protocol);
                tracing::debug!(
                    player = %player.id(),
                    version = %protocol,
                    hostname = %hostname,
                    port = port,
                    intent = %next,
                    "Handshake received"
                );
                match next {
                    Phase::Status => NextStep::SwitchTo(Phase::Status, Box::new(StatusHandler::new())),
                    _ => NextStep::SwitchTo(Phase::Login, Box::new(LoginHandler::new())),
                }
            }
            // No peer connection exists yet, so the pass-through default has
            // no target; drop with a trace.
            _ => {
                tracing::trace!(
                    player = %player.id(),
                    packet_id = frame.packet_id,
                    "Unexpected packet before handshake"
                );
                NextStep::Proceed
            }
        }
    }
}
