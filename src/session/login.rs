//! Login-phase handler. The proxy answers login itself and only dials the
//! backend once the client has acknowledged and entered configuration.

use std::sync::Arc;

use crate::proto::dispatcher::PacketFrame;
use crate::proto::packet::Packet;
use crate::proto::phase::Phase;
use crate::session::configuration::ClientConfigHandler;
use crate::session::handler::{NextStep, SessionHandler};
use crate::session::player::Player;
use crate::session::switcher;

pub struct LoginHandler {
    success_sent: bool,
}

impl LoginHandler {
    pub fn new() -> Self {
        Self {
            success_sent: false,
        }
    }
}

impl Default for LoginHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHandler for LoginHandler {
    fn phase(&self) -> Phase {
        Phase::Login
    }

    fn handle_packet(&mut self, player: &Arc<Player>, frame: PacketFrame) -> NextStep {
        match frame.packet {
            Some(Packet::LoginStart { username }) => {
                if self.success_sent {
                    tracing::trace!(player = %player.id(), "Duplicate login start ignored");
                    return NextStep::Proceed;
                }
                player.set_username(username.clone());
                tracing::info!(player = %player.id(), username = %username, "Login started");

                let success = Packet::LoginSuccess {
                    id: player.id(),
                    username,
                };
                if let Err(err) = player.client().write_packet(&success) {
                    tracing::debug!(player = %player.id(), error = %err, "Failed to send login success");
                    player.client().close();
                    return NextStep::Proceed;
                }
                self.success_sent = true;
                NextStep::Proceed
            }
            Some(Packet::LoginAcknowledged) => {
                if !self.success_sent {
                    tracing::debug!(player = %player.id(), "Login acknowledged before success, closing");
                    player.client().close();
                    return NextStep::Proceed;
                }
                // The client is now in configuration; dial the first backend
                // in the background while the new handler takes over.
                switcher::spawn_initial_connect(player.clone());
                NextStep::SwitchTo(Phase::Configuration, Box::new(ClientConfigHandler::new()))
            }
            _ => {
                tracing::trace!(
                    player = %player.id(),
                    packet_id = frame.packet_id,
                    "Unexpected login-phase packet dropped"
                );
                NextStep::Proceed
            }
        }
    }
}
