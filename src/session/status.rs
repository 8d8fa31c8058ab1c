//! Status-phase handler: answers list pings locally and never dials a
//! backend. The phase is terminal; the connection closes after the pong.

use std::sync::Arc;

use crate::proto::dispatcher::PacketFrame;
use crate::proto::packet::Packet;
use crate::proto::phase::Phase;
use crate::session::handler::{NextStep, SessionHandler};
use crate::session::player::Player;

pub struct StatusHandler {
    responded: bool,
}

impl StatusHandler {
    pub fn new() -> Self {
        Self { responded: false }
    }
}

impl Default for StatusHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHandler for StatusHandler {
    fn phase(&self) -> Phase {
        Phase::Status
    }

    fn handle_packet(&mut self, player: &Arc<Player>, frame: PacketFrame) -> NextStep {
        match frame.packet {
            Some(Packet::StatusRequest) => {
                if self.responded {
                    tracing::trace!(player = %player.id(), "Duplicate status request ignored");
                    return NextStep::Proceed;
                }
                self.responded = true;

                let status = &player.proxy().config.status;
                let payload = serde_json::json!({
                    "version": {
                        "name": status.version_name,
                        "protocol": player.protocol_version().0,
                    },
                    "players": {
                        "max": status.max_players,
                        "online": 0,
                    },
                    "description": { "text": status.description },
                })
                .to_string();

                if let Err(err) = player
                    .client()
                    .write_packet(&Packet::StatusResponse { payload })
                {
                    tracing::debug!(player = %player.id(), error = %err, "Failed to send status response");
                }
                NextStep::Proceed
            }
            Some(Packet::StatusPing { nonce }) => {
                if let Err(err) = player.client().write_packet(&Packet::StatusPong { nonce }) {
                    tracing::debug!(player = %player.id(), error = %err, "Failed to send pong");
                }
                player.client().close();
                NextStep::Proceed
            }
            _ => {
                tracing::trace!(
                    player = %player.id(),
                    packet_id = frame.packet_id,
                    "Unexpected status-phase packet dropped"
                );
                NextStep::Proceed
            }
        }
    }
}
