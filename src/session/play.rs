//! Play-phase handler: steady-state relay. Almost everything serverbound is
//! forwarded verbatim; the proxy only keeps its hands on keep-alives, plugin
//! messages, and the configuration re-entry ack.

use std::sync::Arc;

use crate::proto::dispatcher::PacketFrame;
use crate::proto::packet::Packet;
use crate::proto::phase::Phase;
use crate::session::handler::{forward_keep_alive, forward_to_server, NextStep, SessionHandler};
use crate::session::player::Player;
use crate::session::plugin;

pub struct PlayHandler {
    _private: (),
}

impl PlayHandler {
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for PlayHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHandler for PlayHandler {
    fn phase(&self) -> Phase {
        Phase::Play
    }

    fn handle_packet(&mut self, player: &Arc<Player>, frame: PacketFrame) -> NextStep {
        match frame.packet.clone() {
            Some(Packet::KeepAlive { .. }) => {
                forward_keep_alive(player, &frame);
                NextStep::Proceed
            }
            Some(Packet::PluginMessage { channel, data }) => {
                let backend = player.in_flight_or_connected();
                plugin::route_plugin_message(player, backend.as_ref(), &channel, data);
                NextStep::Proceed
            }
            Some(Packet::ConfigurationAck) => {
                // Race window: the switch orchestration normally installs the
                // configuration handler before the ack can arrive. An ack
                // seen here means the client initiated nothing; relay it.
                forward_to_server(player, &frame);
                NextStep::Proceed
            }
            _ => {
                forward_to_server(player, &frame);
                NextStep::Proceed
            }
        }
    }
}
