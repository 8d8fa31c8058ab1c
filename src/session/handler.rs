//! The per-phase session handler contract.

use std::sync::Arc;

use crate::proto::dispatcher::PacketFrame;
use crate::proto::phase::Phase;
use crate::session::backend::BackendConnection;
use crate::session::player::Player;
use crate::sync::completion::Completion;

/// What the connection task should do after a packet was handled.
pub enum NextStep {
    /// Keep the current handler.
    Proceed,
    /// Install the given handler (and phase) before decoding the next frame.
    SwitchTo(Phase, Box<dyn SessionHandler>),
}

/// Phase-specific packet handling strategy for a client connection.
///
/// Exactly one handler is active per connection at any instant. Handlers own
/// phase-local state only; session-wide state lives on [`Player`].
pub trait SessionHandler: Send {
    /// The phase this handler implements.
    fn phase(&self) -> Phase;

    /// Handle one decoded (or unrecognized) inbound frame.
    fn handle_packet(&mut self, player: &Arc<Player>, frame: PacketFrame) -> NextStep;

    /// The connection disconnected while this handler was active. The
    /// handler must release any externally visible state it registered,
    /// pending synchronizers included.
    fn disconnected(&mut self, player: &Arc<Player>) {
        let _ = player;
    }

    /// A backend connection reached its configuration-phase completion
    /// point. Returns the synchronizer the backend-switch orchestration
    /// awaits before promoting that backend, or `None` when the handoff
    /// cannot proceed ("switch failed, do not promote").
    ///
    /// Only the Configuration-phase handler implements this; every other
    /// phase reports no synchronizer.
    fn backend_finished_config(
        &mut self,
        player: &Arc<Player>,
        backend: &Arc<BackendConnection>,
        frame: &PacketFrame,
    ) -> Option<Completion> {
        let _ = (player, backend, frame);
        None
    }
}

/// Forward a frame verbatim to the backend currently serving this player,
/// preferring an in-flight connection over the established one.
///
/// The pass-through default for unrecognized packet kinds: never dropped,
/// only relayed.
pub fn forward_to_server(player: &Arc<Player>, frame: &PacketFrame) {
    let Some(server) = player.in_flight_or_connected() else {
        tracing::trace!(
            player = %player.id(),
            packet_id = frame.packet_id,
            "No backend reachable, frame dropped"
        );
        return;
    };
    let Some(conn) = server.ensure_connected() else {
        return;
    };
    if conn.write_frame(frame).is_ok() {
        crate::observability::metrics::record_forwarded("passthrough");
    }
}

/// Relay a keep-alive without semantic interpretation (liveness only).
pub fn forward_keep_alive(player: &Arc<Player>, frame: &PacketFrame) {
    forward_to_server(player, frame);
}
