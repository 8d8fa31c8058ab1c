//! Backend-switch orchestration.
//!
//! Responsibilities:
//! - Dial a backend, replay the handshake and login the client already
//!   performed against the proxy, and drive the new link through its
//!   configuration pass.
//! - On the backend's configuration finish, consult the client-side handler
//!   for the switch synchronizer and await it before promoting the link from
//!   in-flight to connected.
//! - Relay clientbound traffic verbatim to the client in the meantime,
//!   honoring the connection's read gate.
//!
//! Design decisions:
//! - The whole backend lifetime is one task; packet handling on the backend
//!   side stays sequential, and all polymorphic dispatch stays on the client
//!   connection's handler slot.
//! - A backend that disconnects while serving the player ends the session;
//!   one that fails while still in flight only cancels the switch.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;

use crate::error::ProxyError;
use crate::net::connection::{next_frame, run_writer, Connection, Side};
use crate::observability::metrics;
use crate::proto::dispatcher::{decode_frame, PacketFrame};
use crate::proto::packet::Packet;
use crate::proto::phase::Phase;
use crate::proto::Direction;
use crate::session::backend::BackendConnection;
use crate::session::configuration::ClientConfigHandler;
use crate::session::player::Player;
use crate::sync::completion::Outcome;

/// Dial the first backend for a freshly configured client. Spawned from the
/// login flow; failures end the session.
pub fn spawn_initial_connect(player: Arc<Player>) {
    tokio::spawn(async move {
        let Some(addr) = player.proxy().directory.pick() else {
            tracing::warn!(player = %player.id(), "No backend configured, dropping session");
            player.handle_disconnect();
            return;
        };
        if let Err(err) = connect_to_backend(&player, addr).await {
            tracing::info!(
                player = %player.id(),
                backend_addr = %addr,
                error = %err,
                "Initial backend connection failed"
            );
            player.handle_disconnect();
        }
    });
}

/// Move a mid-play session to `addr`. The client is sent back into its
/// configuration phase first so the new backend's finish packet lands on a
/// handler that understands it; the serving backend stays attached until
/// the new one is promoted.
pub fn spawn_switch(player: Arc<Player>, addr: SocketAddr) {
    tokio::spawn(async move {
        if let Err(err) = player.client().write_packet(&Packet::StartConfiguration) {
            tracing::debug!(player = %player.id(), error = %err, "Failed to start reconfiguration");
            return;
        }
        player.install_handler(Phase::Configuration, Box::new(ClientConfigHandler::new()));
        if let Err(err) = connect_to_backend(&player, addr).await {
            tracing::info!(
                player = %player.id(),
                backend_addr = %addr,
                error = %err,
                "Backend switch failed"
            );
        }
    });
}

/// Dial `addr`, replay handshake and login, then drive the connection until
/// it closes. Returns once the backend's lifetime ends.
pub async fn connect_to_backend(player: &Arc<Player>, addr: SocketAddr) -> Result<(), ProxyError> {
    let connect_timeout = Duration::from_secs(player.proxy().config.timeouts.connect_secs);
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| ProxyError::BackendUnavailable)?
        .map_err(|_| ProxyError::BackendUnavailable)?;
    let _ = stream.set_nodelay(true);
    let (read_half, write_half) = stream.into_split();

    let (conn, outbound_rx) = Connection::new(Side::Backend, player.protocol_version());
    tokio::spawn(run_writer(Arc::clone(&conn), outbound_rx, write_half));

    let backend = Arc::new(BackendConnection::new(Arc::clone(&conn), addr));
    if let Err(err) = player.set_in_flight(Arc::clone(&backend)) {
        conn.close();
        return Err(err);
    }

    tracing::info!(
        player = %player.id(),
        connection_id = %conn.id(),
        backend_addr = %addr,
        "Backend dial succeeded"
    );

    // Replay what the client already negotiated with the proxy.
    let handshake = Packet::Handshake {
        protocol: player.protocol_version(),
        hostname: addr.ip().to_string(),
        port: addr.port(),
        next: Phase::Login,
    };
    conn.write_packet(&handshake)?;
    conn.set_writer_phase(Phase::Login)?;
    conn.set_reader_phase(Phase::Login)?;
    conn.write_packet(&Packet::LoginStart {
        username: player.username().unwrap_or_default(),
    })?;

    drive_backend(player, &backend, read_half).await;
    Ok(())
}

/// Sequentially handle the backend's clientbound stream for its whole
/// lifetime.
async fn drive_backend(player: &Arc<Player>, backend: &Arc<BackendConnection>, mut read: OwnedReadHalf) {
    let conn = Arc::clone(backend.connection());
    // next_frame is the interception backpressure point: a paused gate holds
    // even an already-read frame so nothing overtakes a pending policy
    // ruling, and a close interrupts the read.
    while let Some(body) = next_frame(&conn, &mut read).await {
        let phase = conn.reader_phase();
        let frame = match decode_frame(phase, Direction::Clientbound, body) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::debug!(
                    connection_id = %conn.id(),
                    phase = %phase,
                    error = %err,
                    "Malformed backend frame"
                );
                break;
            }
        };

        let proceed = match phase {
            Phase::Login => handle_login_frame(player, &conn, frame),
            Phase::Configuration | Phase::Play => {
                handle_session_frame(player, backend, &conn, frame).await
            }
            // The backend connection is born past handshake and never
            // serves status.
            Phase::Handshake | Phase::Status => false,
        };
        if !proceed {
            break;
        }
    }

    conn.close();
    finish_backend(player, backend);
}

/// Login-replay responses. Nothing in this phase reaches the client; the
/// proxy already answered login on its behalf.
fn handle_login_frame(player: &Arc<Player>, conn: &Arc<Connection>, frame: PacketFrame) -> bool {
    match frame.packet {
        Some(Packet::LoginSuccess { username, .. }) => {
            tracing::debug!(
                connection_id = %conn.id(),
                username = %username,
                "Backend accepted login"
            );
            if conn.write_packet(&Packet::LoginAcknowledged).is_err() {
                return false;
            }
            if conn.set_writer_phase(Phase::Configuration).is_err()
                || conn.set_reader_phase(Phase::Configuration).is_err()
            {
                return false;
            }
            // The client is not asked again for its settings; replay the
            // cached ones.
            if let Some(settings) = player.client_settings() {
                if conn.write_packet(&Packet::ClientSettings(settings)).is_err() {
                    return false;
                }
            }
            true
        }
        Some(Packet::Disconnect { reason }) => {
            tracing::info!(
                connection_id = %conn.id(),
                reason = %reason,
                "Backend rejected login"
            );
            false
        }
        _ => {
            tracing::trace!(
                connection_id = %conn.id(),
                packet_id = frame.packet_id,
                "Unhandled login-phase backend packet dropped"
            );
            true
        }
    }
}

/// Configuration- and play-phase clientbound traffic: the finish packet runs
/// the promotion protocol, everything else relays verbatim.
async fn handle_session_frame(
    player: &Arc<Player>,
    backend: &Arc<BackendConnection>,
    conn: &Arc<Connection>,
    frame: PacketFrame,
) -> bool {
    match frame.packet {
        Some(Packet::FinishConfiguration) => complete_switch(player, backend, conn, &frame).await,
        Some(Packet::StartConfiguration) => {
            // The serving backend wants the client back in configuration.
            if player.client().write_frame(&frame).is_err() {
                return false;
            }
            player.install_handler(Phase::Configuration, Box::new(ClientConfigHandler::new()));
            conn.set_reader_phase(Phase::Configuration).is_ok()
                && conn.set_writer_phase(Phase::Configuration).is_ok()
        }
        Some(Packet::Disconnect { ref reason }) => {
            tracing::info!(
                connection_id = %conn.id(),
                reason = %reason,
                "Backend disconnected the player"
            );
            let _ = player.client().write_frame(&frame);
            false
        }
        _ => {
            if player.client().write_frame(&frame).is_err() {
                return false;
            }
            metrics::record_forwarded("relay");
            true
        }
    }
}

/// The backend finished configuration: hand the finish frame to the client's
/// handler, await the synchronizer, and promote on success.
async fn complete_switch(
    player: &Arc<Player>,
    backend: &Arc<BackendConnection>,
    conn: &Arc<Connection>,
    frame: &PacketFrame,
) -> bool {
    let completion = player.with_handler(|handler| handler.backend_finished_config(player, backend, frame));
    let Some(completion) = completion else {
        tracing::debug!(
            connection_id = %conn.id(),
            "Switch rejected by the session handler"
        );
        return false;
    };

    match completion.wait().await {
        Outcome::Finished => {
            if let Some(previous) = player.promote_in_flight(backend) {
                tracing::debug!(
                    player = %player.id(),
                    old_backend = %previous.connection().id(),
                    new_backend = %conn.id(),
                    "Backend promoted"
                );
                previous.teardown();
            }
            conn.set_reader_phase(Phase::Play).is_ok() && conn.set_writer_phase(Phase::Play).is_ok()
        }
        Outcome::Abandoned => {
            tracing::debug!(
                connection_id = %conn.id(),
                "Switch abandoned before the client finished"
            );
            false
        }
    }
}

/// The backend's lifetime ended: a serving backend takes the session with
/// it, an in-flight one only cancels the pending switch.
fn finish_backend(player: &Arc<Player>, backend: &Arc<BackendConnection>) {
    let was_serving = player
        .connected_server()
        .is_some_and(|current| Arc::ptr_eq(&current, backend));
    if was_serving {
        tracing::info!(
            player = %player.id(),
            connection_id = %backend.connection().id(),
            "Serving backend lost, ending session"
        );
        player.handle_disconnect();
    } else {
        player.clear_in_flight(backend);
        backend.teardown();
    }
}
