//! Per-player session layer.
//!
//! One [`Player`] aggregates a client connection, at most one established
//! backend, and at most one in-flight backend. The client connection owns
//! the polymorphic handler slot; backend connections are driven by the
//! switch orchestration in [`switcher`]. Each connection is read by exactly
//! one task, so packet handling is sequential per connection while the two
//! sides of a session stay concurrent.

pub mod backend;
pub mod configuration;
pub mod handler;
pub mod handshake;
pub mod login;
pub mod play;
pub mod player;
pub mod plugin;
pub mod status;
pub mod switcher;

use std::sync::Arc;

use tokio::net::TcpStream;

use crate::net::connection::{next_frame, run_writer, Connection, Side};
use crate::proto::dispatcher::decode_frame;
use crate::proto::{Direction, ProtocolVersion};
use crate::proxy::Proxy;
use crate::session::player::Player;

/// Drive one client connection from accept to close.
pub async fn run_client(proxy: Arc<Proxy>, stream: TcpStream) {
    let _ = stream.set_nodelay(true);
    let peer = stream.peer_addr().ok();
    let (mut read, write) = stream.into_split();

    let (conn, outbound_rx) = Connection::new(Side::Client, ProtocolVersion(0));
    tokio::spawn(run_writer(Arc::clone(&conn), outbound_rx, write));

    let player = Player::new(proxy, Arc::clone(&conn));
    tracing::info!(
        player = %player.id(),
        connection_id = %conn.id(),
        peer = ?peer,
        "Client connected"
    );

    while let Some(body) = next_frame(&conn, &mut read).await {
        let phase = conn.reader_phase();
        match decode_frame(phase, Direction::Serverbound, body) {
            Ok(frame) => player.process_frame(frame),
            Err(err) => {
                tracing::debug!(
                    connection_id = %conn.id(),
                    phase = %phase,
                    error = %err,
                    "Malformed client frame"
                );
                break;
            }
        }
    }

    player.handle_disconnect();
    tracing::info!(player = %player.id(), connection_id = %conn.id(), "Client session ended");
}
