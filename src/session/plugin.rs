//! Plugin-message routing shared by the configuration and play handlers.
//!
//! Responsibilities:
//! - Recognize the client brand announcement and cache it on the session
//!   instead of relaying it directly; backends learn the brand when their
//!   configuration finishes.
//! - Drop traffic on legacy compatibility channels outright.
//! - Forward unregistered channels to the backend without consulting policy.
//! - For registered channels, pause the backend's reads and submit a
//!   [`PluginMessageEvent`] to the interception pipeline; the relay decision
//!   is made in the completion callback and the pause lifts when it runs.

use std::sync::Arc;

use bytes::Bytes;

use crate::event::events::{ClientBrandEvent, PluginMessageEvent};
use crate::observability::metrics;
use crate::proto::packet::{self, Packet, BRAND_CHANNEL};
use crate::session::backend::BackendConnection;
use crate::session::player::Player;

/// Route one serverbound plugin message. `backend` is the connection the
/// message would be relayed to, when one exists; brand and legacy handling
/// work without one.
pub fn route_plugin_message(
    player: &Arc<Player>,
    backend: Option<&Arc<BackendConnection>>,
    channel: &str,
    data: Bytes,
) {
    if channel == BRAND_CHANNEL {
        handle_brand(player, data);
        return;
    }

    if packet::is_legacy_channel(channel) {
        tracing::trace!(
            player = %player.id(),
            channel = channel,
            "Dropping legacy-channel plugin message"
        );
        metrics::record_dropped("legacy_channel");
        return;
    }

    let Some(backend) = backend else {
        tracing::trace!(
            player = %player.id(),
            channel = channel,
            "No backend for plugin message, dropped"
        );
        return;
    };

    let identifier = match player.proxy().channels.lookup(channel) {
        Some(id) => id,
        None => {
            // Not subject to policy; relay as-is.
            let msg = Packet::PluginMessage {
                channel: channel.to_owned(),
                data,
            };
            if let Some(conn) = backend.ensure_connected() {
                if let Err(err) = conn.write_packet(&msg) {
                    tracing::debug!(
                        player = %player.id(),
                        backend = %conn.id(),
                        error = %err,
                        "Failed to forward plugin message"
                    );
                }
                metrics::record_forwarded("plugin_message");
            }
            return;
        }
    };

    let conn = match backend.ensure_connected() {
        Some(conn) => conn,
        None => return,
    };

    // Hold the backend's reads until policy has ruled, so nothing the
    // backend sends can overtake the (possibly rewritten) message.
    let pause = conn.gate().pause_scoped();
    let event = PluginMessageEvent::new(player.client().id(), conn.id(), identifier, data);
    metrics::record_intercepted("plugin_message");

    let player = Arc::clone(player);
    let backend = Arc::clone(backend);
    // Relay under the channel string the client used on the wire; the
    // identifier's normalized form never leaks into traffic.
    let wire_channel = channel.to_owned();
    player.proxy().events.clone().fire_parallel(event, move |event| {
        let _pause = pause;
        if !event.allowed() {
            metrics::record_dropped("plugin_message_vetoed");
            return;
        }
        if !backend.active() {
            return;
        }
        let msg = Packet::PluginMessage {
            channel: wire_channel,
            data: event.into_data(),
        };
        if let Err(err) = backend.connection().write_packet(&msg) {
            tracing::debug!(
                player = %player.id(),
                backend = %backend.connection().id(),
                error = %err,
                "Failed to forward intercepted plugin message"
            );
        } else {
            metrics::record_forwarded("plugin_message");
        }
    });
}

fn handle_brand(player: &Arc<Player>, data: Bytes) {
    let brand = packet::read_brand(&data);
    tracing::debug!(player = %player.id(), brand = %brand, "Client brand received");
    player.set_client_brand(brand.clone());
    // Informational only; policy must never stall the client's read loop.
    let event = ClientBrandEvent {
        player: player.id(),
        brand,
    };
    player.proxy().events.clone().fire_parallel(event, |_| {});
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfig;
    use crate::net::connection::{Connection, Side};
    use crate::proto::phase::Phase;
    use crate::proto::{Direction, ProtocolVersion};
    use crate::proxy::Proxy;

    fn player_with_backend() -> (
        Arc<Player>,
        Arc<BackendConnection>,
        tokio::sync::mpsc::Receiver<Bytes>,
    ) {
        let proxy = Proxy::new(ProxyConfig::default());
        let (client, client_rx) = Connection::new(Side::Client, ProtocolVersion(767));
        std::mem::forget(client_rx);
        let player = Player::new(proxy, client);

        let (conn, rx) = Connection::new(Side::Backend, ProtocolVersion(767));
        conn.set_reader_phase(Phase::Login).unwrap();
        conn.set_reader_phase(Phase::Configuration).unwrap();
        conn.set_writer_phase(Phase::Login).unwrap();
        conn.set_writer_phase(Phase::Configuration).unwrap();
        let backend = Arc::new(BackendConnection::new(conn, "127.0.0.1:25566".parse().unwrap()));
        (player, backend, rx)
    }

    fn decode_backend_frame(bytes: Bytes) -> Packet {
        let (id, mut body) = crate::proto::codec::split_frame(&bytes).unwrap();
        Packet::decode(Phase::Configuration, Direction::Serverbound, id, &mut body)
            .unwrap()
            .expect("recognized packet")
    }

    #[tokio::test]
    async fn brand_is_cached_not_forwarded() {
        let (player, backend, mut rx) = player_with_backend();
        route_plugin_message(
            &player,
            Some(&backend),
            BRAND_CHANNEL,
            packet::write_brand("quartz"),
        );
        assert_eq!(player.client_brand().as_deref(), Some("quartz"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn brand_is_cached_even_without_backend() {
        let (player, _backend, _rx) = player_with_backend();
        route_plugin_message(&player, None, BRAND_CHANNEL, packet::write_brand("obsidian"));
        assert_eq!(player.client_brand().as_deref(), Some("obsidian"));
    }

    #[tokio::test]
    async fn legacy_channel_is_dropped() {
        let (player, backend, mut rx) = player_with_backend();
        route_plugin_message(&player, Some(&backend), "compat:old", Bytes::from_static(b"x"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregistered_channel_forwards_immediately() {
        let (player, backend, mut rx) = player_with_backend();
        route_plugin_message(&player, Some(&backend), "game:unlisted", Bytes::from_static(b"hi"));
        let packet = decode_backend_frame(rx.try_recv().expect("forwarded"));
        assert_eq!(
            packet,
            Packet::PluginMessage {
                channel: "game:unlisted".into(),
                data: Bytes::from_static(b"hi"),
            }
        );
    }

    #[tokio::test]
    async fn registered_channel_pauses_and_forwards_when_allowed() {
        let (player, backend, mut rx) = player_with_backend();
        player.proxy().channels.register("game:chat");

        route_plugin_message(&player, Some(&backend), "game:chat", Bytes::from_static(b"hello"));
        // Policy runs on a spawned task; the gate stays paused until then.
        assert!(backend.connection().gate().is_paused());

        let bytes = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("callback ran")
            .expect("forwarded");
        let packet = decode_backend_frame(bytes);
        assert_eq!(
            packet,
            Packet::PluginMessage {
                channel: "game:chat".into(),
                data: Bytes::from_static(b"hello"),
            }
        );

        // Resume happens when the callback's guard drops.
        tokio::task::yield_now().await;
        assert!(!backend.connection().gate().is_paused());
    }

    #[tokio::test]
    async fn registered_channel_vetoed_is_not_forwarded() {
        let (player, backend, mut rx) = player_with_backend();
        player.proxy().channels.register("game:chat");
        player
            .proxy()
            .events
            .subscribe::<PluginMessageEvent, _>(|e| e.set_allowed(false));

        route_plugin_message(&player, Some(&backend), "game:chat", Bytes::from_static(b"no"));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        assert!(!backend.connection().gate().is_paused());
    }

    #[tokio::test]
    async fn brand_notification_is_delivered_off_the_routing_path() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let (player, _backend, _rx) = player_with_backend();
        let seen = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&seen);
        player
            .proxy()
            .events
            .subscribe::<ClientBrandEvent, _>(move |_| flag.store(true, Ordering::SeqCst));

        route_plugin_message(&player, None, BRAND_CHANNEL, packet::write_brand("basalt"));
        // The brand is cached inline, but policy has not run yet.
        assert_eq!(player.client_brand().as_deref(), Some("basalt"));
        assert!(!seen.load(Ordering::SeqCst));

        tokio::task::yield_now().await;
        assert!(seen.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn registered_bare_channel_keeps_its_wire_name() {
        let (player, backend, mut rx) = player_with_backend();
        player.proxy().channels.register("chat");
        route_plugin_message(&player, Some(&backend), "chat", Bytes::from_static(b"hey"));

        let bytes = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("callback ran")
            .expect("forwarded");
        // The identifier gains a default namespace internally; the relayed
        // channel must stay what the client sent.
        assert_eq!(
            decode_backend_frame(bytes),
            Packet::PluginMessage {
                channel: "chat".into(),
                data: Bytes::from_static(b"hey"),
            }
        );
    }

    #[tokio::test]
    async fn backend_gone_before_policy_rules_still_resumes() {
        let (player, backend, mut rx) = player_with_backend();
        player.proxy().channels.register("game:chat");
        let target = Arc::clone(&backend);
        player
            .proxy()
            .events
            .subscribe::<PluginMessageEvent, _>(move |_| target.teardown());

        route_plugin_message(&player, Some(&backend), "game:chat", Bytes::from_static(b"late"));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        assert!(!backend.connection().gate().is_paused());
    }
}
