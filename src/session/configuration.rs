//! Configuration-phase handler, the junction every backend handoff crosses.
//!
//! Responsibilities:
//! - Relay liveness and negotiation traffic (keep-alives, known content
//!   packs, transfer pings) to the backend currently serving the player,
//!   preferring an in-flight connection over the established one.
//! - Cache client settings on the session so a later backend can be brought
//!   up without asking the client again.
//! - Run cookie responses through the ordered interception hook and resource
//!   pack responses through the collaborator before deciding to relay.
//! - On the client's configuration finish, hand the connection to the Play
//!   handler and release the switch synchronizer, in that order.
//!
//! Design decisions:
//! - The handler owns one [`Completion`] per configuration pass. The backend
//!   orchestration obtains it through [`SessionHandler::backend_finished_config`]
//!   and awaits it; a client disconnect completes it as abandoned so the
//!   orchestration never hangs.
//! - Frames that do not decode in this phase are forwarded verbatim, never
//!   dropped. Protocol growth on the backend side must not require proxy
//!   changes.

use std::sync::Arc;

use crate::event::events::CookieReceiveEvent;
use crate::observability::metrics;
use crate::proto::dispatcher::PacketFrame;
use crate::proto::packet::{self, Packet, BRAND_CHANNEL};
use crate::proto::phase::Phase;
use crate::resourcepack::ResourcePackResponseInfo;
use crate::session::backend::BackendConnection;
use crate::session::handler::{forward_keep_alive, forward_to_server, NextStep, SessionHandler};
use crate::session::play::PlayHandler;
use crate::session::player::Player;
use crate::session::plugin;
use crate::sync::completion::{Completion, Outcome};

pub struct ClientConfigHandler {
    config_switch_done: Completion,
}

impl ClientConfigHandler {
    pub fn new() -> Self {
        Self {
            config_switch_done: Completion::new(),
        }
    }

    /// The synchronizer released when the client leaves configuration.
    pub fn switch_done(&self) -> Completion {
        self.config_switch_done.clone()
    }

    fn handle_cookie_response(
        &self,
        player: &Arc<Player>,
        key: String,
        payload: Option<bytes::Bytes>,
    ) {
        let mut event = CookieReceiveEvent::new(key, payload);
        metrics::record_intercepted("cookie_response");
        // Ordered delivery: the forwarding decision is read off the event
        // right here, unlike the plugin-message path.
        player.proxy().events.fire(&mut event);
        if !event.allowed() {
            tracing::debug!(
                player = %player.id(),
                key = event.original_key(),
                "Cookie response vetoed"
            );
            metrics::record_dropped("cookie_vetoed");
            return;
        }
        let Some(server) = player.in_flight_or_connected() else {
            return;
        };
        let Some(conn) = server.ensure_connected() else {
            return;
        };
        let relay = Packet::CookieResponse {
            key: event.effective_key().to_owned(),
            payload: event.effective_payload(),
        };
        if let Err(err) = conn.write_packet(&relay) {
            tracing::debug!(
                player = %player.id(),
                backend = %conn.id(),
                error = %err,
                "Failed to relay cookie response"
            );
        } else {
            metrics::record_forwarded("cookie_response");
        }
    }

    fn handle_resource_pack_response(
        &self,
        player: &Arc<Player>,
        frame: &PacketFrame,
        request: u64,
        result: packet::ResourcePackResult,
    ) {
        let info = ResourcePackResponseInfo { request, result };
        match player.proxy().resource_packs.on_response(&info) {
            Ok(true) => {}
            Ok(false) => forward_to_server(player, frame),
            Err(err) => {
                tracing::debug!(
                    player = %player.id(),
                    request = request,
                    error = %err,
                    "Resource pack handler failed, treating response as handled"
                );
            }
        }
    }
}

impl Default for ClientConfigHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHandler for ClientConfigHandler {
    fn phase(&self) -> Phase {
        Phase::Configuration
    }

    fn handle_packet(&mut self, player: &Arc<Player>, frame: PacketFrame) -> NextStep {
        match frame.packet.clone() {
            Some(Packet::KeepAlive { .. }) => {
                forward_keep_alive(player, &frame);
                NextStep::Proceed
            }
            Some(Packet::ClientSettings(settings)) => {
                player.set_client_settings(settings);
                NextStep::Proceed
            }
            Some(Packet::ResourcePackResponse { request, result }) => {
                self.handle_resource_pack_response(player, &frame, request, result);
                NextStep::Proceed
            }
            Some(Packet::FinishConfiguration) => {
                tracing::debug!(player = %player.id(), "Client finished configuration");
                // Relay the ack from this task so no later client frame can
                // overtake it on the backend socket, then release the
                // synchronizer.
                forward_to_server(player, &frame);
                self.config_switch_done.complete(Outcome::Finished);
                NextStep::SwitchTo(Phase::Play, Box::new(PlayHandler::new()))
            }
            Some(Packet::PingIdentify { .. }) => {
                if let Some(backend) = player.connection_in_flight() {
                    if let Some(conn) = backend.ensure_connected() {
                        if conn.write_frame(&frame).is_err() {
                            tracing::debug!(
                                player = %player.id(),
                                backend = %conn.id(),
                                "Failed to relay transfer ping"
                            );
                        }
                    }
                }
                NextStep::Proceed
            }
            Some(Packet::KnownPacks { .. }) => {
                forward_to_server(player, &frame);
                NextStep::Proceed
            }
            Some(Packet::CookieResponse { key, payload }) => {
                self.handle_cookie_response(player, key, payload);
                NextStep::Proceed
            }
            Some(Packet::PluginMessage { channel, data }) => {
                let backend = player.in_flight_or_connected();
                plugin::route_plugin_message(player, backend.as_ref(), &channel, data);
                NextStep::Proceed
            }
            Some(Packet::ConfigurationAck) => {
                // Already re-entered configuration on the proxy side when the
                // switch was initiated; the ack itself carries no payload.
                NextStep::Proceed
            }
            _ => {
                forward_to_server(player, &frame);
                NextStep::Proceed
            }
        }
    }

    fn disconnected(&mut self, player: &Arc<Player>) {
        if self.config_switch_done.complete(Outcome::Abandoned) {
            tracing::debug!(
                player = %player.id(),
                "Client left during configuration, abandoning pending switch"
            );
        }
    }

    /// A backend finished its configuration pass. Teach it the client's
    /// brand if it has not heard it yet, relay its finish packet to the
    /// client, move the client's writer ahead to Play, and hand the
    /// synchronizer to the orchestration.
    fn backend_finished_config(
        &mut self,
        player: &Arc<Player>,
        backend: &Arc<BackendConnection>,
        frame: &PacketFrame,
    ) -> Option<Completion> {
        if !backend.brand_announced() {
            if let Some(brand) = player.client_brand() {
                let announce = Packet::PluginMessage {
                    channel: BRAND_CHANNEL.to_owned(),
                    data: packet::write_brand(&brand),
                };
                if let Some(conn) = backend.ensure_connected() {
                    if let Err(err) = conn.write_packet(&announce) {
                        tracing::debug!(
                            player = %player.id(),
                            backend = %conn.id(),
                            error = %err,
                            "Failed to announce client brand"
                        );
                        return None;
                    }
                    backend.mark_brand_announced();
                }
            }
        }

        if let Err(err) = player.client().write_frame(frame) {
            tracing::debug!(
                player = %player.id(),
                error = %err,
                "Failed to relay configuration finish to client"
            );
            return None;
        }
        if let Err(err) = player.client().set_writer_phase(Phase::Play) {
            tracing::warn!(player = %player.id(), error = %err, "Client writer phase out of step");
        }
        Some(self.config_switch_done.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{Bytes, BytesMut};
    use tokio::sync::mpsc;

    use crate::config::ProxyConfig;
    use crate::error::ProxyError;
    use crate::net::connection::{Connection, Side};
    use crate::proto::codec;
    use crate::proto::dispatcher::decode_frame;
    use crate::proto::packet::{ClientSettings, KnownPack, ResourcePackResult};
    use crate::proto::{Direction, ProtocolVersion};
    use crate::proxy::Proxy;
    use crate::resourcepack::ResourcePackHandler;

    fn serverbound_frame(packet: &Packet) -> PacketFrame {
        let mut buf = BytesMut::new();
        codec::put_varint(&mut buf, packet.packet_id());
        buf.extend_from_slice(&packet.encode_body());
        decode_frame(Phase::Configuration, Direction::Serverbound, buf.freeze()).unwrap()
    }

    fn unknown_frame(id: i32, body: &[u8]) -> PacketFrame {
        let mut buf = BytesMut::new();
        codec::put_varint(&mut buf, id);
        buf.extend_from_slice(body);
        decode_frame(Phase::Configuration, Direction::Serverbound, buf.freeze()).unwrap()
    }

    struct Fixture {
        player: Arc<Player>,
        handler: ClientConfigHandler,
        backend: Arc<BackendConnection>,
        backend_rx: mpsc::Receiver<Bytes>,
        client_rx: mpsc::Receiver<Bytes>,
    }

    fn fixture() -> Fixture {
        fixture_with(Proxy::new(ProxyConfig::default()))
    }

    fn fixture_with(proxy: Arc<Proxy>) -> Fixture {
        let (client, client_rx) = Connection::new(Side::Client, ProtocolVersion(767));
        client.set_reader_phase(Phase::Login).unwrap();
        client.set_reader_phase(Phase::Configuration).unwrap();
        client.set_writer_phase(Phase::Login).unwrap();
        client.set_writer_phase(Phase::Configuration).unwrap();
        let player = Player::new(proxy, client);

        let (conn, backend_rx) = Connection::new(Side::Backend, ProtocolVersion(767));
        conn.set_reader_phase(Phase::Login).unwrap();
        conn.set_reader_phase(Phase::Configuration).unwrap();
        conn.set_writer_phase(Phase::Login).unwrap();
        conn.set_writer_phase(Phase::Configuration).unwrap();
        let backend = Arc::new(BackendConnection::new(
            conn,
            "127.0.0.1:25566".parse().unwrap(),
        ));
        player.set_in_flight(Arc::clone(&backend)).unwrap();

        Fixture {
            player,
            handler: ClientConfigHandler::new(),
            backend,
            backend_rx,
            client_rx,
        }
    }

    #[tokio::test]
    async fn unknown_frame_is_forwarded_byte_identical() {
        let mut fx = fixture();
        let frame = unknown_frame(0x6e, b"\x01\x02\x03");
        assert!(!frame.known());
        let raw = frame.raw();

        fx.handler.handle_packet(&fx.player, frame);
        assert_eq!(fx.backend_rx.try_recv().unwrap(), raw);
    }

    #[tokio::test]
    async fn client_settings_are_cached_not_forwarded() {
        let mut fx = fixture();
        let settings = ClientSettings {
            locale: "en_US".into(),
            view_distance: 12,
        };
        fx.handler
            .handle_packet(&fx.player, serverbound_frame(&Packet::ClientSettings(settings.clone())));

        assert_eq!(fx.player.client_settings(), Some(settings));
        assert!(fx.backend_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn keep_alive_and_known_packs_are_relayed() {
        let mut fx = fixture();
        fx.handler
            .handle_packet(&fx.player, serverbound_frame(&Packet::KeepAlive { id: 42 }));
        fx.handler.handle_packet(
            &fx.player,
            serverbound_frame(&Packet::KnownPacks {
                packs: vec![KnownPack {
                    namespace: "core".into(),
                    id: "base".into(),
                    version: "1.0".into(),
                }],
            }),
        );
        assert!(fx.backend_rx.try_recv().is_ok());
        assert!(fx.backend_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn finish_configuration_swaps_handler_and_completes() {
        let mut fx = fixture();
        let done = fx.handler.switch_done();

        let step = fx
            .handler
            .handle_packet(&fx.player, serverbound_frame(&Packet::FinishConfiguration));
        match step {
            NextStep::SwitchTo(phase, next) => {
                assert_eq!(phase, Phase::Play);
                assert_eq!(next.phase(), Phase::Play);
            }
            NextStep::Proceed => panic!("expected a handler switch"),
        }
        assert_eq!(done.peek(), Some(Outcome::Finished));

        // A duplicate completion attempt must not overwrite the outcome.
        assert!(!done.complete(Outcome::Abandoned));
        assert_eq!(done.peek(), Some(Outcome::Finished));
    }

    #[tokio::test]
    async fn disconnect_abandons_pending_switch() {
        let mut fx = fixture();
        let done = fx.handler.switch_done();
        fx.handler.disconnected(&fx.player);
        assert_eq!(done.peek(), Some(Outcome::Abandoned));
    }

    #[tokio::test]
    async fn cookie_identity_relay_is_byte_identical() {
        let mut fx = fixture();
        let original = Packet::CookieResponse {
            key: "auth:token".into(),
            payload: Some(Bytes::from_static(b"abc")),
        };
        let frame = serverbound_frame(&original);
        let raw = frame.raw();

        fx.handler.handle_packet(&fx.player, frame);
        assert_eq!(fx.backend_rx.try_recv().unwrap(), raw);
    }

    #[tokio::test]
    async fn cookie_override_replaces_key_and_payload() {
        let proxy = Proxy::new(ProxyConfig::default());
        proxy.events.subscribe::<CookieReceiveEvent, _>(|e| {
            e.set_key("auth:rotated".into());
            e.set_payload(Bytes::from_static(b"xyz"));
        });
        let mut fx = fixture_with(proxy);

        fx.handler.handle_packet(
            &fx.player,
            serverbound_frame(&Packet::CookieResponse {
                key: "auth:token".into(),
                payload: None,
            }),
        );

        let wire = fx.backend_rx.try_recv().unwrap();
        let (id, mut body) = codec::split_frame(&wire).unwrap();
        let relayed = Packet::decode(Phase::Configuration, Direction::Serverbound, id, &mut body)
            .unwrap()
            .unwrap();
        assert_eq!(
            relayed,
            Packet::CookieResponse {
                key: "auth:rotated".into(),
                payload: Some(Bytes::from_static(b"xyz")),
            }
        );
    }

    #[tokio::test]
    async fn cookie_veto_relays_nothing() {
        let proxy = Proxy::new(ProxyConfig::default());
        proxy
            .events
            .subscribe::<CookieReceiveEvent, _>(|e| e.set_allowed(false));
        let mut fx = fixture_with(proxy);

        fx.handler.handle_packet(
            &fx.player,
            serverbound_frame(&Packet::CookieResponse {
                key: "auth:token".into(),
                payload: Some(Bytes::from_static(b"abc")),
            }),
        );
        assert!(fx.backend_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cookie_veto_does_not_taint_later_cookies() {
        let proxy = Proxy::new(ProxyConfig::default());
        proxy.events.subscribe::<CookieReceiveEvent, _>(|e| {
            if e.original_key() == "auth:revoked" {
                e.set_allowed(false);
            }
        });
        let mut fx = fixture_with(proxy);

        fx.handler.handle_packet(
            &fx.player,
            serverbound_frame(&Packet::CookieResponse {
                key: "auth:revoked".into(),
                payload: Some(Bytes::from_static(b"old")),
            }),
        );
        assert!(fx.backend_rx.try_recv().is_err());

        let follow_up = serverbound_frame(&Packet::CookieResponse {
            key: "auth:token".into(),
            payload: Some(Bytes::from_static(b"abc")),
        });
        let raw = follow_up.raw();
        fx.handler.handle_packet(&fx.player, follow_up);
        assert_eq!(fx.backend_rx.try_recv().unwrap(), raw);
    }

    struct Consuming;
    impl ResourcePackHandler for Consuming {
        fn on_response(&self, _: &ResourcePackResponseInfo) -> Result<bool, ProxyError> {
            Ok(true)
        }
    }

    struct Failing;
    impl ResourcePackHandler for Failing {
        fn on_response(&self, _: &ResourcePackResponseInfo) -> Result<bool, ProxyError> {
            Err(ProxyError::ResourcePack("boom".into()))
        }
    }

    #[tokio::test]
    async fn unconsumed_resource_pack_response_is_forwarded() {
        let mut fx = fixture();
        fx.handler.handle_packet(
            &fx.player,
            serverbound_frame(&Packet::ResourcePackResponse {
                request: 7,
                result: ResourcePackResult(0),
            }),
        );
        assert!(fx.backend_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn consumed_resource_pack_response_is_not_forwarded() {
        let proxy =
            Proxy::with_resource_pack_handler(ProxyConfig::default(), Arc::new(Consuming));
        let mut fx = fixture_with(proxy);
        fx.handler.handle_packet(
            &fx.player,
            serverbound_frame(&Packet::ResourcePackResponse {
                request: 7,
                result: ResourcePackResult(0),
            }),
        );
        assert!(fx.backend_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn resource_pack_handler_error_is_treated_as_handled() {
        let proxy = Proxy::with_resource_pack_handler(ProxyConfig::default(), Arc::new(Failing));
        let mut fx = fixture_with(proxy);
        fx.handler.handle_packet(
            &fx.player,
            serverbound_frame(&Packet::ResourcePackResponse {
                request: 7,
                result: ResourcePackResult(0),
            }),
        );
        assert!(fx.backend_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn backend_finish_announces_brand_once_and_relays_to_client() {
        let mut fx = fixture();
        fx.player.set_client_brand("quartz".into());

        let finish_wire = {
            let packet = Packet::FinishConfiguration;
            let mut buf = BytesMut::new();
            codec::put_varint(&mut buf, packet.packet_id());
            buf.extend_from_slice(&packet.encode_body());
            decode_frame(Phase::Configuration, Direction::Clientbound, buf.freeze()).unwrap()
        };

        let done = fx
            .handler
            .backend_finished_config(&fx.player, &fx.backend, &finish_wire);
        assert!(done.is_some());

        // Brand announcement reached the backend.
        let wire = fx.backend_rx.try_recv().unwrap();
        let (id, mut body) = codec::split_frame(&wire).unwrap();
        let announced = Packet::decode(Phase::Configuration, Direction::Serverbound, id, &mut body)
            .unwrap()
            .unwrap();
        assert_eq!(
            announced,
            Packet::PluginMessage {
                channel: BRAND_CHANNEL.into(),
                data: packet::write_brand("quartz"),
            }
        );

        // The finish packet reached the client and the writer moved ahead.
        assert_eq!(fx.client_rx.try_recv().unwrap(), finish_wire.raw());
        assert_eq!(fx.player.client().writer_phase(), Phase::Play);

        // A second pass on the same backend does not repeat the brand.
        fx.player.client().set_writer_phase(Phase::Configuration).unwrap();
        fx.handler
            .backend_finished_config(&fx.player, &fx.backend, &finish_wire);
        assert!(fx.backend_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn backend_finish_fails_when_client_write_fails() {
        let mut fx = fixture();
        fx.player.client().close();

        let finish_wire = {
            let packet = Packet::FinishConfiguration;
            let mut buf = BytesMut::new();
            codec::put_varint(&mut buf, packet.packet_id());
            buf.extend_from_slice(&packet.encode_body());
            decode_frame(Phase::Configuration, Direction::Clientbound, buf.freeze()).unwrap()
        };
        let done = fx
            .handler
            .backend_finished_config(&fx.player, &fx.backend, &finish_wire);
        assert!(done.is_none());
    }
}
