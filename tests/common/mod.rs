//! Shared utilities for integration testing: a mock game backend and a
//! scripted game client, both speaking the real wire protocol.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use packet_proxy::config::schema::BackendConfig;
use packet_proxy::config::ProxyConfig;
use packet_proxy::net::listener::Listener;
use packet_proxy::proto::codec;
use packet_proxy::proto::packet::Packet;
use packet_proxy::proto::phase::Phase;
use packet_proxy::proto::Direction;
use packet_proxy::proxy::Proxy;
use packet_proxy::session;

/// Write one packet to a raw test socket.
pub async fn send(stream: &mut TcpStream, packet: &Packet) {
    let wire = codec::encode_frame(packet.packet_id(), &packet.encode_body());
    stream.write_all(&wire).await.unwrap();
}

/// Write a raw frame (id + body) to a raw test socket.
#[allow(dead_code)]
pub async fn send_raw(stream: &mut TcpStream, packet_id: i32, body: &[u8]) {
    let wire = codec::encode_frame(packet_id, body);
    stream.write_all(&wire).await.unwrap();
}

/// Read the next frame and decode it against `phase`/`direction`. Returns
/// the raw id and body alongside the typed decode.
pub async fn recv(
    stream: &mut TcpStream,
    phase: Phase,
    direction: Direction,
) -> Option<(i32, Bytes, Option<Packet>)> {
    let body = codec::read_frame(stream).await.unwrap()?;
    let mut buf = body.clone();
    let packet_id = codec::get_varint(&mut buf).unwrap();
    let mut work = buf.clone();
    let packet = Packet::decode(phase, direction, packet_id, &mut work).unwrap();
    Some((packet_id, buf, packet))
}

/// Read frames until one decodes to the expected shape, skipping others.
pub async fn recv_until(
    stream: &mut TcpStream,
    phase: Phase,
    direction: Direction,
    want: impl Fn(&Packet) -> bool,
) -> Packet {
    loop {
        let (_, _, packet) = recv(stream, phase, direction)
            .await
            .expect("stream closed while waiting for a packet");
        if let Some(packet) = packet {
            if want(&packet) {
                return packet;
            }
        }
    }
}

/// Start a mock game backend: performs the server side of login and
/// configuration, then echoes every play-phase frame back to its sender.
///
/// Returns the bound address.
pub async fn start_mock_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        run_mock_backend(&mut socket).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

async fn run_mock_backend(socket: &mut TcpStream) {
    // Handshake + login start from the proxy.
    let Some((_, _, handshake)) = recv(socket, Phase::Handshake, Direction::Serverbound).await
    else {
        return;
    };
    assert!(matches!(handshake, Some(Packet::Handshake { .. })));
    let Some((_, _, login)) = recv(socket, Phase::Login, Direction::Serverbound).await else {
        return;
    };
    let username = match login {
        Some(Packet::LoginStart { username }) => username,
        other => panic!("expected login start, got {:?}", other),
    };

    send(
        socket,
        &Packet::LoginSuccess {
            id: uuid::Uuid::new_v4(),
            username,
        },
    )
    .await;

    // Login acknowledged, then configuration-phase traffic until we decide
    // the client is ready.
    let Some((_, _, ack)) = recv(socket, Phase::Login, Direction::Serverbound).await else {
        return;
    };
    assert!(matches!(ack, Some(Packet::LoginAcknowledged)));

    send(socket, &Packet::FinishConfiguration).await;

    // Absorb configuration traffic (replayed settings, brand, the finish
    // ack) until the finish ack arrives.
    loop {
        let Some((_, _, packet)) = recv(socket, Phase::Configuration, Direction::Serverbound).await
        else {
            return;
        };
        if matches!(packet, Some(Packet::FinishConfiguration)) {
            break;
        }
    }

    // Play phase: echo frames back.
    loop {
        let Some(body) = codec::read_frame(socket).await.ok().flatten() else {
            return;
        };
        let mut buf = body.clone();
        let packet_id = codec::get_varint(&mut buf).unwrap();
        let wire = codec::encode_frame(packet_id, &buf);
        if socket.write_all(&wire).await.is_err() {
            return;
        }
    }
}

/// Start a proxy instance wired to the given backends. Returns its client
/// address and the shared proxy state, so tests can attach policy.
pub async fn start_proxy(
    backends: &[SocketAddr],
    registered_channels: &[&str],
) -> (SocketAddr, Arc<Proxy>) {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.listener.max_connections = 64;
    config.timeouts.connect_secs = 2;
    for addr in backends {
        config.backends.push(BackendConfig {
            address: addr.to_string(),
        });
    }
    for channel in registered_channels {
        config.channels.registered.push((*channel).to_string());
    }

    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let proxy = Proxy::new(config);

    let accept_proxy = Arc::clone(&proxy);
    tokio::spawn(async move {
        let proxy = accept_proxy;
        loop {
            match listener.accept().await {
                Ok((stream, _, permit)) => {
                    let proxy = Arc::clone(&proxy);
                    tokio::spawn(async move {
                        session::run_client(proxy, stream).await;
                        drop(permit);
                    });
                }
                Err(_) => break,
            }
        }
    });
    (addr, proxy)
}

/// Walk a raw client socket through handshake and login against the proxy.
pub async fn login_client(addr: SocketAddr, username: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    send(
        &mut stream,
        &Packet::Handshake {
            protocol: packet_proxy::proto::ProtocolVersion(767),
            hostname: "proxy.test".into(),
            port: addr.port(),
            next: Phase::Login,
        },
    )
    .await;
    send(
        &mut stream,
        &Packet::LoginStart {
            username: username.into(),
        },
    )
    .await;

    let success = recv_until(&mut stream, Phase::Login, Direction::Clientbound, |p| {
        matches!(p, Packet::LoginSuccess { .. })
    })
    .await;
    match success {
        Packet::LoginSuccess { username: echoed, .. } => assert_eq!(echoed, username),
        _ => unreachable!(),
    }

    send(&mut stream, &Packet::LoginAcknowledged).await;
    stream
}
