//! Typed packet shapes and their per-phase id tables.
//!
//! Only the packet kinds the routing layer interprets are modeled here.
//! Everything else stays an undecoded frame and is relayed verbatim by the
//! session layer, which is what keeps unknown packet kinds flowing across
//! protocol updates.

use bytes::{Buf, Bytes, BytesMut};
use uuid::Uuid;

use crate::error::CodecError;
use crate::proto::codec;
use crate::proto::phase::Phase;
use crate::proto::Direction;
use crate::proto::ProtocolVersion;

/// Well-known channel carrying the client's self-identification string.
pub const BRAND_CHANNEL: &str = "game:brand";

/// Reserved vendor-compatibility namespace. Messages here carry proxy-only
/// semantics and are never forwarded.
pub const LEGACY_CHANNEL_PREFIX: &str = "compat:";

/// Whether a plugin channel belongs to the legacy-compat namespace.
pub fn is_legacy_channel(channel: &str) -> bool {
    channel.starts_with(LEGACY_CHANNEL_PREFIX)
}

/// Client display/input settings cached on the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub locale: String,
    pub view_distance: u8,
}

/// A declared content pack: namespace, id, version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownPack {
    pub namespace: String,
    pub id: String,
    pub version: String,
}

/// Outcome code reported by a resource-pack response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourcePackResult(pub u8);

/// Decoded packet shapes recognized by the routing layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    // Handshake
    Handshake {
        protocol: ProtocolVersion,
        hostname: String,
        port: u16,
        next: Phase,
    },

    // Status
    StatusRequest,
    StatusResponse { payload: String },
    StatusPing { nonce: i64 },
    StatusPong { nonce: i64 },

    // Login
    LoginStart { username: String },
    LoginSuccess { id: Uuid, username: String },
    LoginAcknowledged,
    Disconnect { reason: String },

    // Configuration / Play
    ClientSettings(ClientSettings),
    CookieResponse { key: String, payload: Option<Bytes> },
    PluginMessage { channel: String, data: Bytes },
    FinishConfiguration,
    KeepAlive { id: u64 },
    PingIdentify { id: i32 },
    ResourcePackResponse { request: u64, result: ResourcePackResult },
    KnownPacks { packs: Vec<KnownPack> },

    // Play-phase backend switch flow
    StartConfiguration,
    ConfigurationAck,
}

mod id {
    pub const HANDSHAKE: i32 = 0x00;
    pub const STATUS_REQUEST: i32 = 0x00;
    pub const STATUS_RESPONSE: i32 = 0x00;
    pub const STATUS_PING: i32 = 0x01;
    pub const STATUS_PONG: i32 = 0x01;
    pub const LOGIN_START: i32 = 0x00;
    pub const DISCONNECT: i32 = 0x01;
    pub const LOGIN_SUCCESS: i32 = 0x02;
    pub const LOGIN_ACKNOWLEDGED: i32 = 0x03;
    pub const CLIENT_SETTINGS: i32 = 0x00;
    pub const COOKIE_RESPONSE: i32 = 0x01;
    pub const PLUGIN_MESSAGE: i32 = 0x02;
    pub const FINISH_CONFIGURATION: i32 = 0x03;
    pub const KEEP_ALIVE: i32 = 0x04;
    pub const PING_IDENTIFY: i32 = 0x05;
    pub const RESOURCE_PACK_RESPONSE: i32 = 0x06;
    pub const KNOWN_PACKS: i32 = 0x07;
    pub const CONFIGURATION_ACK: i32 = 0x0b;
    pub const START_CONFIGURATION: i32 = 0x0e;
}

impl Packet {
    /// The id this packet is written with. Ids are only unique within a
    /// (phase, direction) pair; decode disambiguates through the tables in
    /// [`Packet::decode`].
    pub fn packet_id(&self) -> i32 {
        match self {
            Packet::Handshake { .. } => id::HANDSHAKE,
            Packet::StatusRequest => id::STATUS_REQUEST,
            Packet::StatusResponse { .. } => id::STATUS_RESPONSE,
            Packet::StatusPing { .. } => id::STATUS_PING,
            Packet::StatusPong { .. } => id::STATUS_PONG,
            Packet::LoginStart { .. } => id::LOGIN_START,
            Packet::LoginSuccess { .. } => id::LOGIN_SUCCESS,
            Packet::LoginAcknowledged => id::LOGIN_ACKNOWLEDGED,
            Packet::Disconnect { .. } => id::DISCONNECT,
            Packet::ClientSettings(_) => id::CLIENT_SETTINGS,
            Packet::CookieResponse { .. } => id::COOKIE_RESPONSE,
            Packet::PluginMessage { .. } => id::PLUGIN_MESSAGE,
            Packet::FinishConfiguration => id::FINISH_CONFIGURATION,
            Packet::KeepAlive { .. } => id::KEEP_ALIVE,
            Packet::PingIdentify { .. } => id::PING_IDENTIFY,
            Packet::ResourcePackResponse { .. } => id::RESOURCE_PACK_RESPONSE,
            Packet::KnownPacks { .. } => id::KNOWN_PACKS,
            Packet::StartConfiguration => id::START_CONFIGURATION,
            Packet::ConfigurationAck => id::CONFIGURATION_ACK,
        }
    }

    /// Serialize the packet body (no id, no length prefix).
    pub fn encode_body(&self) -> Bytes {
        let mut buf = BytesMut::new();
        match self {
            Packet::Handshake {
                protocol,
                hostname,
                port,
                next,
            } => {
                codec::put_varint(&mut buf, protocol.0);
                codec::put_string(&mut buf, hostname);
                buf.extend_from_slice(&port.to_be_bytes());
                let next = match next {
                    Phase::Status => 1,
                    _ => 2,
                };
                codec::put_varint(&mut buf, next);
            }
            Packet::StatusRequest
            | Packet::LoginAcknowledged
            | Packet::FinishConfiguration
            | Packet::StartConfiguration
            | Packet::ConfigurationAck => {}
            Packet::StatusResponse { payload } => codec::put_string(&mut buf, payload),
            Packet::StatusPing { nonce } | Packet::StatusPong { nonce } => {
                buf.extend_from_slice(&nonce.to_be_bytes());
            }
            Packet::LoginStart { username } => codec::put_string(&mut buf, username),
            Packet::LoginSuccess { id, username } => {
                buf.extend_from_slice(id.as_bytes());
                codec::put_string(&mut buf, username);
            }
            Packet::Disconnect { reason } => codec::put_string(&mut buf, reason),
            Packet::ClientSettings(settings) => {
                codec::put_string(&mut buf, &settings.locale);
                buf.extend_from_slice(&[settings.view_distance]);
            }
            Packet::CookieResponse { key, payload } => {
                codec::put_string(&mut buf, key);
                match payload {
                    Some(data) => {
                        buf.extend_from_slice(&[1]);
                        codec::put_varint(&mut buf, data.len() as i32);
                        buf.extend_from_slice(data);
                    }
                    None => buf.extend_from_slice(&[0]),
                }
            }
            Packet::PluginMessage { channel, data } => {
                codec::put_string(&mut buf, channel);
                buf.extend_from_slice(data);
            }
            Packet::KeepAlive { id } => buf.extend_from_slice(&id.to_be_bytes()),
            Packet::PingIdentify { id } => codec::put_varint(&mut buf, *id),
            Packet::ResourcePackResponse { request, result } => {
                buf.extend_from_slice(&request.to_be_bytes());
                buf.extend_from_slice(&[result.0]);
            }
            Packet::KnownPacks { packs } => {
                codec::put_varint(&mut buf, packs.len() as i32);
                for pack in packs {
                    codec::put_string(&mut buf, &pack.namespace);
                    codec::put_string(&mut buf, &pack.id);
                    codec::put_string(&mut buf, &pack.version);
                }
            }
        }
        buf.freeze()
    }

    /// Decode a packet body against the phase/direction id table.
    ///
    /// Returns `Ok(None)` for ids that are not recognized in this phase:
    /// that is not an error, the frame passes through undecoded.
    pub fn decode(
        phase: Phase,
        direction: Direction,
        packet_id: i32,
        body: &mut Bytes,
    ) -> Result<Option<Packet>, CodecError> {
        use Direction::*;
        let packet = match (phase, direction, packet_id) {
            (Phase::Handshake, Serverbound, id::HANDSHAKE) => {
                let protocol = ProtocolVersion(codec::get_varint(body)?);
                let hostname = codec::get_string(body)?;
                let port = get_u16(body)?;
                let next = match codec::get_varint(body)? {
                    1 => Phase::Status,
                    _ => Phase::Login,
                };
                Packet::Handshake {
                    protocol,
                    hostname,
                    port,
                    next,
                }
            }
            (Phase::Status, Serverbound, id::STATUS_REQUEST) => Packet::StatusRequest,
            (Phase::Status, Serverbound, id::STATUS_PING) => Packet::StatusPing {
                nonce: get_i64(body)?,
            },
            (Phase::Status, Clientbound, id::STATUS_RESPONSE) => Packet::StatusResponse {
                payload: codec::get_string(body)?,
            },
            (Phase::Status, Clientbound, id::STATUS_PONG) => Packet::StatusPong {
                nonce: get_i64(body)?,
            },
            (Phase::Login, Serverbound, id::LOGIN_START) => Packet::LoginStart {
                username: codec::get_string(body)?,
            },
            (Phase::Login, Serverbound, id::LOGIN_ACKNOWLEDGED) => Packet::LoginAcknowledged,
            (Phase::Login, Clientbound, id::LOGIN_SUCCESS) => {
                let raw = codec::get_bytes(body, 16)?;
                let mut id_bytes = [0u8; 16];
                id_bytes.copy_from_slice(&raw);
                Packet::LoginSuccess {
                    id: Uuid::from_bytes(id_bytes),
                    username: codec::get_string(body)?,
                }
            }
            (Phase::Login, Clientbound, id::DISCONNECT)
            | (Phase::Configuration, Clientbound, id::DISCONNECT) => Packet::Disconnect {
                reason: codec::get_string(body)?,
            },
            (Phase::Configuration, Serverbound, id::CLIENT_SETTINGS) => {
                Packet::ClientSettings(ClientSettings {
                    locale: codec::get_string(body)?,
                    view_distance: get_u8(body)?,
                })
            }
            (Phase::Configuration, Serverbound, id::COOKIE_RESPONSE) => {
                let key = codec::get_string(body)?;
                let payload = match get_u8(body)? {
                    0 => None,
                    _ => {
                        let len = codec::get_varint(body)? as usize;
                        Some(codec::get_bytes(body, len)?)
                    }
                };
                Packet::CookieResponse { key, payload }
            }
            (Phase::Configuration, _, id::PLUGIN_MESSAGE)
            | (Phase::Play, _, id::PLUGIN_MESSAGE) => Packet::PluginMessage {
                channel: codec::get_string(body)?,
                data: body.split_to(body.len()),
            },
            (Phase::Configuration, _, id::FINISH_CONFIGURATION) => Packet::FinishConfiguration,
            (Phase::Configuration, _, id::KEEP_ALIVE) | (Phase::Play, _, id::KEEP_ALIVE) => {
                Packet::KeepAlive { id: get_u64(body)? }
            }
            (Phase::Configuration, Serverbound, id::PING_IDENTIFY) => Packet::PingIdentify {
                id: codec::get_varint(body)?,
            },
            (Phase::Configuration, Serverbound, id::RESOURCE_PACK_RESPONSE) => {
                Packet::ResourcePackResponse {
                    request: get_u64(body)?,
                    result: ResourcePackResult(get_u8(body)?),
                }
            }
            (Phase::Configuration, _, id::KNOWN_PACKS) => {
                let count = codec::get_varint(body)? as usize;
                let mut packs = Vec::with_capacity(count.min(64));
                for _ in 0..count {
                    packs.push(KnownPack {
                        namespace: codec::get_string(body)?,
                        id: codec::get_string(body)?,
                        version: codec::get_string(body)?,
                    });
                }
                Packet::KnownPacks { packs }
            }
            (Phase::Play, Clientbound, id::START_CONFIGURATION) => Packet::StartConfiguration,
            // The ack also shows up with the reader already re-entered into
            // configuration when the proxy initiated the switch.
            (Phase::Play, Serverbound, id::CONFIGURATION_ACK)
            | (Phase::Configuration, Serverbound, id::CONFIGURATION_ACK) => {
                Packet::ConfigurationAck
            }
            _ => return Ok(None),
        };
        Ok(Some(packet))
    }
}

/// Read a brand announcement payload: a length-prefixed string, falling back
/// to the raw bytes for clients that send it unprefixed.
pub fn read_brand(data: &Bytes) -> String {
    let mut buf = data.clone();
    match codec::get_string(&mut buf) {
        Ok(brand) if !buf.has_remaining() => brand,
        _ => String::from_utf8_lossy(data).into_owned(),
    }
}

/// Build a brand announcement payload.
pub fn write_brand(brand: &str) -> Bytes {
    let mut buf = BytesMut::new();
    codec::put_string(&mut buf, brand);
    buf.freeze()
}

fn get_u8(body: &mut Bytes) -> Result<u8, CodecError> {
    if !body.has_remaining() {
        return Err(CodecError::Truncated);
    }
    Ok(body.get_u8())
}

fn get_u16(body: &mut Bytes) -> Result<u16, CodecError> {
    if body.remaining() < 2 {
        return Err(CodecError::Truncated);
    }
    Ok(body.get_u16())
}

fn get_u64(body: &mut Bytes) -> Result<u64, CodecError> {
    if body.remaining() < 8 {
        return Err(CodecError::Truncated);
    }
    Ok(body.get_u64())
}

fn get_i64(body: &mut Bytes) -> Result<i64, CodecError> {
    if body.remaining() < 8 {
        return Err(CodecError::Truncated);
    }
    Ok(body.get_i64())
}
