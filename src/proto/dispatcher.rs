//! Frame-to-packet dispatch against a connection's current phase.

use bytes::Bytes;

use crate::error::CodecError;
use crate::proto::codec;
use crate::proto::packet::Packet;
use crate::proto::phase::Phase;
use crate::proto::Direction;

/// One inbound protocol unit: the raw frame plus, when the id is legal in
/// the phase it arrived in, its decoded shape.
///
/// `packet == None` means "kind unrecognized in current phase". That is the
/// pass-through case: default handler arms forward `raw()` verbatim, never
/// drop it.
#[derive(Debug, Clone)]
pub struct PacketFrame {
    pub packet_id: i32,
    pub body: Bytes,
    pub packet: Option<Packet>,
}

impl PacketFrame {
    /// Whether the frame decoded to a recognized packet.
    pub fn known(&self) -> bool {
        self.packet.is_some()
    }

    /// Re-assemble the byte-identical wire frame for verbatim forwarding.
    pub fn raw(&self) -> Bytes {
        codec::encode_frame(self.packet_id, &self.body)
    }
}

/// Decode the next frame body (id varint + payload) for a connection in
/// `phase`, flowing in `direction`.
///
/// A malformed body on a *recognized* id is a protocol violation and errors;
/// an unrecognized id is by contract never inspected.
pub fn decode_frame(
    phase: Phase,
    direction: Direction,
    mut frame_body: Bytes,
) -> Result<PacketFrame, CodecError> {
    let packet_id = codec::get_varint(&mut frame_body)?;
    let body = frame_body;
    let mut work = body.clone();
    let packet = Packet::decode(phase, direction, packet_id, &mut work)?;
    Ok(PacketFrame {
        packet_id,
        body,
        packet,
    })
}
