//! Wire primitives: varints, length-prefixed strings, and frame framing.
//!
//! Every frame on the wire is `varint(total length) | varint(packet id) |
//! body`. The helpers here operate on [`bytes`] buffers so decode slices
//! never copy the body.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::CodecError;

/// Hard cap on a single frame; anything larger is a protocol violation.
pub const MAX_FRAME_LEN: usize = 2 * 1024 * 1024;

/// Hard cap on a single string field.
pub const MAX_STRING_LEN: usize = 32_767;

/// Read a protocol varint (LEB128, at most 5 bytes) from a buffer.
pub fn get_varint(buf: &mut impl Buf) -> Result<i32, CodecError> {
    let mut value: u32 = 0;
    for i in 0..5 {
        if !buf.has_remaining() {
            return Err(CodecError::Truncated);
        }
        let byte = buf.get_u8();
        value |= u32::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(CodecError::VarIntTooLong)
}

/// Write a protocol varint.
pub fn put_varint(buf: &mut impl BufMut, value: i32) {
    let mut v = value as u32;
    loop {
        if v & !0x7f == 0 {
            buf.put_u8(v as u8);
            return;
        }
        buf.put_u8((v as u8 & 0x7f) | 0x80);
        v >>= 7;
    }
}

/// Number of bytes `put_varint` will emit for `value`.
pub fn varint_len(value: i32) -> usize {
    let v = value as u32;
    match v {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        0x4000..=0x1f_ffff => 3,
        0x20_0000..=0xfff_ffff => 4,
        _ => 5,
    }
}

/// Read a varint-length-prefixed UTF-8 string.
pub fn get_string(buf: &mut Bytes) -> Result<String, CodecError> {
    let len = get_varint(buf)? as usize;
    if len > MAX_STRING_LEN {
        return Err(CodecError::StringTooLarge(len, MAX_STRING_LEN));
    }
    if buf.remaining() < len {
        return Err(CodecError::Truncated);
    }
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8)
}

/// Write a varint-length-prefixed UTF-8 string.
pub fn put_string(buf: &mut impl BufMut, s: &str) {
    put_varint(buf, s.len() as i32);
    buf.put_slice(s.as_bytes());
}

/// Read a fixed-size byte run.
pub fn get_bytes(buf: &mut Bytes, len: usize) -> Result<Bytes, CodecError> {
    if buf.remaining() < len {
        return Err(CodecError::Truncated);
    }
    Ok(buf.split_to(len))
}

/// Assemble a complete wire frame (length prefix included) for a packet id
/// and body.
pub fn encode_frame(packet_id: i32, body: &[u8]) -> Bytes {
    let inner_len = varint_len(packet_id) + body.len();
    let mut frame = BytesMut::with_capacity(varint_len(inner_len as i32) + inner_len);
    put_varint(&mut frame, inner_len as i32);
    put_varint(&mut frame, packet_id);
    frame.put_slice(body);
    frame.freeze()
}

/// Read the next frame body (packet id + payload, length prefix stripped)
/// from an async stream. Returns `None` on a clean EOF at a frame boundary.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Bytes>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let len = match read_varint_async(reader).await? {
        Some(len) => len as usize,
        None => return Ok(None),
    };
    if len > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(len, MAX_FRAME_LEN));
    }
    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|_| CodecError::Truncated)?;
    Ok(Some(Bytes::from(body)))
}

async fn read_varint_async<R>(reader: &mut R) -> Result<Option<i32>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut value: u32 = 0;
    for i in 0..5 {
        let byte = match reader.read_u8().await {
            Ok(byte) => byte,
            // EOF before the first byte is a clean close; mid-varint is not.
            Err(_) if i == 0 => return Ok(None),
            Err(_) => return Err(CodecError::Truncated),
        };
        value |= u32::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some(value as i32));
        }
    }
    Err(CodecError::VarIntTooLong)
}

/// Split a full wire frame back into `(packet id, body)`. Test helper and
/// relay-side inspection point.
pub fn split_frame(frame: &Bytes) -> Result<(i32, Bytes), CodecError> {
    let mut buf = frame.clone();
    let len = get_varint(&mut buf)? as usize;
    if buf.remaining() < len {
        return Err(CodecError::Truncated);
    }
    let mut inner = buf.split_to(len);
    let id = get_varint(&mut inner)?;
    Ok((id, inner))
}
