//! Framing for the status handshake: length-prefixed packets built from
//! LEB128-style VarInts.
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::PollError;

/// Protocol number sent in the handshake; `-1` asks for status only.
pub const HANDSHAKE_PROTOCOL_VERSION: i32 = -1;
const NEXT_STATE_STATUS: i32 = 1;
const HANDSHAKE_PACKET_ID: i32 = 0x00;
pub const STATUS_PACKET_ID: i32 = 0x00;
pub const PING_PACKET_ID: i32 = 0x01;

const VARINT_MAX_BYTES: usize = 5;
/// Favicons inflate responses; anything past this is treated as garbage.
pub const MAX_PACKET_LEN: usize = 2 * 1024 * 1024;

pub fn put_varint(buf: &mut BytesMut, value: i32) {
    let mut value = value as u32;
    loop {
        if value & !0x7F == 0 {
            buf.put_u8(value as u8);
            return;
        }
        buf.put_u8((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
}

pub fn get_varint(buf: &mut impl Buf) -> Result<i32, PollError> {
    let mut value: u32 = 0;
    for i in 0..VARINT_MAX_BYTES {
        if !buf.has_remaining() {
            return Err(PollError::ProtocolError("truncated VarInt".to_string()));
        }
        let byte = buf.get_u8();
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(PollError::ProtocolError("VarInt is too long".to_string()))
}

pub async fn read_varint<R: AsyncRead + Unpin>(reader: &mut R) -> Result<i32, PollError> {
    let mut value: u32 = 0;
    for i in 0..VARINT_MAX_BYTES {
        let byte = reader.read_u8().await?;
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(PollError::ProtocolError("VarInt is too long".to_string()))
}

fn put_string(buf: &mut BytesMut, value: &str) {
    put_varint(buf, value.len() as i32);
    buf.put_slice(value.as_bytes());
}

pub fn get_string(buf: &mut impl Buf) -> Result<String, PollError> {
    let len = get_varint(buf)?;
    let len = usize::try_from(len)
        .map_err(|_| PollError::ProtocolError(format!("negative string length {len}")))?;
    if buf.remaining() < len {
        return Err(PollError::ProtocolError(format!(
            "string length {len} exceeds packet ({} bytes left)",
            buf.remaining()
        )));
    }
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec())
        .map_err(|e| PollError::ProtocolError(format!("string is not UTF-8: {e}")))
}

fn frame(packet_id: i32, body: &[u8]) -> Bytes {
    let mut payload = BytesMut::with_capacity(body.len() + VARINT_MAX_BYTES);
    put_varint(&mut payload, packet_id);
    payload.put_slice(body);

    let mut framed = BytesMut::with_capacity(payload.len() + VARINT_MAX_BYTES);
    put_varint(&mut framed, payload.len() as i32);
    framed.put_slice(&payload);
    framed.freeze()
}

pub fn handshake_packet(host: &str, port: u16) -> Bytes {
    let mut body = BytesMut::new();
    put_varint(&mut body, HANDSHAKE_PROTOCOL_VERSION);
    put_string(&mut body, host);
    body.put_u16(port);
    put_varint(&mut body, NEXT_STATE_STATUS);
    frame(HANDSHAKE_PACKET_ID, &body)
}

pub fn status_request_packet() -> Bytes {
    frame(STATUS_PACKET_ID, &[])
}

pub fn ping_packet(payload: i64) -> Bytes {
    frame(PING_PACKET_ID, &payload.to_be_bytes())
}

/// Builds a status response frame; the counterpart of what services send.
pub fn status_response_packet(json: &str) -> Bytes {
    let mut body = BytesMut::new();
    put_string(&mut body, json);
    frame(STATUS_PACKET_ID, &body)
}

/// Reads one frame, returning its packet id and remaining body.
pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<(i32, Bytes), PollError> {
    let len = read_varint(reader).await?;
    let len = usize::try_from(len)
        .ok()
        .filter(|len| (1..=MAX_PACKET_LEN).contains(len))
        .ok_or_else(|| PollError::ProtocolError(format!("invalid packet length {len}")))?;

    let mut raw = vec![0u8; len];
    reader.read_exact(&mut raw).await?;
    let mut body = Bytes::from(raw);
    let packet_id = get_varint(&mut body)?;
    Ok((packet_id, body))
}
