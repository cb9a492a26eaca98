//! MQTT 3.1.1 wire codec (the subset this controller speaks).
//!
//! Packet layout:
//! ```text
//! ┌──────────────┬────────────────────────┬──────────────────────────┐
//! │ type | flags │ remaining length (1–4B)│ variable header + payload│
//! │ 1 byte       │ 7 bits/byte, 0x80=more │ remaining-length bytes   │
//! └──────────────┴────────────────────────┴──────────────────────────┘
//! ```
//!
//! Strings are a big-endian u16 length followed by UTF-8 bytes.
//!
//! [`StreamDecoder`] accumulates bytes from the socket and yields complete
//! frames.  A single read may carry part of a fixed header, part of a
//! body, or several packets back to back; residual bytes always stay
//! buffered for the next frame.

use crate::error::ProtocolError;

/// Largest value the four-byte remaining-length field can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Receive-side reassembly buffer size.  A single inbound packet larger
/// than this is a framing error.
pub const RX_BUFFER_CAPACITY: usize = 8192;

// ---------------------------------------------------------------------------
// Packet types (high nibble of the fixed header)
// ---------------------------------------------------------------------------

pub const CONNECT: u8 = 0x10;
pub const CONNACK: u8 = 0x20;
pub const PUBLISH: u8 = 0x30;
pub const PUBACK: u8 = 0x40;
pub const SUBSCRIBE: u8 = 0x80;
pub const SUBACK: u8 = 0x90;
pub const PINGREQ: u8 = 0xC0;
pub const PINGRESP: u8 = 0xD0;
pub const DISCONNECT: u8 = 0xE0;

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 0x04;

// CONNECT flag bits
const FLAG_CLEAN_SESSION: u8 = 0x02;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_USERNAME: u8 = 0x80;

// PUBLISH flag bits
const FLAG_RETAIN: u8 = 0x01;
const QOS_SHIFT: u8 = 1;

/// Delivery guarantee of a PUBLISH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
}

impl QoS {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::AtMostOnce),
            1 => Some(Self::AtLeastOnce),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Primitive encoders / decoders
// ---------------------------------------------------------------------------

/// Append the variable-length encoding of `len` to `out`.
pub fn encode_remaining_length(len: usize, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    if len > MAX_REMAINING_LENGTH {
        return Err(ProtocolError::PacketTooLarge);
    }
    let mut value = len;
    loop {
        let mut byte = (value % 128) as u8;
        value /= 128;
        if value > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            return Ok(());
        }
    }
}

/// Decode a remaining-length field from the start of `buf`.
///
/// Returns `Ok(None)` if more bytes are needed, `Ok(Some((value, used)))`
/// once complete, and an error if the field runs past four bytes.
pub fn decode_remaining_length(buf: &[u8]) -> Result<Option<(usize, usize)>, ProtocolError> {
    let mut value = 0usize;
    let mut multiplier = 1usize;
    for (i, &byte) in buf.iter().enumerate() {
        if i == 4 {
            return Err(ProtocolError::MalformedLength);
        }
        value += (byte & 0x7F) as usize * multiplier;
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
        multiplier *= 128;
    }
    if buf.len() >= 4 {
        return Err(ProtocolError::MalformedLength);
    }
    Ok(None)
}

/// Append a length-prefixed UTF-8 string.
pub fn encode_string(s: &str, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    let len = u16::try_from(s.len()).map_err(|_| ProtocolError::StringTooLong)?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Read a length-prefixed UTF-8 string at `*offset`, advancing it.
pub fn decode_string<'a>(buf: &'a [u8], offset: &mut usize) -> Result<&'a str, ProtocolError> {
    let len = read_u16(buf, offset)? as usize;
    let end = offset.checked_add(len).ok_or(ProtocolError::InvalidString)?;
    let bytes = buf.get(*offset..end).ok_or(ProtocolError::InvalidString)?;
    let s = core::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidString)?;
    *offset = end;
    Ok(s)
}

fn read_u16(buf: &[u8], offset: &mut usize) -> Result<u16, ProtocolError> {
    match buf.get(*offset..*offset + 2) {
        Some(&[hi, lo]) => {
            *offset += 2;
            Ok(u16::from_be_bytes([hi, lo]))
        }
        _ => Err(ProtocolError::InvalidString),
    }
}

/// Prefix `body` with a fixed header.
fn finish(header: u8, body: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::with_capacity(body.len() + 5);
    out.push(header);
    encode_remaining_length(body.len(), &mut out)?;
    out.extend_from_slice(body);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Outbound packet builders
// ---------------------------------------------------------------------------

/// Fields of a CONNECT packet.  Clean session is always requested.
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions<'a> {
    pub client_id: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub keep_alive_secs: u16,
}

pub fn build_connect(opts: &ConnectOptions<'_>) -> Result<Vec<u8>, ProtocolError> {
    let mut flags = FLAG_CLEAN_SESSION;
    if !opts.username.is_empty() {
        flags |= FLAG_USERNAME;
    }
    if !opts.password.is_empty() {
        flags |= FLAG_PASSWORD;
    }

    let mut body = Vec::with_capacity(
        12 + opts.client_id.len() + opts.username.len() + opts.password.len(),
    );
    encode_string(PROTOCOL_NAME, &mut body)?;
    body.push(PROTOCOL_LEVEL);
    body.push(flags);
    body.extend_from_slice(&opts.keep_alive_secs.to_be_bytes());

    encode_string(opts.client_id, &mut body)?;
    if !opts.username.is_empty() {
        encode_string(opts.username, &mut body)?;
    }
    if !opts.password.is_empty() {
        encode_string(opts.password, &mut body)?;
    }
    finish(CONNECT, &body)
}

/// PUBLISH with DUP always clear.  `packet_id` is only written for QoS 1.
pub fn build_publish(
    topic: &str,
    payload: &[u8],
    qos: QoS,
    packet_id: u16,
    retain: bool,
) -> Result<Vec<u8>, ProtocolError> {
    let mut header = PUBLISH | ((qos as u8) << QOS_SHIFT);
    if retain {
        header |= FLAG_RETAIN;
    }

    let mut body = Vec::with_capacity(topic.len() + payload.len() + 4);
    encode_string(topic, &mut body)?;
    if qos != QoS::AtMostOnce {
        body.extend_from_slice(&packet_id.to_be_bytes());
    }
    body.extend_from_slice(payload);
    finish(header, &body)
}

pub fn build_puback(packet_id: u16) -> [u8; 4] {
    let [hi, lo] = packet_id.to_be_bytes();
    [PUBACK, 0x02, hi, lo]
}

/// SUBSCRIBE for a single topic filter (fixed header 0x82).
pub fn build_subscribe(packet_id: u16, topic: &str, qos: QoS) -> Result<Vec<u8>, ProtocolError> {
    let mut body = Vec::with_capacity(topic.len() + 5);
    body.extend_from_slice(&packet_id.to_be_bytes());
    encode_string(topic, &mut body)?;
    body.push(qos as u8);
    finish(SUBSCRIBE | 0x02, &body)
}

pub const fn build_pingreq() -> [u8; 2] {
    [PINGREQ, 0x00]
}

pub const fn build_disconnect() -> [u8; 2] {
    [DISCONNECT, 0x00]
}

// ---------------------------------------------------------------------------
// Inbound packets
// ---------------------------------------------------------------------------

/// One complete packet as cut from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Fixed-header byte (type | flags).
    pub header: u8,
    /// Variable header + payload.
    pub body: Vec<u8>,
}

impl Frame {
    pub fn packet_type(&self) -> u8 {
        self.header & 0xF0
    }
}

/// Decoded inbound packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    ConnAck {
        session_present: bool,
        return_code: u8,
    },
    Publish {
        topic: String,
        qos: QoS,
        packet_id: Option<u16>,
        payload: Vec<u8>,
    },
    PubAck {
        packet_id: u16,
    },
    SubAck {
        packet_id: u16,
        granted_qos: Vec<u8>,
    },
    PingResp,
    /// Any type this client does not handle.
    Other {
        packet_type: u8,
    },
}

impl Packet {
    pub fn parse(frame: &Frame) -> Result<Self, ProtocolError> {
        let kind = frame.packet_type();
        let body = frame.body.as_slice();
        let short = ProtocolError::ShortPacket(kind);

        match kind {
            CONNACK => match body {
                [flags, code, ..] => Ok(Self::ConnAck {
                    session_present: flags & 0x01 != 0,
                    return_code: *code,
                }),
                _ => Err(short),
            },
            PUBLISH => {
                let qos = QoS::from_bits((frame.header >> QOS_SHIFT) & 0x03)
                    .ok_or(ProtocolError::InvalidPayload)?;
                let mut offset = 0;
                let topic = decode_string(body, &mut offset)?.to_owned();
                let packet_id = if qos == QoS::AtMostOnce {
                    None
                } else {
                    Some(read_u16(body, &mut offset).map_err(|_| short)?)
                };
                Ok(Self::Publish {
                    topic,
                    qos,
                    packet_id,
                    payload: body[offset..].to_vec(),
                })
            }
            PUBACK => match body {
                [hi, lo, ..] => Ok(Self::PubAck {
                    packet_id: u16::from_be_bytes([*hi, *lo]),
                }),
                _ => Err(short),
            },
            SUBACK => match body {
                [hi, lo, rest @ ..] => Ok(Self::SubAck {
                    packet_id: u16::from_be_bytes([*hi, *lo]),
                    granted_qos: rest.to_vec(),
                }),
                _ => Err(short),
            },
            PINGRESP => Ok(Self::PingResp),
            other => Ok(Self::Other { packet_type: other }),
        }
    }
}

// ---------------------------------------------------------------------------
// Stream reassembly
// ---------------------------------------------------------------------------

/// Streaming packet decoder over a fixed-capacity buffer.
pub struct StreamDecoder {
    buf: heapless::Vec<u8, RX_BUFFER_CAPACITY>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            buf: heapless::Vec::new(),
        }
    }

    /// Append received bytes.  Fails if the buffer cannot hold them.
    pub fn feed(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.buf
            .extend_from_slice(data)
            .map_err(|()| ProtocolError::BufferOverflow)
    }

    /// Bytes that can still be fed without overflowing.
    pub fn spare_capacity(&self) -> usize {
        RX_BUFFER_CAPACITY - self.buf.len()
    }

    /// Bytes currently buffered (a partial packet, if any).
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Cut the next complete frame off the front of the buffer.
    ///
    /// `Ok(None)` means more bytes are needed.  An error means the stream
    /// can no longer be framed and the connection must be dropped.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        if self.buf.len() < 2 {
            return Ok(None);
        }
        let Some((len, used)) = decode_remaining_length(&self.buf[1..])? else {
            return Ok(None);
        };
        let body_start = 1 + used;
        let total = body_start + len;
        if total > RX_BUFFER_CAPACITY {
            return Err(ProtocolError::BufferOverflow);
        }
        if self.buf.len() < total {
            return Ok(None);
        }

        let frame = Frame {
            header: self.buf[0],
            body: self.buf[body_start..total].to_vec(),
        };

        // Shift residual bytes (the next packet) to the front.
        let remaining = self.buf.len() - total;
        self.buf.copy_within(total.., 0);
        self.buf.truncate(remaining);
        Ok(Some(frame))
    }

    /// Drop any buffered bytes (after the connection is reset).
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}
