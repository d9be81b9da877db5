//! Frame header encoding/decoding.
//!
//! Grounded on the teacher's `networking::protocol::codec` message framing,
//! adapted to the version-dependent stream-id width and reserved
//! event-stream id required by this protocol (spec.md §6).

use super::{Compression, Opcode, ProtocolVersion};
use crate::error::{DbError, Result};
use bytes::{Buf, BufMut, BytesMut};

/// Stream id reserved for server-pushed events on v3/v4 connections.
pub const EVENT_STREAM_ID_V3: i16 = -1;

/// Per-frame flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub compressed: bool,
    pub tracing: bool,
}

impl Flags {
    fn encode(self) -> u8 {
        let mut b = 0u8;
        if self.compressed {
            b |= 0x01;
        }
        if self.tracing {
            b |= 0x02;
        }
        b
    }

    fn decode(b: u8) -> Self {
        Self {
            compressed: b & 0x01 != 0,
            tracing: b & 0x02 != 0,
        }
    }
}

/// Decoded frame header (not including the body).
#[derive(Debug, Clone)]
pub struct FrameHeader {
    pub version: ProtocolVersion,
    pub flags: Flags,
    pub stream_id: i16,
    pub opcode: Opcode,
    pub length: u32,
}

impl FrameHeader {
    /// Size in bytes, which depends on the negotiated protocol version's
    /// stream-id width.
    pub fn encoded_size(version: ProtocolVersion) -> usize {
        1 + 1 + version.stream_id_width() + 1 + 4
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.version.as_u8());
        buf.put_u8(self.flags.encode());
        if self.version.stream_id_width() == 1 {
            buf.put_i8(self.stream_id as i8);
        } else {
            buf.put_i16(self.stream_id);
        }
        buf.put_u8(opcode_to_byte(self.opcode));
        buf.put_u32(self.length);
    }

    pub fn decode(buf: &mut BytesMut) -> Result<Self> {
        if buf.len() < 2 {
            return Err(DbError::ProtocolError("incomplete frame header".into()));
        }
        let version = ProtocolVersion::from_u8(buf[0] & 0x7F)?;
        let header_size = Self::encoded_size(version);
        if buf.len() < header_size {
            return Err(DbError::ProtocolError("incomplete frame header".into()));
        }

        buf.advance(1);
        let flags = Flags::decode(buf.get_u8());
        let stream_id = if version.stream_id_width() == 1 {
            buf.get_i8() as i16
        } else {
            buf.get_i16()
        };
        let opcode = opcode_from_byte(buf.get_u8())?;
        let length = buf.get_u32();

        Ok(Self {
            version,
            flags,
            stream_id,
            opcode,
            length,
        })
    }

    /// True if this header's stream id is the reserved event channel for
    /// the given protocol version (spec.md §6: negative for v1/v2, the
    /// constant -1 for v3/v4).
    pub fn is_event_stream(&self) -> bool {
        match self.version {
            ProtocolVersion::V1 | ProtocolVersion::V2 => self.stream_id < 0,
            ProtocolVersion::V3 | ProtocolVersion::V4 => self.stream_id == EVENT_STREAM_ID_V3,
        }
    }
}

fn opcode_to_byte(op: Opcode) -> u8 {
    op as u8
}

fn opcode_from_byte(b: u8) -> Result<Opcode> {
    Ok(match b {
        0x00 => Opcode::Error,
        0x01 => Opcode::Startup,
        0x02 => Opcode::Ready,
        0x03 => Opcode::Authenticate,
        0x05 => Opcode::Options,
        0x06 => Opcode::Supported,
        0x07 => Opcode::Query,
        0x08 => Opcode::Result,
        0x09 => Opcode::Prepare,
        0x0A => Opcode::Execute,
        0x0B => Opcode::Register,
        0x0C => Opcode::Event,
        0x0D => Opcode::Batch,
        0x0F => Opcode::AuthResponse,
        0x10 => Opcode::AuthSuccess,
        other => return Err(DbError::ProtocolError(format!("unknown opcode 0x{other:02x}"))),
    })
}

/// A fully assembled frame: header plus body, with compression already
/// resolved by the time it reaches request/response consumers.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub body: BytesMut,
}

impl Frame {
    pub fn new(
        version: ProtocolVersion,
        stream_id: i16,
        opcode: Opcode,
        body: BytesMut,
        compression: Compression,
    ) -> Result<Self> {
        let (body, compressed) = compression.maybe_compress(body)?;
        let header = FrameHeader {
            version,
            flags: Flags {
                compressed,
                tracing: false,
            },
            stream_id,
            opcode,
            length: body.len() as u32,
        };
        Ok(Self { header, body })
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(FrameHeader::encoded_size(self.header.version) + self.body.len());
        self.header.encode(&mut buf);
        buf.extend_from_slice(&self.body);
        buf
    }
}
