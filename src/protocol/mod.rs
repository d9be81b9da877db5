//! Wire protocol framing.
//!
//! Frames are length-prefixed binary messages exchanged over a single
//! long-lived TCP connection:
//!
//! ```text
//! +---------+-------+----------------+--------+--------+
//! | version | flags | stream         | opcode | length | body...
//! |  1 byte | 1 byte| 1 or 2 bytes   | 1 byte | 4 bytes|
//! +---------+-------+----------------+--------+--------+
//! ```
//!
//! Stream width is one byte for protocol v1/v2 and two bytes for v3/v4.
//! Negative stream ids (v1/v2) and the reserved value `-1` (v3/v4) carry
//! server-push events rather than request/response traffic — see
//! `EVENT_STREAM_ID`.

pub mod compression;
pub mod events;
pub mod frame;

pub use compression::Compression;
pub use events::{SchemaChangeTarget, SchemaChangeType, ServerEvent, StatusChangeType, TopologyChangeType};
pub use frame::{Flags, Frame, FrameHeader};

use crate::error::{DbError, Result};
use serde::{Deserialize, Serialize};

/// Negotiated wire protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProtocolVersion {
    V1 = 1,
    V2 = 2,
    V3 = 3,
    V4 = 4,
}

impl ProtocolVersion {
    /// Highest version this driver will offer during negotiation.
    pub const MAX: ProtocolVersion = ProtocolVersion::V4;
    /// Lowest version the driver can speak; downgrading below this is fatal.
    pub const MIN: ProtocolVersion = ProtocolVersion::V1;

    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(ProtocolVersion::V1),
            2 => Ok(ProtocolVersion::V2),
            3 => Ok(ProtocolVersion::V3),
            4 => Ok(ProtocolVersion::V4),
            other => Err(DbError::InvalidProtocolVersion(format!(
                "unsupported protocol version {other}"
            ))),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Width, in bytes, of the stream-id field for this version.
    pub fn stream_id_width(self) -> usize {
        match self {
            ProtocolVersion::V1 | ProtocolVersion::V2 => 1,
            ProtocolVersion::V3 | ProtocolVersion::V4 => 2,
        }
    }

    /// Number of usable stream-ids on one connection at this version.
    pub fn max_streams(self) -> usize {
        match self {
            ProtocolVersion::V1 | ProtocolVersion::V2 => 128,
            ProtocolVersion::V3 | ProtocolVersion::V4 => 32_768,
        }
    }

    /// The next lower version, or `None` if already at `MIN`.
    pub fn downgrade(self) -> Option<ProtocolVersion> {
        match self {
            ProtocolVersion::V4 => Some(ProtocolVersion::V3),
            ProtocolVersion::V3 => Some(ProtocolVersion::V2),
            ProtocolVersion::V2 => Some(ProtocolVersion::V1),
            ProtocolVersion::V1 => None,
        }
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        ProtocolVersion::MAX
    }
}

/// Opcodes supported by the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Error = 0x00,
    Startup = 0x01,
    Ready = 0x02,
    Authenticate = 0x03,
    Options = 0x05,
    Supported = 0x06,
    Query = 0x07,
    Result = 0x08,
    Prepare = 0x09,
    Execute = 0x0A,
    Register = 0x0B,
    Event = 0x0C,
    Batch = 0x0D,
    AuthResponse = 0x0F,
    AuthSuccess = 0x10,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_version_round_trips() {
        for v in [1u8, 2, 3, 4] {
            let parsed = ProtocolVersion::from_u8(v).unwrap();
            assert_eq!(parsed.as_u8(), v);
        }
    }

    #[test]
    fn protocol_version_rejects_unknown() {
        assert!(ProtocolVersion::from_u8(9).is_err());
    }

    #[test]
    fn stream_width_matches_spec() {
        assert_eq!(ProtocolVersion::V1.stream_id_width(), 1);
        assert_eq!(ProtocolVersion::V2.stream_id_width(), 1);
        assert_eq!(ProtocolVersion::V3.stream_id_width(), 2);
        assert_eq!(ProtocolVersion::V4.stream_id_width(), 2);
    }

    #[test]
    fn downgrade_below_v1_is_none() {
        assert_eq!(ProtocolVersion::V1.downgrade(), None);
    }

    #[test]
    fn downgrade_chain_from_v4() {
        let mut v = ProtocolVersion::V4;
        let mut seen = vec![v];
        while let Some(next) = v.downgrade() {
            seen.push(next);
            v = next;
        }
        assert_eq!(
            seen,
            vec![
                ProtocolVersion::V4,
                ProtocolVersion::V3,
                ProtocolVersion::V2,
                ProtocolVersion::V1
            ]
        );
    }
}
