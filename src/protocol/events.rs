//! Server-pushed event payloads (spec.md §4.B "Event demultiplexing").
//!
//! These are decoded with small protocol-native primitive readers (`[string]`,
//! `[inet]`) rather than through the column-value codec registry: native
//! protocol primitives and CQL column wire types share some byte layouts but
//! are distinct encodings (an event's `[inet]` is a length-prefixed address
//! plus a 4-byte port, never a column value). Metadata *rows* fetched from the
//! system catalog in response to these events go through `codec::CodecRegistry`
//! instead — see `cluster::topology`.

use super::ProtocolVersion;
use crate::error::{DbError, Result};
use bytes::{Buf, BytesMut};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyChangeType {
    NewNode,
    RemovedNode,
    MovedNode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChangeType {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaChangeType {
    Created,
    Updated,
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaChangeTarget {
    Keyspace,
    Table,
    Type,
    Function,
    Aggregate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    TopologyChange {
        kind: TopologyChangeType,
        address: SocketAddr,
    },
    StatusChange {
        kind: StatusChangeType,
        address: SocketAddr,
    },
    SchemaChange {
        change: SchemaChangeType,
        target: SchemaChangeTarget,
        keyspace: String,
        name: Option<String>,
        signature: Option<Vec<String>>,
    },
}

fn read_string(buf: &mut BytesMut) -> Result<String> {
    if buf.len() < 2 {
        return Err(DbError::ProtocolError("truncated [string] length".into()));
    }
    let len = buf.get_u16() as usize;
    if buf.len() < len {
        return Err(DbError::ProtocolError("truncated [string] body".into()));
    }
    let bytes = buf.split_to(len);
    String::from_utf8(bytes.to_vec()).map_err(|e| DbError::ProtocolError(e.to_string()))
}

fn read_string_list(buf: &mut BytesMut) -> Result<Vec<String>> {
    if buf.len() < 2 {
        return Err(DbError::ProtocolError("truncated [string list] count".into()));
    }
    let count = buf.get_u16() as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(read_string(buf)?);
    }
    Ok(out)
}

fn read_inet(buf: &mut BytesMut) -> Result<SocketAddr> {
    if buf.is_empty() {
        return Err(DbError::ProtocolError("truncated [inet] length".into()));
    }
    let addr_len = buf.get_u8() as usize;
    if buf.len() < addr_len + 4 {
        return Err(DbError::ProtocolError("truncated [inet] body".into()));
    }
    let ip = match addr_len {
        4 => {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&buf[..4]);
            buf.advance(4);
            IpAddr::V4(Ipv4Addr::from(octets))
        }
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[..16]);
            buf.advance(16);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        other => {
            return Err(DbError::ProtocolError(format!(
                "invalid [inet] address length {other}"
            )))
        }
    };
    let port = buf.get_u32();
    Ok(SocketAddr::new(ip, port as u16))
}

pub fn decode_event(mut buf: BytesMut, version: ProtocolVersion) -> Result<ServerEvent> {
    let event_type = read_string(&mut buf)?;
    match event_type.as_str() {
        "TOPOLOGY_CHANGE" => {
            let change = read_string(&mut buf)?;
            let kind = match change.as_str() {
                "NEW_NODE" => TopologyChangeType::NewNode,
                "REMOVED_NODE" => TopologyChangeType::RemovedNode,
                "MOVED_NODE" => TopologyChangeType::MovedNode,
                other => {
                    return Err(DbError::ProtocolError(format!(
                        "unknown TOPOLOGY_CHANGE kind {other}"
                    )))
                }
            };
            let address = read_inet(&mut buf)?;
            Ok(ServerEvent::TopologyChange { kind, address })
        }
        "STATUS_CHANGE" => {
            let change = read_string(&mut buf)?;
            let kind = match change.as_str() {
                "UP" => StatusChangeType::Up,
                "DOWN" => StatusChangeType::Down,
                other => {
                    return Err(DbError::ProtocolError(format!(
                        "unknown STATUS_CHANGE kind {other}"
                    )))
                }
            };
            let address = read_inet(&mut buf)?;
            Ok(ServerEvent::StatusChange { kind, address })
        }
        "SCHEMA_CHANGE" => decode_schema_change(&mut buf, version),
        other => Err(DbError::ProtocolError(format!("unknown event type {other}"))),
    }
}

fn decode_schema_change(buf: &mut BytesMut, version: ProtocolVersion) -> Result<ServerEvent> {
    let change_raw = read_string(buf)?;
    let change = match change_raw.as_str() {
        "CREATED" => SchemaChangeType::Created,
        "UPDATED" => SchemaChangeType::Updated,
        "DROPPED" => SchemaChangeType::Dropped,
        other => {
            return Err(DbError::ProtocolError(format!(
                "unknown SCHEMA_CHANGE change {other}"
            )))
        }
    };

    match version {
        ProtocolVersion::V1 | ProtocolVersion::V2 => {
            // (change, keyspace, name) — target inferred from whether name is empty.
            let keyspace = read_string(buf)?;
            let name = read_string(buf)?;
            let target = if name.is_empty() {
                SchemaChangeTarget::Keyspace
            } else {
                SchemaChangeTarget::Table
            };
            Ok(ServerEvent::SchemaChange {
                change,
                target,
                keyspace,
                name: if name.is_empty() { None } else { Some(name) },
                signature: None,
            })
        }
        ProtocolVersion::V3 | ProtocolVersion::V4 => {
            // (change, target_type, keyspace, name?, signature?)
            let target_raw = read_string(buf)?;
            let target = match target_raw.as_str() {
                "KEYSPACE" => SchemaChangeTarget::Keyspace,
                "TABLE" => SchemaChangeTarget::Table,
                "TYPE" => SchemaChangeTarget::Type,
                "FUNCTION" => SchemaChangeTarget::Function,
                "AGGREGATE" => SchemaChangeTarget::Aggregate,
                other => {
                    return Err(DbError::ProtocolError(format!(
                        "unknown SCHEMA_CHANGE target {other}"
                    )))
                }
            };
            let keyspace = read_string(buf)?;
            let name = if target == SchemaChangeTarget::Keyspace {
                None
            } else {
                Some(read_string(buf)?)
            };
            let signature = if matches!(
                target,
                SchemaChangeTarget::Function | SchemaChangeTarget::Aggregate
            ) {
                Some(read_string_list(buf)?)
            } else {
                None
            };
            Ok(ServerEvent::SchemaChange {
                change,
                target,
                keyspace,
                name,
                signature,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn put_string(buf: &mut BytesMut, s: &str) {
        buf.put_u16(s.len() as u16);
        buf.put_slice(s.as_bytes());
    }

    fn put_string_list(buf: &mut BytesMut, items: &[&str]) {
        buf.put_u16(items.len() as u16);
        for item in items {
            put_string(buf, item);
        }
    }

    fn put_inet(buf: &mut BytesMut, addr: SocketAddr) {
        match addr.ip() {
            IpAddr::V4(v4) => {
                buf.put_u8(4);
                buf.put_slice(&v4.octets());
            }
            IpAddr::V6(v6) => {
                buf.put_u8(16);
                buf.put_slice(&v6.octets());
            }
        }
        buf.put_u32(addr.port() as u32);
    }

    #[test]
    fn decodes_v4_schema_change_with_signature() {
        // S4 scenario: UPDATED FUNCTION ks.f(int,text)
        let mut buf = BytesMut::new();
        put_string(&mut buf, "SCHEMA_CHANGE");
        put_string(&mut buf, "UPDATED");
        put_string(&mut buf, "FUNCTION");
        put_string(&mut buf, "ks");
        put_string(&mut buf, "f");
        put_string_list(&mut buf, &["int", "text"]);

        let event = decode_event(buf, ProtocolVersion::V4).unwrap();
        match event {
            ServerEvent::SchemaChange {
                change,
                target,
                keyspace,
                name,
                signature,
            } => {
                assert_eq!(change, SchemaChangeType::Updated);
                assert_eq!(target, SchemaChangeTarget::Function);
                assert_eq!(keyspace, "ks");
                assert_eq!(name.as_deref(), Some("f"));
                assert_eq!(signature, Some(vec!["int".to_string(), "text".to_string()]));
            }
            other => panic!("wrong event decoded: {other:?}"),
        }
    }

    #[test]
    fn decodes_v2_schema_change_infers_keyspace_target() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "SCHEMA_CHANGE");
        put_string(&mut buf, "CREATED");
        put_string(&mut buf, "ks");
        put_string(&mut buf, "");

        let event = decode_event(buf, ProtocolVersion::V2).unwrap();
        match event {
            ServerEvent::SchemaChange { target, name, .. } => {
                assert_eq!(target, SchemaChangeTarget::Keyspace);
                assert_eq!(name, None);
            }
            other => panic!("wrong event decoded: {other:?}"),
        }
    }

    #[test]
    fn decodes_status_change() {
        let addr: SocketAddr = "10.0.0.5:9042".parse().unwrap();
        let mut buf = BytesMut::new();
        put_string(&mut buf, "STATUS_CHANGE");
        put_string(&mut buf, "DOWN");
        put_inet(&mut buf, addr);

        let event = decode_event(buf, ProtocolVersion::V4).unwrap();
        assert_eq!(
            event,
            ServerEvent::StatusChange {
                kind: StatusChangeType::Down,
                address: addr,
            }
        );
    }

    #[test]
    fn decodes_topology_change() {
        let addr: SocketAddr = "10.0.0.6:9042".parse().unwrap();
        let mut buf = BytesMut::new();
        put_string(&mut buf, "TOPOLOGY_CHANGE");
        put_string(&mut buf, "NEW_NODE");
        put_inet(&mut buf, addr);

        let event = decode_event(buf, ProtocolVersion::V4).unwrap();
        assert_eq!(
            event,
            ServerEvent::TopologyChange {
                kind: TopologyChangeType::NewNode,
                address: addr,
            }
        );
    }
}
