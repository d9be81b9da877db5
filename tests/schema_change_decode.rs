//! S4 — Schema-change decoding: a v4 `SCHEMA_CHANGE` frame with
//! `change=UPDATED, target=FUNCTION, keyspace="ks", name="f",
//! signature=["int","text"]` decodes all five fields.

use bytes::{BufMut, BytesMut};
use wdb_driver::protocol::events::decode_event;
use wdb_driver::protocol::{ProtocolVersion, SchemaChangeTarget, SchemaChangeType, ServerEvent};

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

#[test]
fn decodes_function_update_with_signature_on_v4() {
    let mut body = BytesMut::new();
    put_string(&mut body, "SCHEMA_CHANGE");
    put_string(&mut body, "UPDATED");
    put_string(&mut body, "FUNCTION");
    put_string(&mut body, "ks");
    put_string(&mut body, "f");
    put_string_list(&mut body, &["int", "text"]);

    let event = decode_event(body, ProtocolVersion::V4).expect("frame should decode");
    match event {
        ServerEvent::SchemaChange { change, target, keyspace, name, signature } => {
            assert_eq!(change, SchemaChangeType::Updated);
            assert_eq!(target, SchemaChangeTarget::Function);
            assert_eq!(keyspace, "ks");
            assert_eq!(name.as_deref(), Some("f"));
            assert_eq!(signature, Some(vec!["int".to_string(), "text".to_string()]));
        }
        other => panic!("expected SchemaChange, got {other:?}"),
    }
}
