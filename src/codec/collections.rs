//! Synthesized codecs for `LIST`, `SET` and `MAP` wire types (spec.md §4.A
//! "Collection synthesis"). Each wraps a recursively-resolved element codec
//! and defers entirely to it for element encode/decode.

use super::value::{LangType, Value, WireType};
use super::Codec;
use crate::error::{DbError, Result};
use crate::protocol::ProtocolVersion;
use bytes::{Buf, BufMut};
use std::sync::Arc;

#[derive(Debug)]
pub struct ListCodec {
    element_wire: WireType,
    element: Arc<dyn Codec>,
}

impl ListCodec {
    pub fn new(element_wire: WireType, element: Arc<dyn Codec>) -> Self {
        Self { element_wire, element }
    }
}

impl Codec for ListCodec {
    fn wire_type(&self) -> WireType {
        WireType::list(self.element_wire.clone())
    }

    fn lang_type(&self) -> LangType {
        LangType::List(Box::new(self.element.lang_type()))
    }

    fn accepts_value(&self, value: &Value) -> bool {
        match value {
            Value::List(items) => items.is_empty() || items.iter().all(|v| self.element.accepts_value(v)),
            _ => false,
        }
    }

    fn serialize(&self, value: &Value, protocol_version: ProtocolVersion) -> Result<Vec<u8>> {
        let items = match value {
            Value::List(items) => items,
            _ => return Err(DbError::CodecNotFound("value is not a list".into())),
        };
        let mut out = Vec::new();
        out.put_i32(items.len() as i32);
        for item in items {
            let encoded = self.element.serialize(item, protocol_version)?;
            out.put_i32(encoded.len() as i32);
            out.extend_from_slice(&encoded);
        }
        Ok(out)
    }

    fn deserialize(&self, bytes: &[u8], protocol_version: ProtocolVersion) -> Result<Value> {
        let mut buf = bytes;
        if buf.remaining() < 4 {
            return Err(DbError::CodecNotFound("truncated list count".into()));
        }
        let count = buf.get_i32() as usize;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            if buf.remaining() < 4 {
                return Err(DbError::CodecNotFound("truncated list element length".into()));
            }
            let len = buf.get_i32() as usize;
            if buf.remaining() < len {
                return Err(DbError::CodecNotFound("truncated list element body".into()));
            }
            let (elem_bytes, rest) = buf.split_at(len);
            items.push(self.element.deserialize(elem_bytes, protocol_version)?);
            buf = rest;
        }
        Ok(Value::List(items))
    }

    fn format(&self, value: &Value) -> Result<String> {
        match value {
            Value::List(items) => {
                let rendered: Result<Vec<String>> = items.iter().map(|v| self.element.format(v)).collect();
                Ok(format!("[{}]", rendered?.join(", ")))
            }
            _ => Err(DbError::CodecNotFound("value is not a list".into())),
        }
    }

    fn parse(&self, _literal: &str) -> Result<Value> {
        Err(DbError::CodecNotFound("list literal parsing is not supported".into()))
    }
}

#[derive(Debug)]
pub struct SetCodec {
    element_wire: WireType,
    element: Arc<dyn Codec>,
}

impl SetCodec {
    pub fn new(element_wire: WireType, element: Arc<dyn Codec>) -> Self {
        Self { element_wire, element }
    }
}

impl Codec for SetCodec {
    fn wire_type(&self) -> WireType {
        WireType::set(self.element_wire.clone())
    }

    fn lang_type(&self) -> LangType {
        LangType::Set(Box::new(self.element.lang_type()))
    }

    fn accepts_value(&self, value: &Value) -> bool {
        match value {
            Value::Set(items) => items.is_empty() || items.iter().all(|v| self.element.accepts_value(v)),
            _ => false,
        }
    }

    fn serialize(&self, value: &Value, protocol_version: ProtocolVersion) -> Result<Vec<u8>> {
        let items = match value {
            Value::Set(items) => items,
            _ => return Err(DbError::CodecNotFound("value is not a set".into())),
        };
        let mut out = Vec::new();
        out.put_i32(items.len() as i32);
        for item in items {
            let encoded = self.element.serialize(item, protocol_version)?;
            out.put_i32(encoded.len() as i32);
            out.extend_from_slice(&encoded);
        }
        Ok(out)
    }

    fn deserialize(&self, bytes: &[u8], protocol_version: ProtocolVersion) -> Result<Value> {
        let mut buf = bytes;
        if buf.remaining() < 4 {
            return Err(DbError::CodecNotFound("truncated set count".into()));
        }
        let count = buf.get_i32() as usize;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            if buf.remaining() < 4 {
                return Err(DbError::CodecNotFound("truncated set element length".into()));
            }
            let len = buf.get_i32() as usize;
            if buf.remaining() < len {
                return Err(DbError::CodecNotFound("truncated set element body".into()));
            }
            let (elem_bytes, rest) = buf.split_at(len);
            items.push(self.element.deserialize(elem_bytes, protocol_version)?);
            buf = rest;
        }
        Ok(Value::Set(items))
    }

    fn format(&self, value: &Value) -> Result<String> {
        match value {
            Value::Set(items) => {
                let rendered: Result<Vec<String>> = items.iter().map(|v| self.element.format(v)).collect();
                Ok(format!("{{{}}}", rendered?.join(", ")))
            }
            _ => Err(DbError::CodecNotFound("value is not a set".into())),
        }
    }

    fn parse(&self, _literal: &str) -> Result<Value> {
        Err(DbError::CodecNotFound("set literal parsing is not supported".into()))
    }
}

#[derive(Debug)]
pub struct MapCodec {
    key_wire: WireType,
    value_wire: WireType,
    key: Arc<dyn Codec>,
    value: Arc<dyn Codec>,
}

impl MapCodec {
    pub fn new(key_wire: WireType, value_wire: WireType, key: Arc<dyn Codec>, value: Arc<dyn Codec>) -> Self {
        Self { key_wire, value_wire, key, value }
    }
}

impl Codec for MapCodec {
    fn wire_type(&self) -> WireType {
        WireType::map(self.key_wire.clone(), self.value_wire.clone())
    }

    fn lang_type(&self) -> LangType {
        LangType::Map(Box::new(self.key.lang_type()), Box::new(self.value.lang_type()))
    }

    fn accepts_value(&self, value: &Value) -> bool {
        match value {
            Value::Map(entries) => {
                entries.is_empty()
                    || entries
                        .iter()
                        .all(|(k, v)| self.key.accepts_value(k) && self.value.accepts_value(v))
            }
            _ => false,
        }
    }

    fn serialize(&self, value: &Value, protocol_version: ProtocolVersion) -> Result<Vec<u8>> {
        let entries = match value {
            Value::Map(entries) => entries,
            _ => return Err(DbError::CodecNotFound("value is not a map".into())),
        };
        let mut out = Vec::new();
        out.put_i32(entries.len() as i32);
        for (k, v) in entries {
            let ek = self.key.serialize(k, protocol_version)?;
            out.put_i32(ek.len() as i32);
            out.extend_from_slice(&ek);
            let ev = self.value.serialize(v, protocol_version)?;
            out.put_i32(ev.len() as i32);
            out.extend_from_slice(&ev);
        }
        Ok(out)
    }

    fn deserialize(&self, bytes: &[u8], protocol_version: ProtocolVersion) -> Result<Value> {
        let mut buf = bytes;
        if buf.remaining() < 4 {
            return Err(DbError::CodecNotFound("truncated map count".into()));
        }
        let count = buf.get_i32() as usize;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            if buf.remaining() < 4 {
                return Err(DbError::CodecNotFound("truncated map key length".into()));
            }
            let klen = buf.get_i32() as usize;
            if buf.remaining() < klen {
                return Err(DbError::CodecNotFound("truncated map key body".into()));
            }
            let (kbytes, rest) = buf.split_at(klen);
            let key = self.key.deserialize(kbytes, protocol_version)?;
            buf = rest;

            if buf.remaining() < 4 {
                return Err(DbError::CodecNotFound("truncated map value length".into()));
            }
            let vlen = buf.get_i32() as usize;
            if buf.remaining() < vlen {
                return Err(DbError::CodecNotFound("truncated map value body".into()));
            }
            let (vbytes, rest) = buf.split_at(vlen);
            let val = self.value.deserialize(vbytes, protocol_version)?;
            buf = rest;

            entries.push((key, val));
        }
        Ok(Value::Map(entries))
    }

    fn format(&self, value: &Value) -> Result<String> {
        match value {
            Value::Map(entries) => {
                let rendered: Result<Vec<String>> = entries
                    .iter()
                    .map(|(k, v)| Ok(format!("{}: {}", self.key.format(k)?, self.value.format(v)?)))
                    .collect();
                Ok(format!("{{{}}}", rendered?.join(", ")))
            }
            _ => Err(DbError::CodecNotFound("value is not a map".into())),
        }
    }

    fn parse(&self, _literal: &str) -> Result<Value> {
        Err(DbError::CodecNotFound("map literal parsing is not supported".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecRegistry;

    #[test]
    fn list_of_int_round_trips() {
        let registry = CodecRegistry::with_primitives();
        let codec = registry.codec_for_wire(&WireType::list(WireType::Int)).unwrap();
        let value = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let encoded = codec.serialize(&value, ProtocolVersion::V4).unwrap();
        let decoded = codec.deserialize(&encoded, ProtocolVersion::V4).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn empty_list_accepted_regardless_of_element_type() {
        let registry = CodecRegistry::with_primitives();
        let codec = registry.codec_for_wire(&WireType::list(WireType::Text)).unwrap();
        assert!(codec.accepts_value(&Value::List(vec![])));
    }

    #[test]
    fn map_of_text_to_int_round_trips() {
        let registry = CodecRegistry::with_primitives();
        let codec = registry
            .codec_for_wire(&WireType::map(WireType::Text, WireType::Int))
            .unwrap();
        let value = Value::Map(vec![
            (Value::Text("a".into()), Value::Int(1)),
            (Value::Text("b".into()), Value::Int(2)),
        ]);
        let encoded = codec.serialize(&value, ProtocolVersion::V4).unwrap();
        let decoded = codec.deserialize(&encoded, ProtocolVersion::V4).unwrap();
        assert_eq!(value, decoded);
    }
}
