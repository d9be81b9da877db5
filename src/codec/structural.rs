//! Synthesized codecs for `TUPLE`, user-defined types and `CUSTOM` wire
//! types (spec.md §4.A "Structural synthesis").

use super::value::{LangType, Value, WireType};
use super::Codec;
use crate::error::{DbError, Result};
use crate::protocol::ProtocolVersion;
use bytes::{Buf, BufMut};
use std::sync::Arc;

#[derive(Debug)]
pub struct TupleCodec {
    element_wires: Vec<WireType>,
    elements: Vec<Arc<dyn Codec>>,
}

impl TupleCodec {
    pub fn new(element_wires: Vec<WireType>, elements: Vec<Arc<dyn Codec>>) -> Self {
        Self { element_wires, elements }
    }
}

impl Codec for TupleCodec {
    fn wire_type(&self) -> WireType {
        WireType::Tuple(self.element_wires.clone())
    }

    fn lang_type(&self) -> LangType {
        LangType::Tuple(self.elements.iter().map(|c| c.lang_type()).collect())
    }

    fn accepts_value(&self, value: &Value) -> bool {
        match value {
            Value::Tuple(items) => {
                items.len() == self.elements.len()
                    && items.iter().zip(&self.elements).all(|(v, c)| c.accepts_value(v))
            }
            _ => false,
        }
    }

    fn serialize(&self, value: &Value, protocol_version: ProtocolVersion) -> Result<Vec<u8>> {
        let items = match value {
            Value::Tuple(items) if items.len() == self.elements.len() => items,
            _ => return Err(DbError::CodecNotFound("value does not match tuple arity".into())),
        };
        let mut out = Vec::new();
        for (item, codec) in items.iter().zip(&self.elements) {
            if matches!(item, Value::Null) {
                out.put_i32(-1);
                continue;
            }
            let encoded = codec.serialize(item, protocol_version)?;
            out.put_i32(encoded.len() as i32);
            out.extend_from_slice(&encoded);
        }
        Ok(out)
    }

    fn deserialize(&self, bytes: &[u8], protocol_version: ProtocolVersion) -> Result<Value> {
        let mut buf = bytes;
        let mut items = Vec::with_capacity(self.elements.len());
        for codec in &self.elements {
            if buf.remaining() < 4 {
                return Err(DbError::CodecNotFound("truncated tuple element length".into()));
            }
            let len = buf.get_i32();
            if len < 0 {
                items.push(Value::Null);
                continue;
            }
            let len = len as usize;
            if buf.remaining() < len {
                return Err(DbError::CodecNotFound("truncated tuple element body".into()));
            }
            let (elem_bytes, rest) = buf.split_at(len);
            items.push(codec.deserialize(elem_bytes, protocol_version)?);
            buf = rest;
        }
        Ok(Value::Tuple(items))
    }

    fn format(&self, value: &Value) -> Result<String> {
        match value {
            Value::Tuple(items) if items.len() == self.elements.len() => {
                let rendered: Result<Vec<String>> = items
                    .iter()
                    .zip(&self.elements)
                    .map(|(v, c)| c.format(v))
                    .collect();
                Ok(format!("({})", rendered?.join(", ")))
            }
            _ => Err(DbError::CodecNotFound("value does not match tuple arity".into())),
        }
    }

    fn parse(&self, _literal: &str) -> Result<Value> {
        Err(DbError::CodecNotFound("tuple literal parsing is not supported".into()))
    }
}

#[derive(Debug)]
pub struct UdtCodec {
    keyspace: String,
    name: String,
    field_wires: Vec<(String, WireType)>,
    fields: Vec<(String, Arc<dyn Codec>)>,
}

impl UdtCodec {
    pub fn new(
        keyspace: String,
        name: String,
        field_wires: Vec<(String, WireType)>,
        fields: Vec<(String, Arc<dyn Codec>)>,
    ) -> Self {
        Self { keyspace, name, field_wires, fields }
    }
}

impl Codec for UdtCodec {
    fn wire_type(&self) -> WireType {
        WireType::Udt {
            keyspace: self.keyspace.clone(),
            name: self.name.clone(),
            fields: self.field_wires.clone(),
        }
    }

    fn lang_type(&self) -> LangType {
        LangType::Udt(self.name.clone())
    }

    fn accepts_value(&self, value: &Value) -> bool {
        match value {
            Value::Udt(entries) => {
                entries.len() == self.fields.len()
                    && entries.iter().zip(&self.fields).all(|((ename, evalue), (fname, fcodec))| {
                        ename == fname
                            && match evalue {
                                Some(v) => fcodec.accepts_value(v),
                                None => true,
                            }
                    })
            }
            _ => false,
        }
    }

    fn serialize(&self, value: &Value, protocol_version: ProtocolVersion) -> Result<Vec<u8>> {
        let entries = match value {
            Value::Udt(entries) if entries.len() == self.fields.len() => entries,
            _ => return Err(DbError::CodecNotFound("value does not match udt shape".into())),
        };
        let mut out = Vec::new();
        for ((_, field_value), (_, codec)) in entries.iter().zip(&self.fields) {
            match field_value {
                None => out.put_i32(-1),
                Some(v) => {
                    let encoded = codec.serialize(v, protocol_version)?;
                    out.put_i32(encoded.len() as i32);
                    out.extend_from_slice(&encoded);
                }
            }
        }
        Ok(out)
    }

    fn deserialize(&self, bytes: &[u8], protocol_version: ProtocolVersion) -> Result<Value> {
        let mut buf = bytes;
        let mut entries = Vec::with_capacity(self.fields.len());
        for (name, codec) in &self.fields {
            if buf.remaining() < 4 {
                // UDTs may omit trailing fields (spec.md "UDT field truncation").
                entries.push((name.clone(), None));
                continue;
            }
            let len = buf.get_i32();
            if len < 0 {
                entries.push((name.clone(), None));
                continue;
            }
            let len = len as usize;
            if buf.remaining() < len {
                return Err(DbError::CodecNotFound("truncated udt field body".into()));
            }
            let (field_bytes, rest) = buf.split_at(len);
            entries.push((name.clone(), Some(codec.deserialize(field_bytes, protocol_version)?)));
            buf = rest;
        }
        Ok(Value::Udt(entries))
    }

    fn format(&self, value: &Value) -> Result<String> {
        match value {
            Value::Udt(entries) if entries.len() == self.fields.len() => {
                let rendered: Result<Vec<String>> = entries
                    .iter()
                    .zip(&self.fields)
                    .map(|((name, v), (_, codec))| match v {
                        Some(v) => Ok(format!("{name}: {}", codec.format(v)?)),
                        None => Ok(format!("{name}: null")),
                    })
                    .collect();
                Ok(format!("{{{}}}", rendered?.join(", ")))
            }
            _ => Err(DbError::CodecNotFound("value does not match udt shape".into())),
        }
    }

    fn parse(&self, _literal: &str) -> Result<Value> {
        Err(DbError::CodecNotFound("udt literal parsing is not supported".into()))
    }
}

/// Pass-through codec for `CUSTOM` wire types: the payload is opaque to the
/// driver, carried as raw bytes (spec.md §3 "Custom types are not decoded,
/// only transported").
#[derive(Debug)]
pub struct CustomCodec {
    class_name: String,
}

impl CustomCodec {
    pub fn new(class_name: String) -> Self {
        Self { class_name }
    }
}

impl Codec for CustomCodec {
    fn wire_type(&self) -> WireType {
        WireType::Custom(self.class_name.clone())
    }

    fn lang_type(&self) -> LangType {
        LangType::Custom
    }

    fn accepts_value(&self, value: &Value) -> bool {
        matches!(value, Value::Custom(_))
    }

    fn serialize(&self, value: &Value, _protocol_version: ProtocolVersion) -> Result<Vec<u8>> {
        match value {
            Value::Custom(bytes) => Ok(bytes.to_vec()),
            _ => Err(DbError::CodecNotFound("value is not a custom payload".into())),
        }
    }

    fn deserialize(&self, bytes: &[u8], _protocol_version: ProtocolVersion) -> Result<Value> {
        Ok(Value::Custom(bytes::Bytes::copy_from_slice(bytes)))
    }

    fn format(&self, value: &Value) -> Result<String> {
        match value {
            Value::Custom(bytes) => Ok(format!("0x{}", bytes.iter().map(|b| format!("{b:02x}")).collect::<String>())),
            _ => Err(DbError::CodecNotFound("value is not a custom payload".into())),
        }
    }

    fn parse(&self, _literal: &str) -> Result<Value> {
        Err(DbError::CodecNotFound(format!(
            "custom type {} does not support literal parsing",
            self.class_name
        )))
    }
}
