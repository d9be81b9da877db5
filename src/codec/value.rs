//! The wire type descriptor and the dynamically-typed in-language value
//! handle that the codec registry dispatches on (spec.md §3, §9 design note
//! "the registry's internal value type is an opaque dynamically-typed
//! handle carrying its own serialize/deserialize closures").

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::net::IpAddr;
use uuid::Uuid;

/// A sum type enumerating the database's native column types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WireType {
    Ascii,
    BigInt,
    Blob,
    Boolean,
    Counter,
    Decimal,
    Double,
    Float,
    Inet,
    TinyInt,
    SmallInt,
    Int,
    Text,
    Timestamp,
    Date,
    Time,
    Uuid,
    Varchar,
    Varint,
    TimeUuid,
    List(Box<WireType>),
    Set(Box<WireType>),
    Map(Box<WireType>, Box<WireType>),
    Tuple(Vec<WireType>),
    Udt {
        keyspace: String,
        name: String,
        fields: Vec<(String, WireType)>,
    },
    Custom(String),
}

impl WireType {
    pub fn list(element: WireType) -> WireType {
        WireType::List(Box::new(element))
    }

    pub fn set(element: WireType) -> WireType {
        WireType::Set(Box::new(element))
    }

    pub fn map(key: WireType, value: WireType) -> WireType {
        WireType::Map(Box::new(key), Box::new(value))
    }
}

/// The in-language side of a codec mapping. Mirrors `WireType`'s shape so
/// that `(WireType, LangType)` pairs are directly comparable and hashable —
/// the cache key the registry's precedence rules are defined over.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LangType {
    String,
    I64,
    Bytes,
    Bool,
    Decimal,
    F64,
    F32,
    IpAddr,
    I8,
    I16,
    I32,
    DateTimeUtc,
    NaiveDate,
    NaiveTime,
    Uuid,
    Varint,
    List(Box<LangType>),
    Set(Box<LangType>),
    Map(Box<LangType>, Box<LangType>),
    Tuple(Vec<LangType>),
    Udt(String),
    Custom,
}

/// A dynamically-typed handle for a decoded or to-be-encoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Ascii(String),
    BigInt(i64),
    Blob(Bytes),
    Boolean(bool),
    Counter(i64),
    Decimal { unscaled: Vec<u8>, scale: i32 },
    Double(f64),
    Float(f32),
    Inet(IpAddr),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    Text(String),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Uuid(Uuid),
    Varchar(String),
    Varint(Vec<u8>),
    TimeUuid(Uuid),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Tuple(Vec<Value>),
    Udt(Vec<(String, Option<Value>)>),
    Custom(Bytes),
}

impl Value {
    /// The `LangType` this value instance carries, used by
    /// `codec_for(value)` / `codec_for(wire, value)` runtime shape tests.
    pub fn lang_type(&self) -> Option<LangType> {
        match self {
            Value::Null => None,
            Value::Ascii(_) | Value::Text(_) | Value::Varchar(_) => Some(LangType::String),
            Value::BigInt(_) | Value::Counter(_) => Some(LangType::I64),
            Value::Blob(_) => Some(LangType::Bytes),
            Value::Boolean(_) => Some(LangType::Bool),
            Value::Decimal { .. } => Some(LangType::Decimal),
            Value::Double(_) => Some(LangType::F64),
            Value::Float(_) => Some(LangType::F32),
            Value::Inet(_) => Some(LangType::IpAddr),
            Value::TinyInt(_) => Some(LangType::I8),
            Value::SmallInt(_) => Some(LangType::I16),
            Value::Int(_) => Some(LangType::I32),
            Value::Timestamp(_) => Some(LangType::DateTimeUtc),
            Value::Date(_) => Some(LangType::NaiveDate),
            Value::Time(_) => Some(LangType::NaiveTime),
            Value::Uuid(_) | Value::TimeUuid(_) => Some(LangType::Uuid),
            Value::Varint(_) => Some(LangType::Varint),
            Value::List(items) => Some(LangType::List(Box::new(
                items.first().and_then(Value::lang_type).unwrap_or(LangType::Bytes),
            ))),
            Value::Set(items) => Some(LangType::Set(Box::new(
                items.first().and_then(Value::lang_type).unwrap_or(LangType::Bytes),
            ))),
            Value::Map(entries) => {
                let (k, v) = entries
                    .first()
                    .map(|(k, v)| (k.lang_type().unwrap_or(LangType::Bytes), v.lang_type().unwrap_or(LangType::Bytes)))
                    .unwrap_or((LangType::Bytes, LangType::Bytes));
                Some(LangType::Map(Box::new(k), Box::new(v)))
            }
            Value::Tuple(items) => Some(LangType::Tuple(
                items.iter().map(|v| v.lang_type().unwrap_or(LangType::Bytes)).collect(),
            )),
            Value::Udt(fields) => Some(LangType::Udt(
                fields.iter().map(|(name, _)| name.clone()).collect::<Vec<_>>().join(","),
            )),
            Value::Custom(_) => Some(LangType::Custom),
        }
    }

    pub fn is_empty_collection(&self) -> bool {
        matches!(self, Value::List(v) | Value::Set(v) if v.is_empty())
            || matches!(self, Value::Map(v) if v.is_empty())
    }
}
