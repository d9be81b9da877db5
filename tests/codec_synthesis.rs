//! S1 — Codec synthesis: register only a `LocalDate <-> timestamp` codec,
//! request a codec for `list<timestamp> <-> List<LocalDate>`, and expect a
//! synthesized list codec that is then served from cache on a second call.

use std::sync::Arc;
use wdb_driver::codec::{Codec, CodecRegistry, LangType, Value, WireType};
use wdb_driver::error::Result;
use wdb_driver::protocol::ProtocolVersion;

#[derive(Debug)]
struct TimestampAsDateCodec;

impl Codec for TimestampAsDateCodec {
    fn wire_type(&self) -> WireType {
        WireType::Timestamp
    }

    fn lang_type(&self) -> LangType {
        LangType::NaiveDate
    }

    fn accepts_value(&self, value: &Value) -> bool {
        matches!(value, Value::Date(_))
    }

    fn serialize(&self, value: &Value, _protocol_version: ProtocolVersion) -> Result<Vec<u8>> {
        match value {
            Value::Date(date) => {
                let millis = date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp_millis();
                Ok(millis.to_be_bytes().to_vec())
            }
            other => Err(wdb_driver::error::DbError::CodecNotFound(format!("expected Date, got {other:?}"))),
        }
    }

    fn deserialize(&self, bytes: &[u8], _protocol_version: ProtocolVersion) -> Result<Value> {
        let millis = i64::from_be_bytes(bytes.try_into().unwrap());
        let datetime = chrono::DateTime::from_timestamp_millis(millis).unwrap();
        Ok(Value::Date(datetime.date_naive()))
    }

    fn format(&self, value: &Value) -> Result<String> {
        match value {
            Value::Date(date) => Ok(date.to_string()),
            other => Err(wdb_driver::error::DbError::CodecNotFound(format!("expected Date, got {other:?}"))),
        }
    }

    fn parse(&self, literal: &str) -> Result<Value> {
        literal
            .parse()
            .map(Value::Date)
            .map_err(|_| wdb_driver::error::DbError::CodecNotFound(format!("invalid date literal {literal}")))
    }
}

#[test]
fn synthesizes_list_of_custom_codec_and_caches_it() {
    let registry = CodecRegistry::new();
    registry.register(Arc::new(TimestampAsDateCodec));

    let list_wire = WireType::list(WireType::Timestamp);
    let list_lang = LangType::List(Box::new(LangType::NaiveDate));

    let first = registry.codec_for_wire_and_lang(&list_wire, &list_lang).expect("synthesis should succeed");
    let second = registry.codec_for_wire_and_lang(&list_wire, &list_lang).expect("cache hit should succeed");

    assert!(Arc::ptr_eq(&first, &second), "second lookup should be served from cache");
    assert_eq!(first.wire_type(), list_wire);
    assert_eq!(first.lang_type(), list_lang);
}
