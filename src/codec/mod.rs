//! Typed serialization registry (spec.md §4.A).
//!
//! Resolves, and synthesizes on demand, a [`Codec`] for any
//! `(wire_type, language_type, value)` triple, with caching and stable
//! precedence. Grounded on the teacher's message codec
//! (`networking::protocol::codec::MessageCodec`) for the encode/decode
//! shape, generalized here into a dynamic-dispatch registry instead of a
//! single fixed wire format.

pub mod cache;
pub mod collections;
pub mod primitives;
pub mod structural;
pub mod value;

pub use value::{LangType, Value, WireType};

use crate::error::{DbError, Result};
use crate::protocol::ProtocolVersion;
use cache::{CacheKey, WeightedCodecCache};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;

/// A bidirectional converter between a wire-type descriptor and an
/// in-language value (spec.md §3 "Codec"). Implementations are immutable
/// and thread-safe once constructed.
pub trait Codec: Send + Sync + fmt::Debug {
    /// The wire type this codec instance is bound to.
    fn wire_type(&self) -> WireType;

    /// The language type this codec instance is bound to, if it is bound to
    /// exactly one (synthesized collection/tuple/UDT codecs always are).
    fn lang_type(&self) -> LangType;

    /// Runtime shape test: does `value` look like something this codec
    /// could serialize?
    fn accepts_value(&self, value: &Value) -> bool;

    fn serialize(&self, value: &Value, protocol_version: ProtocolVersion) -> Result<Vec<u8>>;

    fn deserialize(&self, bytes: &[u8], protocol_version: ProtocolVersion) -> Result<Value>;

    fn format(&self, value: &Value) -> Result<String>;

    fn parse(&self, literal: &str) -> Result<Value>;

    fn accepts_wire(&self, wire: &WireType) -> bool {
        self.wire_type() == *wire
    }

    fn accepts_lang(&self, lang: &LangType) -> bool {
        self.lang_type() == *lang
    }
}

/// Resolves codecs for wire/language type pairs, synthesizing collection,
/// tuple, UDT and custom codecs recursively when no explicit registration
/// matches.
pub struct CodecRegistry {
    codecs: RwLock<Vec<Arc<dyn Codec>>>,
    cache: Mutex<WeightedCodecCache>,
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codecs", &self.codecs.read().len())
            .finish()
    }
}

const DEFAULT_CACHE_WEIGHT: u64 = 1_000;

impl CodecRegistry {
    /// An empty registry — no primitives pre-registered. Most callers want
    /// [`CodecRegistry::with_primitives`].
    pub fn new() -> Self {
        Self {
            codecs: RwLock::new(Vec::new()),
            cache: Mutex::new(WeightedCodecCache::new(DEFAULT_CACHE_WEIGHT)),
        }
    }

    /// A registry pre-loaded with codecs for every native primitive type in
    /// spec.md §3, in the "primitives first" precedence slot.
    pub fn with_primitives() -> Self {
        let registry = Self::new();
        for codec in primitives::all() {
            registry.codecs.write().push(codec);
        }
        registry
    }

    /// Register a codec, chainable. Ignored with a `tracing::warn!` if it
    /// collides with an existing accepted `(wire, lang)` mapping — detection
    /// is best-effort (spec.md §4.A "Registration collision").
    pub fn register(&self, codec: Arc<dyn Codec>) -> &Self {
        let mut codecs = self.codecs.write();
        let collides = codecs.iter().any(|existing| {
            existing.wire_type() == codec.wire_type() && existing.lang_type() == codec.lang_type()
        });
        if collides {
            tracing::warn!(
                "codec collision on ({:?}, {:?}) ignored: an accepted codec is already registered",
                codec.wire_type(),
                codec.lang_type()
            );
            return self;
        }
        codecs.push(codec);
        self
    }

    /// `codec_for(wire_type)` — cacheable.
    pub fn codec_for_wire(&self, wire: &WireType) -> Result<Arc<dyn Codec>> {
        let key = CacheKey::Wire(wire.clone());
        if let Some(hit) = self.cache.lock().get(&key) {
            return Ok(hit);
        }

        let resolved = self.scan_by_wire(wire).or_else(|| self.synthesize(wire, None))?;
        if !resolved.accepts_wire(wire) {
            return Err(DbError::CodecNotFound(format!(
                "synthesized codec does not accept wire type {wire:?}"
            )));
        }
        self.cache.lock().insert(key, Arc::clone(&resolved));
        Ok(resolved)
    }

    /// `codec_for(wire_type, language_type)` — cacheable.
    pub fn codec_for_wire_and_lang(&self, wire: &WireType, lang: &LangType) -> Result<Arc<dyn Codec>> {
        let key = CacheKey::WireLang(wire.clone(), lang.clone());
        if let Some(hit) = self.cache.lock().get(&key) {
            return Ok(hit);
        }

        let resolved = self
            .scan_by_wire_and_lang(wire, lang)
            .or_else(|| self.synthesize(wire, Some(lang)))?;
        if !resolved.accepts_wire(wire) || !resolved.accepts_lang(lang) {
            return Err(DbError::CodecNotFound(format!(
                "synthesized codec does not accept ({wire:?}, {lang:?})"
            )));
        }
        self.cache.lock().insert(key, Arc::clone(&resolved));
        Ok(resolved)
    }

    /// `codec_for(value)` — runtime shape test, never cached.
    pub fn codec_for_value(&self, value: &Value) -> Result<Arc<dyn Codec>> {
        let codecs = self.codecs.read();
        codecs
            .iter()
            .find(|c| c.accepts_value(value))
            .cloned()
            .ok_or_else(|| DbError::CodecNotFound(format!("no codec accepts value {value:?}")))
    }

    /// `codec_for(wire_type, value)` — joint acceptance, never cached.
    pub fn codec_for_wire_and_value(&self, wire: &WireType, value: &Value) -> Result<Arc<dyn Codec>> {
        let codecs = self.codecs.read();
        if let Some(found) = codecs
            .iter()
            .find(|c| c.accepts_wire(wire) && c.accepts_value(value))
        {
            return Ok(Arc::clone(found));
        }
        drop(codecs);
        self.synthesize(wire, value.lang_type().as_ref())
    }

    fn scan_by_wire(&self, wire: &WireType) -> Option<Arc<dyn Codec>> {
        self.codecs.read().iter().find(|c| c.accepts_wire(wire)).cloned()
    }

    fn scan_by_wire_and_lang(&self, wire: &WireType, lang: &LangType) -> Option<Arc<dyn Codec>> {
        self.codecs
            .read()
            .iter()
            .find(|c| c.accepts_wire(wire) && c.accepts_lang(lang))
            .cloned()
    }

    /// Synthesis step 3 of spec.md §4.A's precedence rules.
    fn synthesize(&self, wire: &WireType, lang: Option<&LangType>) -> Result<Arc<dyn Codec>> {
        match wire {
            WireType::List(elem) => {
                let elem_lang = element_lang(lang);
                let elem_codec = match elem_lang {
                    Some(l) => self.codec_for_wire_and_lang(elem, &l)?,
                    None => self.codec_for_wire(elem)?,
                };
                Ok(Arc::new(collections::ListCodec::new(
                    (**elem).clone(),
                    elem_codec,
                )))
            }
            WireType::Set(elem) => {
                let elem_lang = element_lang(lang);
                let elem_codec = match elem_lang {
                    Some(l) => self.codec_for_wire_and_lang(elem, &l)?,
                    None => self.codec_for_wire(elem)?,
                };
                Ok(Arc::new(collections::SetCodec::new(
                    (**elem).clone(),
                    elem_codec,
                )))
            }
            WireType::Map(key, val) => {
                let key_codec = self.codec_for_wire(key)?;
                let val_codec = self.codec_for_wire(val)?;
                Ok(Arc::new(collections::MapCodec::new(
                    (**key).clone(),
                    (**val).clone(),
                    key_codec,
                    val_codec,
                )))
            }
            WireType::Tuple(elems) => {
                let mut codecs = Vec::with_capacity(elems.len());
                for e in elems {
                    codecs.push(self.codec_for_wire(e)?);
                }
                Ok(Arc::new(structural::TupleCodec::new(elems.clone(), codecs)))
            }
            WireType::Udt { keyspace, name, fields } => {
                let mut field_codecs = Vec::with_capacity(fields.len());
                for (fname, ftype) in fields {
                    field_codecs.push((fname.clone(), self.codec_for_wire(ftype)?));
                }
                Ok(Arc::new(structural::UdtCodec::new(
                    keyspace.clone(),
                    name.clone(),
                    fields.clone(),
                    field_codecs,
                )))
            }
            WireType::Custom(name) => Ok(Arc::new(structural::CustomCodec::new(name.clone()))),
            other => Err(DbError::CodecNotFound(format!(
                "no registered or synthesizable codec for {other:?}"
            ))),
        }
    }
}

/// Value-from-empty-collection rule (spec.md §4.A): when no element type is
/// known and synthesis must pick one from a value, an empty collection
/// substitutes `BLOB`.
fn element_lang(lang: Option<&LangType>) -> Option<LangType> {
    match lang {
        Some(LangType::List(inner)) | Some(LangType::Set(inner)) => Some((**inner).clone()),
        _ => None,
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_primitives()
    }
}
