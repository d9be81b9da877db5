//! Weighted LRU cache for resolved codecs (spec.md §4.A "Cache eviction").
//!
//! Weights reflect composition depth: primitives and codecs bound directly
//! to a primitive wire type weigh 0 and are therefore effectively pinned;
//! collections/tuples/UDTs weigh the sum of their children's weights plus
//! one per nesting level; custom pass-through codecs weigh 1.

use super::value::WireType;
use super::Codec;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum CacheKey {
    Wire(WireType),
    WireLang(WireType, super::value::LangType),
}

/// Weight function from spec.md §4.A. Purely a function of the wire type's
/// shape — whether a codec for that shape was synthesized or explicitly
/// registered does not change its weight (see DESIGN.md Open Questions).
pub fn weight_of(wire: &WireType) -> u32 {
    match wire {
        WireType::List(e) | WireType::Set(e) => 1 + weight_of(e),
        WireType::Map(k, v) => 1 + weight_of(k) + weight_of(v),
        WireType::Tuple(elems) => 1 + elems.iter().map(weight_of).sum::<u32>(),
        WireType::Udt { fields, .. } => 1 + fields.iter().map(|(_, t)| weight_of(t)).sum::<u32>(),
        WireType::Custom(_) => 1,
        _ => 0,
    }
}

struct Entry {
    codec: Arc<dyn Codec>,
    weight: u32,
}

/// Bounded-weight cache with LRU eviction among non-zero-weight entries.
/// Zero-weight entries (primitives, explicitly registered codecs) are never
/// evicted — they don't count against `max_weight`.
pub(crate) struct WeightedCodecCache {
    entries: HashMap<CacheKey, Entry>,
    recency: Vec<CacheKey>,
    total_weight: u64,
    max_weight: u64,
}

impl WeightedCodecCache {
    pub(crate) fn new(max_weight: u64) -> Self {
        Self {
            entries: HashMap::new(),
            recency: Vec::new(),
            total_weight: 0,
            max_weight,
        }
    }

    pub(crate) fn get(&mut self, key: &CacheKey) -> Option<Arc<dyn Codec>> {
        if let Some(entry) = self.entries.get(key) {
            let codec = Arc::clone(&entry.codec);
            self.touch(key);
            Some(codec)
        } else {
            None
        }
    }

    pub(crate) fn insert(&mut self, key: CacheKey, codec: Arc<dyn Codec>) {
        let weight = weight_of(&codec.wire_type());
        if self.entries.contains_key(&key) {
            self.touch(&key);
            return;
        }
        if weight > 0 {
            self.evict_until_fits(weight);
        }
        self.total_weight += weight as u64;
        self.entries.insert(key.clone(), Entry { codec, weight });
        self.recency.push(key);
    }

    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            let k = self.recency.remove(pos);
            self.recency.push(k);
        }
    }

    fn evict_until_fits(&mut self, incoming_weight: u32) {
        let mut i = 0;
        while self.total_weight + incoming_weight as u64 > self.max_weight && i < self.recency.len() {
            let key = self.recency[i].clone();
            let evictable = self.entries.get(&key).map(|e| e.weight > 0).unwrap_or(false);
            if evictable {
                if let Some(entry) = self.entries.remove(&key) {
                    self.total_weight -= entry.weight as u64;
                }
                self.recency.remove(i);
                // restart scan from the front: the vector shifted.
                i = 0;
            } else {
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_is_zero_for_primitives() {
        assert_eq!(weight_of(&WireType::Int), 0);
        assert_eq!(weight_of(&WireType::Timestamp), 0);
    }

    #[test]
    fn weight_is_monotonic_under_nesting() {
        let w = WireType::Int;
        let list_w = WireType::list(w.clone());
        let list_list_w = WireType::list(list_w.clone());

        assert!(weight_of(&w) <= weight_of(&list_w));
        assert!(weight_of(&list_w) <= weight_of(&list_list_w));
    }

    #[test]
    fn custom_weighs_one() {
        assert_eq!(weight_of(&WireType::Custom("x.y.Z".into())), 1);
    }
}
