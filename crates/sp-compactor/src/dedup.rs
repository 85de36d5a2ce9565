//! Structural deduplication: repeated subtrees → registry entries plus `{"$ref": n}` markers.
//!
//! Subtrees are compared by canonical form: keys sorted, leaves in their
//! compact JSON spelling. Forms are interned bottom-up, so every composite is
//! identified by the ids of its children rather than by re-serializing it.

use sp_core::walk::{self, Control, Event, Rebuild};
use sp_core::{json, RecodeError, Result, Value};
use std::collections::HashMap;

use crate::envelope::{Envelope, REF_KEY};

pub const DEFAULT_MIN_SIZE: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Canon {
    Leaf(String),
    /// Kept apart from strings with the same spelling.
    DateTime(String),
    Array(Vec<usize>),
    /// Sorted by key.
    Object(Vec<(String, usize)>),
}

enum Open {
    Array(Vec<usize>),
    Object { entries: Vec<(String, usize)>, pending: Option<String> },
}

/// Every distinct canonical form in one tree, with its occurrence count and size.
#[derive(Debug, Default)]
struct CanonIndex {
    ids: HashMap<Canon, usize>,
    counts: Vec<usize>,
    sizes: Vec<usize>,
    composite: Vec<bool>,
    by_node: HashMap<usize, usize>,
}

impl CanonIndex {
    fn build(value: &Value) -> Result<Self> {
        let mut index = CanonIndex::default();
        let mut open: Vec<Open> = Vec::new();

        walk::walk(value, |event| {
            let finished = match event {
                Event::Enter { value: Value::Array(_), .. } => {
                    open.push(Open::Array(Vec::new()));
                    None
                }
                Event::Enter { value: Value::Object(_), .. } => {
                    open.push(Open::Object { entries: Vec::new(), pending: None });
                    None
                }
                Event::Enter { .. } => None,
                Event::Key { key, .. } => {
                    if let Some(Open::Object { pending, .. }) = open.last_mut() {
                        *pending = Some(key.to_owned());
                    }
                    None
                }
                Event::Leaf { value, .. } => {
                    let mut text = String::new();
                    json::write_leaf(&mut text, value)?;
                    let size = text.len();
                    let canon = match value {
                        Value::DateTime(_) => Canon::DateTime(text),
                        _ => Canon::Leaf(text),
                    };
                    Some(index.intern(canon, size))
                }
                Event::Exit { value, .. } => {
                    let (canon, size) = match open.pop() {
                        Some(Open::Array(items)) => {
                            let size = 2 + items.len().saturating_sub(1) + items.iter().map(|&id| index.sizes[id]).sum::<usize>();
                            (Canon::Array(items), size)
                        }
                        Some(Open::Object { mut entries, .. }) => {
                            entries.sort_by(|a, b| a.0.cmp(&b.0));
                            let mut size = 2 + entries.len().saturating_sub(1);
                            for (key, id) in &entries {
                                let mut quoted = String::new();
                                json::write_str(&mut quoted, key)?;
                                size += quoted.len() + 1 + index.sizes[*id];
                            }
                            (Canon::Object(entries), size)
                        }
                        None => return Ok(Control::Continue),
                    };
                    let id = index.intern(canon, size);
                    if let Some(node) = value.node_id() {
                        index.by_node.insert(node, id);
                    }
                    Some(id)
                }
            };

            if let Some(id) = finished {
                match open.last_mut() {
                    Some(Open::Array(items)) => items.push(id),
                    Some(Open::Object { entries, pending }) => {
                        if let Some(key) = pending.take() {
                            entries.push((key, id));
                        }
                    }
                    None => {}
                }
            }
            Ok(Control::Continue)
        })?;

        Ok(index)
    }

    fn intern(&mut self, canon: Canon, size: usize) -> usize {
        let id = match self.ids.get(&canon) {
            Some(&id) => id,
            None => {
                let id = self.counts.len();
                self.composite.push(!matches!(canon, Canon::Leaf(_) | Canon::DateTime(_)));
                self.ids.insert(canon, id);
                self.counts.push(0);
                self.sizes.push(size);
                id
            }
        };
        self.counts[id] += 1;
        id
    }

    fn candidates(&self, min_size: usize) -> Vec<bool> {
        (0..self.counts.len())
            .map(|id| self.composite[id] && self.counts[id] > 1 && self.sizes[id] >= min_size)
            .collect()
    }
}

/// `{"$ref": n}`
fn marker(slot: usize) -> Value {
    Value::from_entries([(REF_KEY, Value::from(slot))])
}

/// The registry slot of a well-formed marker, or `None`.
fn marker_slot(value: &Value) -> Option<f64> {
    let Value::Object(node) = value else { return None };
    let map = node.read();
    if map.len() != 1 {
        return None;
    }
    map.get(REF_KEY).map(|slot| slot.as_f64().unwrap_or(f64::NAN))
}

fn contains_markers(value: &Value) -> Result<bool> {
    let mut found = false;
    walk::walk(value, |event| {
        if let Event::Enter { value, .. } = event {
            if marker_slot(value).is_some() {
                found = true;
                return Ok(Control::Break);
            }
        }
        Ok(Control::Continue)
    })?;
    Ok(found)
}

struct Replacer<'a> {
    index: &'a CanonIndex,
    candidates: Vec<bool>,
    slots: HashMap<usize, usize>,
    registry: Vec<Value>,
}

impl Rebuild for Replacer<'_> {
    fn replace(&mut self, value: &Value) -> Result<Option<Value>> {
        let Some(canon) = value.node_id().and_then(|node| self.index.by_node.get(&node).copied()) else {
            return Ok(None);
        };
        if !self.candidates[canon] {
            return Ok(None);
        }
        let slot = match self.slots.get(&canon) {
            Some(&slot) => slot,
            None => {
                let slot = self.registry.len();
                self.registry.push(value.deep_clone()?);
                self.slots.insert(canon, slot);
                slot
            }
        };
        Ok(Some(marker(slot)))
    }
}

struct Resolver<'a> {
    registry: &'a [Value],
}

impl Rebuild for Resolver<'_> {
    fn replace(&mut self, value: &Value) -> Result<Option<Value>> {
        let Some(slot) = marker_slot(value) else { return Ok(None) };
        if slot.fract() != 0.0 || slot < 0.0 {
            return Ok(None);
        }
        match self.registry.get(slot as usize) {
            Some(entry) => entry.deep_clone().map(Some),
            None => Ok(None),
        }
    }
}

/// Structural deduplication pass.
#[derive(Debug, Clone, Copy)]
pub struct Deduplication {
    /// Subtrees whose canonical form is shorter than this are never registered.
    pub min_size: usize,
}

impl Default for Deduplication {
    fn default() -> Self {
        Self { min_size: DEFAULT_MIN_SIZE }
    }
}

impl Deduplication {
    pub fn new(min_size: usize) -> Self {
        Self { min_size }
    }

    /// Registry entries are numbered by first use in depth-first order.
    pub fn encode(&self, value: &Value) -> Result<Envelope> {
        let index = CanonIndex::build(value)?;
        if contains_markers(value)? {
            return Err(RecodeError::not_applicable("input already holds reference markers"));
        }
        let mut replacer = Replacer {
            index: &index,
            candidates: index.candidates(self.min_size),
            slots: HashMap::new(),
            registry: Vec::new(),
        };
        let body = walk::rebuild(value, &mut replacer)?;
        if replacer.registry.is_empty() {
            return Err(RecodeError::not_applicable("no repeated subtree"));
        }
        Ok(Envelope::Deduplicated { registry: replacer.registry, body })
    }

    /// Every reference gets its own copy of the entry. Markers pointing outside
    /// the registry are left as they are.
    pub fn decode(&self, registry: &[Value], body: &Value) -> Result<Value> {
        walk::rebuild(body, &mut Resolver { registry })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &Value, min_size: usize) -> (Vec<Value>, Value) {
        match Deduplication::new(min_size).encode(value).unwrap() {
            Envelope::Deduplicated { registry, body } => (registry, body),
            other => panic!("unexpected envelope {other:?}"),
        }
    }

    fn repeated_payload() -> Value {
        let r = Value::from_entries([
            ("long", Value::from("x".repeat(200))),
            ("meta", Value::from_entries([("a", Value::from(1))])),
        ]);
        let items = vec![r.deep_clone().unwrap(), Value::from_entries([("other", Value::from(1))]), r.clone(), r];
        Value::from_entries([("items", Value::array(items))])
    }

    #[test]
    fn test_repeated_record_is_registered() {
        let payload = repeated_payload();
        let (registry, body) = encode(&payload, 0);
        assert_eq!(registry.len(), 1);
        assert_eq!(body.to_json_string().unwrap(), r#"{"items":[{"$ref":0},{"other":1},{"$ref":0},{"$ref":0}]}"#);
        assert_eq!(Deduplication::default().decode(&registry, &body).unwrap(), payload);
    }

    #[test]
    fn test_decoded_copies_do_not_alias() {
        let (registry, body) = encode(&repeated_payload(), 0);
        let decoded = Deduplication::default().decode(&registry, &body).unwrap();
        let Value::Object(root) = &decoded else { panic!("expected object") };
        let Some(Value::Array(items)) = root.read().get("items").cloned() else { panic!("expected items") };
        let items = items.read();
        assert_ne!(items[0].node_id(), items[2].node_id());
        assert_ne!(items[0].node_id(), registry[0].node_id());
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let v = Value::parse(
            r#"[{"alpha": "aaaaaaaaaa", "beta": "bbbbbbbbbb"}, {"beta": "bbbbbbbbbb", "alpha": "aaaaaaaaaa"}]"#,
        )
        .unwrap();
        let (registry, body) = encode(&v, 0);
        assert_eq!(registry.len(), 1);
        assert_eq!(body.to_json_string().unwrap(), r#"[{"$ref":0},{"$ref":0}]"#);
        assert_eq!(Deduplication::default().decode(&registry, &body).unwrap(), v);
    }

    #[test]
    fn test_datetime_is_not_merged_with_string() {
        let when = chrono::DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z").unwrap().with_timezone(&chrono::Utc);
        let v = Value::array(vec![
            Value::from_entries([("at", Value::from(when))]),
            Value::from_entries([("at", Value::from("2024-01-02T03:04:05.000Z"))]),
        ]);
        assert!(matches!(Deduplication::new(0).encode(&v), Err(RecodeError::NotApplicable(_))));
    }

    #[test]
    fn test_min_size_filters_small_subtrees() {
        let v = Value::parse(r#"[{"a": 1}, {"a": 1}]"#).unwrap();
        assert!(matches!(Deduplication::default().encode(&v), Err(RecodeError::NotApplicable(_))));
        let (registry, _) = encode(&v, 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_only_outermost_repeats_are_used() {
        let v = Value::parse(r#"[{"x": {"y": [1, 2, 3]}}, {"x": {"y": [1, 2, 3]}}]"#).unwrap();
        let (registry, body) = encode(&v, 0);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry[0].to_json_string().unwrap(), r#"{"x":{"y":[1,2,3]}}"#);
        assert_eq!(body.to_json_string().unwrap(), r#"[{"$ref":0},{"$ref":0}]"#);
    }

    #[test]
    fn test_marker_shaped_input_is_not_applicable() {
        let v = Value::parse(r#"[{"$ref": 0}, {"k": [1, 2]}, {"k": [1, 2]}]"#).unwrap();
        assert!(matches!(Deduplication::new(0).encode(&v), Err(RecodeError::NotApplicable(_))));
    }

    #[test]
    fn test_dangling_marker_is_left_alone() {
        let body = Value::parse(r#"[{"$ref": 3}, {"$ref": 0.5}, {"$ref": "0"}, {"$ref": 0}]"#).unwrap();
        let registry = vec![Value::parse(r#"{"k": 1}"#).unwrap()];
        let decoded = Deduplication::default().decode(&registry, &body).unwrap();
        assert_eq!(decoded.to_json_string().unwrap(), r#"[{"$ref":3},{"$ref":0.5},{"$ref":"0"},{"k":1}]"#);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let v = Value::from_entries([("x", Value::from(1))]);
        if let Value::Object(node) = &v {
            node.write().insert("self", v.clone());
        }
        assert!(matches!(Deduplication::new(0).encode(&v), Err(RecodeError::CircularReference)));
    }

    #[test]
    fn test_unserializable_leaf_is_fatal() {
        let v = Value::array(vec![Value::from(f64::NAN)]);
        let err = Deduplication::new(0).encode(&v).unwrap_err();
        assert!(err.is_fatal());
    }
}
