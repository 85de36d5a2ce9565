//! Tree value model.
//!
//! Composites live behind shared [`Node`] handles, so cloning a [`Value`] is
//! shallow and the same array or object can appear at several places in a
//! tree (or, pathologically, inside itself). Traversals identify composites by
//! node identity; see [`crate::walk`].

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::Arc;

/// A composite payload that can hand its children over when it is released.
pub trait Composite {
    fn drain_children(&mut self, out: &mut Vec<Value>);
}

impl Composite for Vec<Value> {
    fn drain_children(&mut self, out: &mut Vec<Value>) {
        out.append(self);
    }
}

impl Composite for Map {
    fn drain_children(&mut self, out: &mut Vec<Value>) {
        out.extend(self.entries.drain(..).map(|(_, value)| value));
    }
}

/// Shared handle to a composite payload.
pub struct Node<T: Composite>(Arc<RwLock<T>>);

impl<T: Composite> Node<T> {
    pub fn new(inner: T) -> Self {
        Self(Arc::new(RwLock::new(inner)))
    }

    /// Identity of the underlying allocation; stable while any handle lives.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Move the children out if this is the last handle.
    fn release_into(&mut self, out: &mut Vec<Value>) {
        if let Some(lock) = Arc::get_mut(&mut self.0) {
            lock.get_mut().drain_children(out);
        }
    }
}

impl<T: Composite> Clone for Node<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

/// Releases descendants from a heap stack, so dropping a deep tree never
/// recurses. Every node popped off the stack is already empty when it drops.
impl<T: Composite> Drop for Node<T> {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.release_into(&mut pending);
        while let Some(value) = pending.pop() {
            match value {
                Value::Array(mut node) => node.release_into(&mut pending),
                Value::Object(mut node) => node.release_into(&mut pending),
                _ => {}
            }
        }
    }
}

/// Insertion-ordered map with unique keys.
#[derive(Clone, Default)]
pub struct Map {
    entries: IndexMap<String, Value>,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: IndexMap::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or overwrite. An overwritten key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Remove `key`, keeping the order of the rest.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Value) -> bool) {
        self.entries.retain(|k, v| keep(k, v));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values()
    }

    /// Same key set, regardless of order.
    pub fn same_keys(&self, other: &Map) -> bool {
        self.len() == other.len() && self.keys().all(|k| other.contains_key(k))
    }

    pub fn sort_keys(&mut self) {
        self.entries.sort_keys();
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Map {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut map = Map::with_capacity(iter.size_hint().0);
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl IntoIterator for Map {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// A JSON-model value. `DateTime` is an atomic leaf that is never traversed.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Array(Node<Vec<Value>>),
    Object(Node<Map>),
}

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Node::new(items))
    }

    pub fn object(map: Map) -> Self {
        Value::Object(Node::new(map))
    }

    pub fn from_entries<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::object(entries.into_iter().collect())
    }

    /// Node identity for composites, `None` for leaves.
    pub fn node_id(&self) -> Option<usize> {
        match self {
            Value::Array(node) => Some(node.id()),
            Value::Object(node) => Some(node.id()),
            _ => None,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Copy every composite into fresh nodes.
    pub fn deep_clone(&self) -> crate::Result<Value> {
        crate::walk::deep_clone(self)
    }

    /// Compact JSON text in insertion order.
    pub fn to_json_string(&self) -> crate::Result<String> {
        crate::json::to_string(self)
    }
}

/// Deep structural equality. Object comparison ignores key order.
/// Values that are cyclic through different nodes never compare equal in finite time.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self.clone(), other.clone())];
        while let Some((a, b)) = pending.pop() {
            match (&a, &b) {
                (Value::Null, Value::Null) => {}
                (Value::Bool(x), Value::Bool(y)) if x == y => {}
                (Value::Number(x), Value::Number(y)) if x == y => {}
                (Value::String(x), Value::String(y)) if x == y => {}
                (Value::DateTime(x), Value::DateTime(y)) if x == y => {}
                (Value::Array(x), Value::Array(y)) => {
                    if x.ptr_eq(y) {
                        continue;
                    }
                    let (xs, ys) = (x.read(), y.read());
                    if xs.len() != ys.len() {
                        return false;
                    }
                    pending.extend(xs.iter().cloned().zip(ys.iter().cloned()));
                }
                (Value::Object(x), Value::Object(y)) => {
                    if x.ptr_eq(y) {
                        continue;
                    }
                    let (xs, ys) = (x.read(), y.read());
                    if xs.len() != ys.len() {
                        return false;
                    }
                    for (key, value) in xs.iter() {
                        match ys.get(key) {
                            Some(other) => pending.push((value.clone(), other.clone())),
                            None => return false,
                        }
                    }
                }
                _ => return false,
            }
        }
        true
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_json_string() {
            Ok(text) => f.write_str(&text),
            Err(err) => write!(f, "<{err}>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(at: DateTime<Utc>) -> Self {
        Value::DateTime(at)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_insert_keeps_position() {
        let mut map = Map::new();
        map.insert("a", Value::from(1));
        map.insert("b", Value::from(2));
        let old = map.insert("a", Value::from(3));
        assert_eq!(old, Some(Value::from(1)));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(map.get("a"), Some(&Value::from(3)));
    }

    #[test]
    fn test_same_keys_ignores_order() {
        let a: Map = [("x", Value::Null), ("y", Value::Null)].into_iter().collect();
        let b: Map = [("y", Value::from(1)), ("x", Value::from(2))].into_iter().collect();
        let c: Map = [("x", Value::Null)].into_iter().collect();
        assert!(a.same_keys(&b));
        assert!(!a.same_keys(&c));
    }

    #[test]
    fn test_equality_is_deep_and_order_insensitive() {
        let a = Value::from_entries([("k", Value::from(vec![Value::from(1), Value::from("s")])), ("z", Value::Null)]);
        let b = Value::from_entries([("z", Value::Null), ("k", Value::from(vec![Value::from(1), Value::from("s")]))]);
        assert_eq!(a, b);
        let c = Value::from_entries([("z", Value::Null), ("k", Value::from(vec![Value::from(1)]))]);
        assert_ne!(a, c);
    }

    #[test]
    fn test_clone_shares_nodes() {
        let a = Value::array(vec![Value::from(1)]);
        let b = a.clone();
        assert_eq!(a.node_id(), b.node_id());
        if let Value::Array(node) = &a {
            node.write().push(Value::from(2));
        }
        assert_eq!(b, Value::array(vec![Value::from(1), Value::from(2)]));
    }

    #[test]
    fn test_wide_object_lookup_and_remove() {
        let mut map: Map = (0..20_000).map(|i| (format!("k{i}"), Value::from(i))).collect();
        assert_eq!(map.len(), 20_000);
        assert_eq!(map.get("k19999"), Some(&Value::from(19_999)));
        assert_eq!(map.remove("k0"), Some(Value::from(0)));
        assert_eq!(map.keys().next(), Some("k1"));
        assert!(!map.contains_key("k0"));
    }

    #[test]
    fn test_dropping_a_deep_chain_does_not_recurse() {
        let handle = std::thread::Builder::new()
            .stack_size(256 * 1024)
            .spawn(|| {
                let mut value = Value::from(0);
                for i in 0..200_000 {
                    value = if i % 2 == 0 {
                        Value::array(vec![value])
                    } else {
                        Value::from_entries([("next", value)])
                    };
                }
                drop(value);
            })
            .unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_dropping_one_handle_keeps_shared_children() {
        let shared = Value::array(vec![Value::from(1)]);
        let parent = Value::array(vec![shared.clone(), shared.clone()]);
        drop(parent);
        assert_eq!(shared, Value::array(vec![Value::from(1)]));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::from(true).type_name(), "boolean");
        assert_eq!(Value::array(vec![]).type_name(), "array");
        assert_eq!(Value::object(Map::new()).type_name(), "object");
    }
}
