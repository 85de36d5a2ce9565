//! JSON text and `serde_json` interop for [`Value`].

use chrono::SecondsFormat;
use serde_json::Value as Json;
use std::fmt::Write as _;

use crate::error::{RecodeError, Result};
use crate::value::{Map, Value};
use crate::walk::{self, Control, Event, Rebuild};

/// Append a number the way JSON writers in the JS world print it.
pub fn write_number(out: &mut String, n: f64) -> Result<()> {
    if !n.is_finite() {
        return Err(RecodeError::UnserializableValue(format!("non-finite number {n}")));
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        let _ = write!(out, "{}", n as i64);
    } else {
        out.push_str(&serde_json::to_string(&n)?);
    }
    Ok(())
}

pub fn write_str(out: &mut String, s: &str) -> Result<()> {
    out.push_str(&serde_json::to_string(s)?);
    Ok(())
}

/// Append the text of a leaf value.
pub fn write_leaf(out: &mut String, value: &Value) -> Result<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(out, *n)?,
        Value::String(s) => write_str(out, s)?,
        Value::DateTime(at) => write_str(out, &at.to_rfc3339_opts(SecondsFormat::Millis, true))?,
        Value::Array(_) | Value::Object(_) => {
            return Err(RecodeError::UnserializableValue(format!(
                "{} is not a leaf",
                value.type_name()
            )))
        }
    }
    Ok(())
}

/// Compact JSON in insertion order.
pub fn to_string(value: &Value) -> Result<String> {
    let mut out = String::new();
    // One flag per open container: has it emitted a member yet?
    let mut open: Vec<bool> = Vec::new();
    let mut after_key = false;

    walk::walk(value, |event| {
        match event {
            Event::Enter { value, .. } | Event::Leaf { value, .. } => {
                if after_key {
                    after_key = false;
                } else if let Some(started) = open.last_mut() {
                    if *started {
                        out.push(',');
                    }
                    *started = true;
                }
                match value {
                    Value::Array(_) => {
                        out.push('[');
                        open.push(false);
                    }
                    Value::Object(_) => {
                        out.push('{');
                        open.push(false);
                    }
                    leaf => write_leaf(&mut out, leaf)?,
                }
            }
            Event::Key { key, .. } => {
                if let Some(started) = open.last_mut() {
                    if *started {
                        out.push(',');
                    }
                    *started = true;
                }
                write_str(&mut out, key)?;
                out.push(':');
                after_key = true;
            }
            Event::Exit { value, .. } => {
                open.pop();
                out.push(if matches!(value, Value::Array(_)) { ']' } else { '}' });
            }
        }
        Ok(Control::Continue)
    })?;
    Ok(out)
}

struct SortKeys;

impl Rebuild for SortKeys {
    fn finish_object(&mut self, mut map: Map) -> Result<Value> {
        map.sort_keys();
        Ok(Value::object(map))
    }
}

/// Deterministic, key-order-independent rendering.
pub fn to_canonical_string(value: &Value) -> Result<String> {
    to_string(&walk::rebuild(value, &mut SortKeys)?)
}

enum Open {
    Array(Vec<Json>),
    Object(serde_json::Map<String, Json>, String),
}

/// Convert into a `serde_json::Value`. Date-times become ISO-8601 strings.
pub fn to_json(value: &Value) -> Result<Json> {
    let mut stack: Vec<Open> = Vec::new();
    let mut result = None;

    walk::walk(value, |event| {
        let finished = match event {
            Event::Enter { value, .. } => {
                stack.push(match value {
                    Value::Array(node) => Open::Array(Vec::with_capacity(node.read().len())),
                    _ => Open::Object(serde_json::Map::new(), String::new()),
                });
                None
            }
            Event::Key { key, .. } => {
                if let Some(Open::Object(_, pending)) = stack.last_mut() {
                    *pending = key.to_owned();
                }
                None
            }
            Event::Leaf { value, .. } => Some(leaf_to_json(value)?),
            Event::Exit { .. } => match stack.pop() {
                Some(Open::Array(items)) => Some(Json::Array(items)),
                Some(Open::Object(map, _)) => Some(Json::Object(map)),
                None => None,
            },
        };
        if let Some(json) = finished {
            match stack.last_mut() {
                Some(Open::Array(items)) => items.push(json),
                Some(Open::Object(map, pending)) => {
                    map.insert(std::mem::take(pending), json);
                }
                None => result = Some(json),
            }
        }
        Ok(Control::Continue)
    })?;
    Ok(result.unwrap_or(Json::Null))
}

fn leaf_to_json(value: &Value) -> Result<Json> {
    Ok(match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => serde_json::Number::from_f64(*n)
            .map(Json::Number)
            .ok_or_else(|| RecodeError::UnserializableValue(format!("non-finite number {n}")))?,
        Value::String(s) => Json::String(s.clone()),
        Value::DateTime(at) => Json::String(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        Value::Array(_) | Value::Object(_) => Json::Null,
    })
}

enum Frame {
    Array(Vec<Value>, std::vec::IntoIter<Json>),
    Object(Map, serde_json::map::IntoIter, String),
}

enum Opened {
    Leaf(Value),
    Frame(Frame),
}

impl Frame {
    fn open(json: Json) -> Opened {
        match json {
            Json::Null => Opened::Leaf(Value::Null),
            Json::Bool(b) => Opened::Leaf(Value::Bool(b)),
            Json::Number(n) => Opened::Leaf(Value::Number(n.as_f64().unwrap_or_default())),
            Json::String(s) => Opened::Leaf(Value::String(s)),
            Json::Array(items) => {
                Opened::Frame(Frame::Array(Vec::with_capacity(items.len()), items.into_iter()))
            }
            Json::Object(map) => Opened::Frame(Frame::Object(
                Map::with_capacity(map.len()),
                map.into_iter(),
                String::new(),
            )),
        }
    }

    fn attach(&mut self, value: Value) {
        match self {
            Frame::Array(items, _) => items.push(value),
            Frame::Object(map, _, key) => {
                map.insert(std::mem::take(key), value);
            }
        }
    }

    fn next_child(&mut self) -> Option<Json> {
        match self {
            Frame::Array(_, rest) => rest.next(),
            Frame::Object(_, rest, key) => rest.next().map(|(k, v)| {
                *key = k;
                v
            }),
        }
    }

    fn close(self) -> Value {
        match self {
            Frame::Array(items, _) => Value::array(items),
            Frame::Object(map, _, _) => Value::object(map),
        }
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        let mut stack: Vec<Frame> = Vec::new();
        let mut next = Some(json);
        loop {
            let mut done = match next.take().map(Frame::open) {
                Some(Opened::Leaf(value)) => Some(value),
                Some(Opened::Frame(frame)) => {
                    stack.push(frame);
                    None
                }
                None => None,
            };
            loop {
                if let Some(value) = done.take() {
                    match stack.last_mut() {
                        Some(frame) => frame.attach(value),
                        None => return value,
                    }
                }
                let Some(frame) = stack.last_mut() else {
                    return Value::Null;
                };
                match frame.next_child() {
                    Some(child) => {
                        next = Some(child);
                        break;
                    }
                    None => done = stack.pop().map(Frame::close),
                }
            }
        }
    }
}

/// Deepest array/object nesting [`Value::parse`] reads back; the parser's
/// recursion limit rejects anything deeper.
pub const MAX_PARSE_NESTING: usize = 127;

/// Deepest array/object nesting in `value`, `0` for a leaf.
pub fn nesting(value: &Value) -> Result<usize> {
    let mut deepest = 0;
    walk::walk(value, |event| {
        if let Event::Enter { depth, .. } = event {
            deepest = deepest.max(depth + 1);
        }
        Ok(Control::Continue)
    })?;
    Ok(deepest)
}

impl Value {
    /// Parse JSON text, keeping object key order. Nesting deeper than
    /// [`MAX_PARSE_NESTING`] is a `Serialization` error.
    pub fn parse(text: &str) -> Result<Value> {
        Ok(serde_json::from_str::<Json>(text)?.into())
    }
}
