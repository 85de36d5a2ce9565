//! Cost estimator: single-pass structural analysis.
//!
//! The numbers here only bias which passes the pipeline attempts; every
//! accept/reject decision is made on measured cost.

use sp_core::walk::{self, Control, Event};
use sp_core::{json, Map, Node, Result, Value};

const QUOTES: usize = 2;
const BRACKETS: usize = 2;
/// Leading elements inspected when testing an array for a uniform key set.
const SCHEMA_SAMPLE: usize = 5;
/// `{"$f":[],"$r":[]}`
const SCHEMA_ENVELOPE_TAX: usize = 17;
/// `{"$k":{},"$b":}`
const DICTIONARY_ENVELOPE_TAX: usize = 15;
const DISTINCT_KEY_FRACTION: f64 = 0.3;
const AVG_TOKEN_LEN: f64 = 1.5;
const DATETIME_LEN: usize = 26;

/// Read-only facts about one value, computed fresh per call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    /// Estimated compact JSON size in bytes.
    pub estimated_bytes: usize,
    pub max_depth: usize,
    pub arrays: usize,
    pub objects: usize,
    pub longest_array: usize,
    pub total_keys: usize,
    pub total_key_chars: usize,
    /// Estimated bytes saved by schema separation.
    pub schema_savings: usize,
    /// Estimated bytes saved by key abbreviation.
    pub abbreviation_savings: usize,
}

impl Metrics {
    /// Arrays per object.
    pub fn array_density(&self) -> f64 {
        self.arrays as f64 / self.objects.max(1) as f64
    }
}

/// Analyse `value` in one traversal.
pub fn estimate(value: &Value) -> Result<Metrics> {
    let mut m = Metrics::default();

    walk::walk(value, |event| {
        match event {
            Event::Enter { value: Value::Array(node), depth } => {
                let items = node.read();
                m.arrays += 1;
                m.max_depth = m.max_depth.max(depth);
                m.longest_array = m.longest_array.max(items.len());
                m.estimated_bytes += BRACKETS + items.len().saturating_sub(1);
                m.schema_savings += uniform_row_savings(&items);
            }
            Event::Enter { value: Value::Object(node), depth } => {
                let map = node.read();
                m.objects += 1;
                m.max_depth = m.max_depth.max(depth);
                m.estimated_bytes += BRACKETS + map.len().saturating_sub(1);
            }
            Event::Key { key, .. } => {
                m.total_keys += 1;
                m.total_key_chars += key.len();
                m.estimated_bytes += key.len() + QUOTES + 1;
            }
            Event::Leaf { value, depth } => {
                m.max_depth = m.max_depth.max(depth);
                m.estimated_bytes += leaf_bytes(value);
            }
            Event::Enter { .. } | Event::Exit { .. } => {}
        }
        Ok(Control::Continue)
    })?;

    m.abbreviation_savings = abbreviation_savings(m.total_keys, m.total_key_chars);
    Ok(m)
}

fn leaf_bytes(value: &Value) -> usize {
    match value {
        Value::Null => 4,
        Value::Bool(true) => 4,
        Value::Bool(false) => 5,
        Value::Number(n) => {
            let mut scratch = String::new();
            json::write_number(&mut scratch, *n).map(|_| scratch.len()).unwrap_or(4)
        }
        Value::String(s) => s.len() + QUOTES,
        Value::DateTime(_) => DATETIME_LEN,
        Value::Array(_) | Value::Object(_) => 0,
    }
}

/// Saving for an array whose sampled leading objects share one key set.
fn uniform_row_savings(items: &[Value]) -> usize {
    if items.len() < 2 {
        return 0;
    }
    let Value::Object(first) = &items[0] else { return 0 };
    let head = first.read();
    let sample = &items[1..items.len().min(SCHEMA_SAMPLE)];
    if !sample.iter().all(|item| shares_keys(item, first, &head)) {
        return 0;
    }
    // Every row drops `"key":` per field; the field list pays `"key",` once.
    let per_row: usize = head.keys().map(|k| k.len() + QUOTES + 1).sum();
    let field_list: usize = head.keys().map(|k| k.len() + QUOTES + 1).sum();
    (items.len() * per_row).saturating_sub(field_list + SCHEMA_ENVELOPE_TAX)
}

fn shares_keys(item: &Value, first: &Node<Map>, head: &Map) -> bool {
    match item {
        Value::Object(node) => node.ptr_eq(first) || node.read().same_keys(head),
        _ => false,
    }
}

fn abbreviation_savings(total_keys: usize, total_key_chars: usize) -> usize {
    if total_keys == 0 {
        return 0;
    }
    let keys = total_keys as f64;
    let avg_len = total_key_chars as f64 / keys;
    let distinct = (keys * DISTINCT_KEY_FRACTION).ceil();
    let saved = total_key_chars as f64
        - keys * AVG_TOKEN_LEN
        - distinct * (avg_len + AVG_TOKEN_LEN + 6.0)
        - DICTIONARY_ENVELOPE_TAX as f64;
    saved.max(0.0).round() as usize
}
