//! Schema separation: arrays of same-keyed objects → one field list plus row vectors.

use sp_core::walk::{self, Control, Event, Rebuild};
use sp_core::{Map, RecodeError, Result, Value};

use crate::envelope::{Envelope, FIELDS_KEY, ROWS_KEY};

/// Fewer rows than this never amortise the field list.
pub const MIN_ROWS: usize = 2;

/// Keyed exactly like a schema record, whatever the contents.
fn has_record_keys(map: &Map) -> bool {
    map.len() == 2 && map.contains_key(FIELDS_KEY) && map.contains_key(ROWS_KEY)
}

/// A well-formed record: string fields, and rows that are arrays of matching width.
pub fn is_record(map: &Map) -> bool {
    if !has_record_keys(map) {
        return false;
    }
    let (Some(Value::Array(fields)), Some(Value::Array(rows))) = (map.get(FIELDS_KEY), map.get(ROWS_KEY)) else {
        return false;
    };
    let width = fields.read().len();
    fields.read().iter().all(|f| f.as_str().is_some())
        && rows.read().iter().all(|row| matches!(row, Value::Array(cells) if cells.read().len() == width))
}

/// True if any object in `value` is a well-formed record.
pub fn contains_records(value: &Value) -> Result<bool> {
    let mut found = false;
    walk::walk(value, |event| {
        if let Event::Enter { value: Value::Object(node), .. } = event {
            if is_record(&node.read()) {
                found = true;
                return Ok(Control::Break);
            }
        }
        Ok(Control::Continue)
    })?;
    Ok(found)
}

fn contains_record_keys(value: &Value) -> Result<bool> {
    let mut found = false;
    walk::walk(value, |event| {
        if let Event::Enter { value: Value::Object(node), .. } = event {
            if has_record_keys(&node.read()) {
                found = true;
                return Ok(Control::Break);
            }
        }
        Ok(Control::Continue)
    })?;
    Ok(found)
}

/// Build the record for `items`, or `None` unless every item is an object with the same key set.
fn separate(items: &[Value]) -> Option<Value> {
    if items.len() < MIN_ROWS {
        return None;
    }
    let Value::Object(first) = &items[0] else { return None };
    let fields: Vec<String> = first.read().keys().map(str::to_owned).collect();

    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        let Value::Object(node) = item else { return None };
        let map = node.read();
        // Rows already turned into records one level down must not be folded again.
        if map.len() != fields.len() || has_record_keys(&map) {
            return None;
        }
        let row = fields
            .iter()
            .map(|field| map.get(field).cloned())
            .collect::<Option<Vec<Value>>>()?;
        rows.push(Value::array(row));
    }

    Some(Value::from_entries([
        (FIELDS_KEY, Value::array(fields.into_iter().map(Value::String).collect())),
        (ROWS_KEY, Value::array(rows)),
    ]))
}

/// Expand a well-formed record back into its array of objects.
fn join(map: &Map) -> Option<Value> {
    if !is_record(map) {
        return None;
    }
    let (Some(Value::Array(fields)), Some(Value::Array(rows))) = (map.get(FIELDS_KEY), map.get(ROWS_KEY)) else {
        return None;
    };
    let fields: Vec<String> = fields.read().iter().filter_map(|f| f.as_str().map(str::to_owned)).collect();
    let rows = rows.read();
    let mut objects = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        let Value::Array(cells) = row else { return None };
        let cells = cells.read();
        objects.push(Value::from_entries(fields.iter().cloned().zip(cells.iter().cloned())));
    }
    Some(Value::array(objects))
}

struct Separator {
    records: usize,
}

impl Rebuild for Separator {
    fn finish_array(&mut self, items: Vec<Value>) -> Result<Value> {
        match separate(&items) {
            Some(record) => {
                self.records += 1;
                Ok(record)
            }
            None => Ok(Value::array(items)),
        }
    }
}

struct Joiner;

impl Rebuild for Joiner {
    fn finish_object(&mut self, map: Map) -> Result<Value> {
        Ok(join(&map).unwrap_or_else(|| Value::object(map)))
    }
}

/// Schema separation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaSeparation;

impl SchemaSeparation {
    pub fn encode(&self, value: &Value) -> Result<Envelope> {
        if contains_record_keys(value)? {
            return Err(RecodeError::not_applicable("input already holds schema-record-shaped objects"));
        }
        let mut separator = Separator { records: 0 };
        let body = walk::rebuild(value, &mut separator)?;
        if separator.records == 0 {
            return Err(RecodeError::not_applicable("no array of same-keyed objects"));
        }
        Ok(Envelope::Schema(body))
    }

    /// Expands every record, including records nested inside row values.
    pub fn decode(&self, body: &Value) -> Result<Value> {
        walk::rebuild(body, &mut Joiner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &Value) -> Value {
        match SchemaSeparation.encode(value).unwrap() {
            Envelope::Schema(body) => body,
            other => panic!("unexpected envelope {other:?}"),
        }
    }

    #[test]
    fn test_homogeneous_array() {
        let v = Value::parse(r#"[{"id": 1, "name": "A"}, {"id": 2, "name": "B"}]"#).unwrap();
        let body = encode(&v);
        assert_eq!(body.to_json_string().unwrap(), r#"{"$f":["id","name"],"$r":[[1,"A"],[2,"B"]]}"#);
        assert_eq!(SchemaSeparation.decode(&body).unwrap(), v);
    }

    #[test]
    fn test_field_order_follows_first_row() {
        let v = Value::parse(r#"[{"b": 1, "a": 2}, {"a": 3, "b": 4}]"#).unwrap();
        let body = encode(&v);
        assert_eq!(body.to_json_string().unwrap(), r#"{"$f":["b","a"],"$r":[[1,2],[4,3]]}"#);
        assert_eq!(SchemaSeparation.decode(&body).unwrap(), v);
    }

    #[test]
    fn test_extra_key_blocks_separation() {
        let v = Value::parse(r#"[{"id": 1, "name": "A"}, {"id": 2, "name": "B", "x": 0}]"#).unwrap();
        assert!(matches!(SchemaSeparation.encode(&v), Err(RecodeError::NotApplicable(_))));
    }

    #[test]
    fn test_same_size_different_keys_blocks_separation() {
        let v = Value::parse(r#"[{"id": 1, "name": "A"}, {"id": 2, "nick": "B"}]"#).unwrap();
        assert!(SchemaSeparation.encode(&v).is_err());
    }

    #[test]
    fn test_nested_records() {
        let v = Value::parse(
            r#"{"teams": [
                {"name": "red", "members": [{"id": 1, "age": 30}, {"id": 2, "age": 31}]},
                {"name": "blue", "members": [{"id": 3, "age": 40}, {"id": 4, "age": 41}]}
            ]}"#,
        )
        .unwrap();
        let body = encode(&v);
        assert_eq!(
            body.to_json_string().unwrap(),
            concat!(
                r#"{"teams":{"$f":["name","members"],"$r":["#,
                r#"["red",{"$f":["id","age"],"$r":[[1,30],[2,31]]}],"#,
                r#"["blue",{"$f":["id","age"],"$r":[[3,40],[4,41]]}]]}}"#
            )
        );
        assert_eq!(SchemaSeparation.decode(&body).unwrap(), v);
    }

    #[test]
    fn test_array_of_record_arrays_is_not_folded_twice() {
        let v = Value::parse(r#"[[{"a": 1}, {"a": 2}], [{"a": 3}, {"a": 4}]]"#).unwrap();
        let body = encode(&v);
        assert_eq!(body.to_json_string().unwrap(), r#"[{"$f":["a"],"$r":[[1],[2]]},{"$f":["a"],"$r":[[3],[4]]}]"#);
        assert_eq!(SchemaSeparation.decode(&body).unwrap(), v);
    }

    #[test]
    fn test_single_row_is_left_alone() {
        let v = Value::parse(r#"[{"id": 1}]"#).unwrap();
        assert!(SchemaSeparation.encode(&v).is_err());
    }

    #[test]
    fn test_record_shaped_input_is_not_applicable() {
        let v = Value::parse(r#"{"x": {"$f": [], "$r": []}, "y": [{"a": 1}, {"a": 2}]}"#).unwrap();
        assert!(matches!(SchemaSeparation.encode(&v), Err(RecodeError::NotApplicable(_))));
    }

    #[test]
    fn test_malformed_record_is_left_alone() {
        let v = Value::parse(r#"{"$f": ["a", "b"], "$r": [[1]]}"#).unwrap();
        assert!(!contains_records(&v).unwrap());
        assert_eq!(SchemaSeparation.decode(&v).unwrap(), v);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let v = Value::array(vec![]);
        if let Value::Array(node) = &v {
            node.write().push(v.clone());
        }
        assert!(matches!(SchemaSeparation.encode(&v), Err(RecodeError::CircularReference)));
    }
}
