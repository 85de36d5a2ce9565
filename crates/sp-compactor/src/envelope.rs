//! Envelope shapes produced by the encoding passes.

use sp_core::{Map, Result, Value};

use crate::schema;

pub const DICTIONARY_KEY: &str = "$k";
pub const BODY_KEY: &str = "$b";
pub const FIELDS_KEY: &str = "$f";
pub const ROWS_KEY: &str = "$r";
pub const REGISTRY_KEY: &str = "$d";
pub const REF_KEY: &str = "$ref";
pub const TEXT_KEY: &str = "$t";
pub const ESCAPE_KEY: &str = "$e";

/// `(token, original key)` pairs in allocation order.
pub type KeyDictionary = Vec<(String, String)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    Passthrough,
    Abbreviated,
    Schema,
    Deduplicated,
    Serialized,
    Escaped,
}

/// Output of one encoding pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Passthrough(Value),
    /// `{"$k": {token: key}, "$b": body}`. Static-dictionary tokens are not listed.
    Abbreviated { dictionary: KeyDictionary, body: Value },
    /// A body with `{"$f": fields, "$r": rows}` records anywhere inside it.
    Schema(Value),
    /// `{"$d": [entries], "$b": body}`, body holding `{"$ref": index}` markers.
    Deduplicated { registry: Vec<Value>, body: Value },
    /// `{"$t": text}`.
    Serialized(String),
    /// `{"$e": body}`: a payload that itself looked like an envelope, every
    /// `$`-prefixed key of it escaped. Always the innermost layer.
    Escaped(Value),
}

impl Envelope {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Envelope::Passthrough(_) => EnvelopeKind::Passthrough,
            Envelope::Abbreviated { .. } => EnvelopeKind::Abbreviated,
            Envelope::Schema(_) => EnvelopeKind::Schema,
            Envelope::Deduplicated { .. } => EnvelopeKind::Deduplicated,
            Envelope::Serialized(_) => EnvelopeKind::Serialized,
            Envelope::Escaped(_) => EnvelopeKind::Escaped,
        }
    }

    /// The wire form of this envelope.
    pub fn into_value(self) -> Value {
        match self {
            Envelope::Passthrough(value) | Envelope::Schema(value) => value,
            Envelope::Abbreviated { dictionary, body } => {
                let dictionary: Map = dictionary
                    .into_iter()
                    .map(|(token, key)| (token, Value::String(key)))
                    .collect();
                Value::from_entries([
                    (DICTIONARY_KEY, Value::object(dictionary)),
                    (BODY_KEY, body),
                ])
            }
            Envelope::Deduplicated { registry, body } => Value::from_entries([
                (REGISTRY_KEY, Value::array(registry)),
                (BODY_KEY, body),
            ]),
            Envelope::Serialized(text) => Value::from_entries([(TEXT_KEY, Value::String(text))]),
            Envelope::Escaped(body) => Value::from_entries([(ESCAPE_KEY, body)]),
        }
    }

    /// Classify a wire value by its outermost shape.
    ///
    /// Priority: key dictionary, then schema records (searched anywhere, since
    /// they can sit deep below the root), then dedup registry, then serialized
    /// text, then an escaped payload. Anything else is a passthrough.
    pub fn sniff(value: &Value) -> Result<Envelope> {
        if let Some(envelope) = as_abbreviated(value) {
            return Ok(envelope);
        }
        if schema::contains_records(value)? {
            return Ok(Envelope::Schema(value.clone()));
        }
        if let Some(envelope) = as_deduplicated(value) {
            return Ok(envelope);
        }
        if let Some(envelope) = as_serialized(value) {
            return Ok(envelope);
        }
        if let Some(envelope) = as_escaped(value) {
            return Ok(envelope);
        }
        Ok(Envelope::Passthrough(value.clone()))
    }
}

fn as_abbreviated(value: &Value) -> Option<Envelope> {
    let Value::Object(node) = value else { return None };
    let map = node.read();
    if map.len() != 2 {
        return None;
    }
    let (Some(Value::Object(dictionary)), Some(body)) = (map.get(DICTIONARY_KEY), map.get(BODY_KEY)) else {
        return None;
    };
    let dictionary = dictionary
        .read()
        .iter()
        .map(|(token, key)| key.as_str().map(|key| (token.to_owned(), key.to_owned())))
        .collect::<Option<KeyDictionary>>()?;
    Some(Envelope::Abbreviated { dictionary, body: body.clone() })
}

fn as_deduplicated(value: &Value) -> Option<Envelope> {
    let Value::Object(node) = value else { return None };
    let map = node.read();
    if map.len() != 2 {
        return None;
    }
    let (Some(Value::Array(registry)), Some(body)) = (map.get(REGISTRY_KEY), map.get(BODY_KEY)) else {
        return None;
    };
    let registry = registry.read().clone();
    Some(Envelope::Deduplicated { registry, body: body.clone() })
}

fn as_serialized(value: &Value) -> Option<Envelope> {
    let Value::Object(node) = value else { return None };
    let map = node.read();
    match (map.len(), map.get(TEXT_KEY)) {
        (1, Some(Value::String(text))) => Some(Envelope::Serialized(text.clone())),
        _ => None,
    }
}

fn as_escaped(value: &Value) -> Option<Envelope> {
    let Value::Object(node) = value else { return None };
    let map = node.read();
    if map.len() != 1 {
        return None;
    }
    map.get(ESCAPE_KEY).map(|body| Envelope::Escaped(body.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbreviated_wire_shape() {
        let envelope = Envelope::Abbreviated {
            dictionary: vec![("a".into(), "description".into())],
            body: Value::from_entries([("a", Value::from("x"))]),
        };
        let wire = envelope.clone().into_value();
        assert_eq!(wire.to_json_string().unwrap(), r#"{"$k":{"a":"description"},"$b":{"a":"x"}}"#);
        assert_eq!(Envelope::sniff(&wire).unwrap(), envelope);
    }

    #[test]
    fn test_dictionary_with_non_string_values_is_not_an_envelope() {
        let wire = Value::parse(r#"{"$k": {"a": 1}, "$b": {}}"#).unwrap();
        assert_eq!(Envelope::sniff(&wire).unwrap().kind(), EnvelopeKind::Passthrough);
    }

    #[test]
    fn test_sniff_dedup_and_serialized() {
        let dedup = Value::parse(r#"{"$d": [{"x": 1}], "$b": [{"$ref": 0}]}"#).unwrap();
        assert_eq!(Envelope::sniff(&dedup).unwrap().kind(), EnvelopeKind::Deduplicated);
        let text = Value::parse(r#"{"$t": "[1,2]"}"#).unwrap();
        assert_eq!(Envelope::sniff(&text).unwrap(), Envelope::Serialized("[1,2]".into()));
    }

    #[test]
    fn test_sniff_escaped() {
        let wire = Value::parse(r#"{"$e": {"$$t": "x"}}"#).unwrap();
        let Envelope::Escaped(body) = Envelope::sniff(&wire).unwrap() else { panic!("expected escaped") };
        assert_eq!(body.to_json_string().unwrap(), r#"{"$$t":"x"}"#);
        assert_eq!(Envelope::Escaped(body).into_value(), wire);
    }

    #[test]
    fn test_sniff_finds_nested_schema_record() {
        let wire = Value::parse(r#"{"data": {"list": {"$f": ["id"], "$r": [[1], [2]]}}}"#).unwrap();
        assert_eq!(Envelope::sniff(&wire).unwrap().kind(), EnvelopeKind::Schema);
    }

    #[test]
    fn test_plain_values_pass_through() {
        for text in [r#"{"a": 1}"#, "[1, 2]", "\"s\"", "null", r#"{"$t": 5}"#] {
            let value = Value::parse(text).unwrap();
            assert_eq!(Envelope::sniff(&value).unwrap(), Envelope::Passthrough(value.clone()));
        }
    }
}
