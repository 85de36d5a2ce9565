//! Key abbreviation: object keys → short tokens, carried in a key dictionary.

use sp_core::walk::{self, Control, Event, Rebuild};
use sp_core::{RecodeError, Result, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::dictionary::{self, StaticDictionary};
use crate::envelope::{Envelope, KeyDictionary};

/// Keys at least this long always get a token.
const LONG_KEY: usize = 6;
/// Keys seen at least this often get a token once they are `MIN_FREQUENT_LEN` long.
const FREQUENT_KEY: usize = 3;
const MIN_FREQUENT_LEN: usize = 3;
/// `"token":"key",` in the dictionary, less the two strings.
const ENTRY_OVERHEAD: usize = 6;

/// The `index`-th token of `a, b, … z, aa, ab, …`.
pub fn token_for(index: usize) -> String {
    let mut n = index + 1;
    let mut out = Vec::new();
    while n > 0 {
        n -= 1;
        out.push(b'a' + (n % 26) as u8);
        n /= 26;
    }
    out.iter().rev().map(|&b| b as char).collect()
}

/// Which keys are worth a dynamic token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    /// Long or frequent keys.
    #[default]
    Standard,
    /// Additionally any key whose token pays for its dictionary entry.
    Aggressive,
}

impl Selection {
    fn selects(self, key: &str, count: usize) -> bool {
        let standard = key.len() >= LONG_KEY || (count >= FREQUENT_KEY && key.len() >= MIN_FREQUENT_LEN);
        match self {
            Selection::Standard => standard,
            Selection::Aggressive => standard || count >= 2,
        }
    }
}

/// Key frequencies in first-appearance order.
#[derive(Debug, Default)]
pub struct KeyStats {
    order: Vec<String>,
    counts: HashMap<String, usize>,
}

impl KeyStats {
    pub fn collect(value: &Value) -> Result<Self> {
        let mut stats = KeyStats::default();
        walk::walk(value, |event| {
            if let Event::Key { key, .. } = event {
                match stats.counts.get_mut(key) {
                    Some(count) => *count += 1,
                    None => {
                        stats.counts.insert(key.to_owned(), 1);
                        stats.order.push(key.to_owned());
                    }
                }
            }
            Ok(Control::Continue)
        })?;
        Ok(stats)
    }

    pub fn count(&self, key: &str) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.counts.contains_key(key)
    }

    pub fn distinct(&self) -> usize {
        self.order.len()
    }
}

/// Key renames for one encode call.
#[derive(Debug, Default)]
struct Plan {
    renames: HashMap<String, String>,
    dynamic: KeyDictionary,
}

impl Plan {
    /// `ambient` is the table a default decoder applies, when it differs from
    /// `dictionary`. Static renames are then listed like dynamic ones, and keys
    /// spelled like a token of either table are renamed.
    fn build(
        stats: &KeyStats,
        dictionary: &StaticDictionary,
        ambient: Option<&StaticDictionary>,
        selection: Selection,
    ) -> Self {
        let is_static_token =
            |candidate: &str| dictionary.is_token(candidate) || ambient.is_some_and(|a| a.is_token(candidate));
        let mut plan = Plan::default();
        let mut next = 0;
        // A dynamic token may not equal any key in the input or any static token.
        let free_token = |next: &mut usize| loop {
            let token = token_for(*next);
            if !stats.contains(&token) && !is_static_token(&token) {
                return token;
            }
            *next += 1;
        };

        for key in &stats.order {
            if let Some(token) = dictionary.token(key) {
                plan.renames.insert(key.clone(), token.to_owned());
                if ambient.is_some() {
                    plan.dynamic.push((token.to_owned(), key.clone()));
                }
                continue;
            }
            // A key spelled like a static token must be renamed or it would decode as one.
            let forced = is_static_token(key);
            let count = stats.count(key);
            if !forced && !selection.selects(key, count) {
                continue;
            }
            let token = free_token(&mut next);
            if !forced && !pays_off(&token, key, count) {
                continue;
            }
            next += 1;
            plan.renames.insert(key.clone(), token.clone());
            plan.dynamic.push((token, key.clone()));
        }
        plan
    }

    fn is_empty(&self) -> bool {
        self.renames.is_empty()
    }
}

fn pays_off(token: &str, key: &str, count: usize) -> bool {
    token.len() < key.len() && count * (key.len() - token.len()) > key.len() + token.len() + ENTRY_OVERHEAD
}

struct Renamer<'a> {
    plan: &'a Plan,
    booleans_as_numbers: bool,
}

impl Rebuild for Renamer<'_> {
    fn key(&mut self, key: &str) -> Result<String> {
        Ok(self.plan.renames.get(key).cloned().unwrap_or_else(|| key.to_owned()))
    }

    fn leaf(&mut self, value: &Value) -> Result<Value> {
        Ok(match value {
            Value::Bool(b) if self.booleans_as_numbers => Value::Number(if *b { 1.0 } else { 0.0 }),
            other => other.clone(),
        })
    }
}

struct Expander<'a> {
    dynamic: HashMap<&'a str, &'a str>,
    statics: &'a StaticDictionary,
}

impl Rebuild for Expander<'_> {
    fn key(&mut self, key: &str) -> Result<String> {
        let original = self.dynamic.get(key).copied().or_else(|| self.statics.key(key));
        Ok(original.unwrap_or(key).to_owned())
    }
}

/// Key abbreviation pass.
#[derive(Debug, Clone)]
pub struct KeyAbbreviation {
    dictionary: Arc<StaticDictionary>,
    selection: Selection,
    booleans_as_numbers: bool,
}

impl KeyAbbreviation {
    pub fn new(dictionary: Arc<StaticDictionary>) -> Self {
        Self { dictionary, selection: Selection::Standard, booleans_as_numbers: false }
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub(crate) fn with_booleans_as_numbers(mut self, enabled: bool) -> Self {
        self.booleans_as_numbers = enabled;
        self
    }

    pub fn dictionary(&self) -> &Arc<StaticDictionary> {
        &self.dictionary
    }

    /// Tokens of the process-wide default table stay implicit. With any other
    /// table the envelope lists every rename, so [`crate::restore`] reads it too.
    pub fn encode(&self, value: &Value) -> Result<Envelope> {
        let stats = KeyStats::collect(value)?;
        let ambient = dictionary::current();
        let portable = !Arc::ptr_eq(&ambient, &self.dictionary) && *ambient != *self.dictionary;
        let plan = Plan::build(&stats, &self.dictionary, portable.then_some(ambient.as_ref()), self.selection);
        if plan.is_empty() && !self.booleans_as_numbers {
            return Err(RecodeError::not_applicable("no keys worth abbreviating"));
        }
        let body = walk::rebuild(
            value,
            &mut Renamer { plan: &plan, booleans_as_numbers: self.booleans_as_numbers },
        )?;
        Ok(Envelope::Abbreviated { dictionary: plan.dynamic, body })
    }

    pub fn decode(&self, dictionary: &KeyDictionary, body: &Value) -> Result<Value> {
        let tokens: HashSet<&str> = dictionary.iter().map(|(t, _)| t.as_str()).collect();
        if tokens.len() != dictionary.len() {
            return Err(RecodeError::not_applicable("key dictionary repeats a token"));
        }
        let mut expander = Expander {
            dynamic: dictionary.iter().map(|(t, k)| (t.as_str(), k.as_str())).collect(),
            statics: &self.dictionary,
        };
        walk::rebuild(body, &mut expander)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &Value) -> (KeyDictionary, Value) {
        let pass = KeyAbbreviation::new(Arc::new(StaticDictionary::builtin()));
        match pass.encode(value).unwrap() {
            Envelope::Abbreviated { dictionary, body } => (dictionary, body),
            other => panic!("unexpected envelope {other:?}"),
        }
    }

    fn roundtrip(value: &Value) -> Value {
        let pass = KeyAbbreviation::new(Arc::new(StaticDictionary::builtin()));
        let (dictionary, body) = encode(value);
        pass.decode(&dictionary, &body).unwrap()
    }

    #[test]
    fn test_token_sequence() {
        assert_eq!(token_for(0), "a");
        assert_eq!(token_for(25), "z");
        assert_eq!(token_for(26), "aa");
        assert_eq!(token_for(27), "ab");
        assert_eq!(token_for(26 + 26 * 26), "aaa");
    }

    #[test]
    fn test_long_keys_get_tokens() {
        let v = Value::parse(r#"{"identifier": 1, "nested": {"identifier": 2, "id": 3}}"#).unwrap();
        let (dictionary, body) = encode(&v);
        assert_eq!(dictionary, vec![("a".to_string(), "identifier".to_string())]);
        assert_eq!(
            body.to_json_string().unwrap(),
            r#"{"a":1,"nested":{"a":2,"id":3}}"#
        );
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn test_static_tokens_are_not_listed() {
        let v = Value::parse(r#"{"role": "user", "content": "hi"}"#).unwrap();
        let (dictionary, body) = encode(&v);
        assert!(dictionary.is_empty());
        assert_eq!(body.to_json_string().unwrap(), r#"{"R":"user","C":"hi"}"#);
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn test_key_spelled_like_static_token_survives() {
        let v = Value::parse(r#"{"role": "user", "R": "raw", "C": 1}"#).unwrap();
        let (dictionary, _) = encode(&v);
        let renamed: Vec<&str> = dictionary.iter().map(|(_, k)| k.as_str()).collect();
        assert_eq!(renamed, vec!["R", "C"]);
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn test_tokens_skip_existing_keys() {
        let v = Value::parse(r#"{"a": 1, "b": 2, "description_text": 3, "n": {"description_text": 4}}"#).unwrap();
        let (dictionary, _) = encode(&v);
        assert_eq!(dictionary, vec![("c".to_string(), "description_text".to_string())]);
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn test_other_table_is_listed_in_envelope() {
        let custom = Arc::new(StaticDictionary::new([("identifier", "ID")]).unwrap());
        let v = Value::parse(r#"{"identifier": 1, "R": 2, "nested": {"identifier": 3}}"#).unwrap();
        let Envelope::Abbreviated { dictionary, body } = KeyAbbreviation::new(custom).encode(&v).unwrap() else {
            panic!("expected dictionary envelope");
        };
        assert!(dictionary.contains(&("ID".to_string(), "identifier".to_string())));
        // "R" is a token of the default table, so it cannot stay as it is.
        assert!(dictionary.iter().any(|(token, key)| key == "R" && token != "R"));
        let default_decoder = KeyAbbreviation::new(Arc::new(StaticDictionary::builtin()));
        assert_eq!(default_decoder.decode(&dictionary, &body).unwrap(), v);
    }

    #[test]
    fn test_short_rare_keys_pass_through() {
        let v = Value::parse(r#"{"ab": 1, "xyz": 2}"#).unwrap();
        let pass = KeyAbbreviation::new(Arc::new(StaticDictionary::empty()));
        assert!(matches!(pass.encode(&v), Err(RecodeError::NotApplicable(_))));
    }

    #[test]
    fn test_aggressive_selects_more() {
        let v = Value::array((0..10).map(|i| Value::from_entries([("ab", Value::from(i))])).collect());
        let standard = KeyAbbreviation::new(Arc::new(StaticDictionary::empty()));
        assert!(matches!(standard.encode(&v), Err(RecodeError::NotApplicable(_))));
        let aggressive = standard.with_selection(Selection::Aggressive);
        let Envelope::Abbreviated { dictionary, .. } = aggressive.encode(&v).unwrap() else {
            panic!("expected dictionary envelope");
        };
        assert_eq!(dictionary, vec![("a".to_string(), "ab".to_string())]);
    }

    #[test]
    fn test_values_untouched() {
        let v = Value::parse(r#"{"description": ["description", true, null, 1.5]}"#).unwrap();
        let (_, body) = encode(&v);
        assert_eq!(body.to_json_string().unwrap(), r#"{"D":["description",true,null,1.5]}"#);
    }

    #[test]
    fn test_encode_does_not_mutate_input() {
        let v = Value::parse(r#"{"description": {"identifier": 1}}"#).unwrap();
        let before = v.to_json_string().unwrap();
        encode(&v);
        assert_eq!(v.to_json_string().unwrap(), before);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let v = Value::from_entries([("identifier", Value::from(1))]);
        if let Value::Object(node) = &v {
            node.write().insert("self", v.clone());
        }
        let pass = KeyAbbreviation::new(Arc::new(StaticDictionary::builtin()));
        assert!(matches!(pass.encode(&v), Err(RecodeError::CircularReference)));
    }
}
