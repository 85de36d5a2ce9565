//! Static key dictionary: fixed key → token assignments for common payload shapes.
//!
//! Tokens of the process-wide default are never written into an envelope, so
//! the decoder must see the same default the encoder saw. Envelopes built
//! with any other table list their renames in full.

use parking_lot::RwLock;
use sp_core::{RecodeError, Result};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

/// Keys that show up in nearly every chat / tool-calling payload.
const BUILTIN: &[(&str, &str)] = &[
    ("messages", "M"),
    ("message", "Ms"),
    ("role", "R"),
    ("content", "C"),
    ("type", "T"),
    ("text", "X"),
    ("name", "N"),
    ("model", "Mo"),
    ("choices", "Ch"),
    ("tool_calls", "TC"),
    ("tool_call_id", "TI"),
    ("tools", "To"),
    ("function", "F"),
    ("arguments", "A"),
    ("parameters", "P"),
    ("properties", "Pr"),
    ("description", "D"),
    ("required", "Rq"),
    ("metadata", "Md"),
    ("timestamp", "Ts"),
    ("created_at", "Ca"),
    ("updated_at", "Ua"),
    ("status", "S"),
    ("value", "V"),
    ("index", "I"),
    ("input", "In"),
    ("output", "O"),
    ("image_url", "IU"),
    ("finish_reason", "FR"),
    ("usage", "U"),
    ("prompt_tokens", "PT"),
    ("completion_tokens", "CT"),
    ("total_tokens", "TT"),
    ("temperature", "Te"),
    ("max_tokens", "MT"),
];

/// A bijective key ↔ token table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticDictionary {
    to_token: HashMap<String, String>,
    to_key: HashMap<String, String>,
}

impl StaticDictionary {
    /// Build from `(key, token)` pairs. Fails unless both sides are unique and
    /// non-empty. Tokens may not start with `$`, the prefix of every wire key.
    pub fn new<K, T>(pairs: impl IntoIterator<Item = (K, T)>) -> Result<Self>
    where
        K: Into<String>,
        T: Into<String>,
    {
        let mut dictionary = Self::default();
        for (key, token) in pairs {
            let (key, token) = (key.into(), token.into());
            if key.is_empty() || token.is_empty() {
                return Err(RecodeError::InvalidDictionary("empty key or token".into()));
            }
            if token.starts_with('$') {
                return Err(RecodeError::InvalidDictionary(format!("token {token:?} looks like a wire key")));
            }
            if dictionary.to_token.contains_key(&key) {
                return Err(RecodeError::InvalidDictionary(format!("duplicate key {key:?}")));
            }
            if dictionary.to_key.contains_key(&token) {
                return Err(RecodeError::InvalidDictionary(format!("duplicate token {token:?}")));
            }
            dictionary.to_key.insert(token.clone(), key.clone());
            dictionary.to_token.insert(key, token);
        }
        Ok(dictionary)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        Self {
            to_token: BUILTIN.iter().map(|(k, t)| (k.to_string(), t.to_string())).collect(),
            to_key: BUILTIN.iter().map(|(k, t)| (t.to_string(), k.to_string())).collect(),
        }
    }

    pub fn token(&self, key: &str) -> Option<&str> {
        self.to_token.get(key).map(String::as_str)
    }

    pub fn key(&self, token: &str) -> Option<&str> {
        self.to_key.get(token).map(String::as_str)
    }

    pub fn is_token(&self, candidate: &str) -> bool {
        self.to_key.contains_key(candidate)
    }

    pub fn len(&self) -> usize {
        self.to_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_token.is_empty()
    }
}

static DEFAULT: LazyLock<RwLock<Arc<StaticDictionary>>> =
    LazyLock::new(|| RwLock::new(Arc::new(StaticDictionary::builtin())));

/// The process-wide default dictionary.
pub fn current() -> Arc<StaticDictionary> {
    DEFAULT.read().clone()
}

/// Replace the process-wide default, returning the previous one.
pub fn install(dictionary: Arc<StaticDictionary>) -> Arc<StaticDictionary> {
    std::mem::replace(&mut *DEFAULT.write(), dictionary)
}

/// Restores the previous process-wide default when dropped.
#[must_use = "the previous dictionary is restored as soon as the guard is dropped"]
pub struct ScopedDictionary {
    previous: Option<Arc<StaticDictionary>>,
}

/// Install `dictionary` as the process-wide default until the guard drops.
pub fn scoped(dictionary: Arc<StaticDictionary>) -> ScopedDictionary {
    ScopedDictionary { previous: Some(install(dictionary)) }
}

impl Drop for ScopedDictionary {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            install(previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_is_bijective() {
        let rebuilt = StaticDictionary::new(BUILTIN.iter().copied()).unwrap();
        assert_eq!(rebuilt, StaticDictionary::builtin());
        assert_eq!(rebuilt.len(), BUILTIN.len());
    }

    #[test]
    fn test_lookup_both_ways() {
        let d = StaticDictionary::builtin();
        assert_eq!(d.token("content"), Some("C"));
        assert_eq!(d.key("C"), Some("content"));
        assert!(d.is_token("R"));
        assert!(!d.is_token("role"));
        assert_eq!(d.token("unknown"), None);
    }

    #[test]
    fn test_rejects_duplicate_tokens() {
        let err = StaticDictionary::new([("alpha", "a"), ("beta", "a")]).unwrap_err();
        assert!(matches!(err, RecodeError::InvalidDictionary(_)));
        assert!(StaticDictionary::new([("alpha", "a"), ("alpha", "b")]).is_err());
        assert!(StaticDictionary::new([("", "a")]).is_err());
        assert!(StaticDictionary::new([("body", "$b")]).is_err());
        assert!(StaticDictionary::new([("$schema", "S")]).is_ok());
    }

    #[test]
    fn test_scoped_override_is_restored() {
        let before = current();
        {
            // Same table in a fresh allocation, so concurrent tests see identical content.
            let replacement = Arc::new(StaticDictionary::builtin());
            let _guard = scoped(replacement.clone());
            assert!(Arc::ptr_eq(&current(), &replacement));
        }
        assert!(Arc::ptr_eq(&current(), &before));
    }
}
