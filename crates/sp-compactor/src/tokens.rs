//! Token-count oracle.
//!
//! Text is split with a BPE-style pre-tokenizer pattern and every piece is
//! charged by the average characters-per-token of the chosen encoding. The
//! count is an estimate, close enough to compare two spellings of one payload.

use regex::Regex;
use sp_core::{Result, Value};
use std::sync::LazyLock;
use tracing::debug;

static PRE_TOKENIZER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'(?:[sdmt]|ll|ve|re)| ?\p{L}+|\p{N}{1,3}| ?[^\s\p{L}\p{N}]+|\s+").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Cl100k,
    O200k,
    P50k,
    R50k,
}

impl Encoding {
    /// Resolve an encoding or model name. Unknown names fall back to `cl100k_base`.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim().to_ascii_lowercase();
        match name.as_str() {
            "cl100k_base" => return Self::Cl100k,
            "o200k_base" => return Self::O200k,
            "p50k_base" | "p50k_edit" => return Self::P50k,
            "r50k_base" | "gpt2" => return Self::R50k,
            _ => {}
        }
        if ["gpt-4o", "gpt-4.1", "gpt-5", "o1", "o3", "o4"].iter().any(|p| name.starts_with(p)) {
            Self::O200k
        } else if ["gpt-4", "gpt-3.5", "text-embedding-3", "text-embedding-ada"].iter().any(|p| name.starts_with(p)) {
            Self::Cl100k
        } else if ["text-davinci-002", "text-davinci-003", "code-"].iter().any(|p| name.starts_with(p)) {
            Self::P50k
        } else if ["davinci", "curie", "babbage", "ada"].iter().any(|p| name.starts_with(p)) {
            Self::R50k
        } else {
            debug!(encoding = %name, "unknown token encoding, using cl100k_base");
            Self::Cl100k
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Cl100k => "cl100k_base",
            Self::O200k => "o200k_base",
            Self::P50k => "p50k_base",
            Self::R50k => "r50k_base",
        }
    }

    fn chars_per_token(self) -> f64 {
        match self {
            Self::Cl100k => 4.0,
            Self::O200k => 4.4,
            Self::P50k => 3.6,
            Self::R50k => 3.4,
        }
    }

    /// Estimated token count of `text`.
    pub fn count(self, text: &str) -> usize {
        let per_token = self.chars_per_token();
        PRE_TOKENIZER
            .find_iter(text)
            .map(|piece| (piece.as_str().chars().count() as f64 / per_token).ceil().max(1.0) as usize)
            .sum()
    }
}

pub fn count_tokens(text: &str, encoding: &str) -> usize {
    Encoding::from_name(encoding).count(text)
}

/// Token count of the compact JSON form of `value`.
pub fn count_value_tokens(value: &Value, encoding: &str) -> Result<usize> {
    Ok(count_tokens(&value.to_json_string()?, encoding))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sp_core::RecodeError;

    #[test]
    fn test_empty_text() {
        assert_eq!(count_tokens("", "cl100k_base"), 0);
    }

    #[test]
    fn test_words_and_punctuation() {
        // "Hello" 2, " world" 2, "!" 1
        assert_eq!(count_tokens("Hello world!", "cl100k_base"), 5);
        assert!(count_tokens("Hello world!", "cl100k_base") <= "Hello world!".len());
    }

    #[test]
    fn test_digits_group_by_three() {
        assert_eq!(count_tokens("1234567", "cl100k_base"), 3);
    }

    #[test]
    fn test_shorter_keys_cost_fewer_tokens() {
        let long = r#"{"description_of_item":1,"description_of_item":2}"#;
        let short = r#"{"a":1,"a":2}"#;
        assert!(count_tokens(short, "cl100k_base") < count_tokens(long, "cl100k_base"));
    }

    #[test]
    fn test_encoding_names() {
        assert_eq!(Encoding::from_name("o200k_base"), Encoding::O200k);
        assert_eq!(Encoding::from_name("gpt-4o-mini"), Encoding::O200k);
        assert_eq!(Encoding::from_name("gpt-4-turbo"), Encoding::Cl100k);
        assert_eq!(Encoding::from_name("text-davinci-003"), Encoding::P50k);
        assert_eq!(Encoding::from_name("GPT2"), Encoding::R50k);
        assert_eq!(Encoding::from_name("no-such-encoding"), Encoding::Cl100k);
        assert_eq!(Encoding::from_name("p50k_base").name(), "p50k_base");
    }

    #[test]
    fn test_value_tokens() {
        let v = Value::parse(r#"{"a": [1, 2]}"#).unwrap();
        assert_eq!(count_value_tokens(&v, "cl100k_base").unwrap(), count_tokens(r#"{"a":[1,2]}"#, "cl100k_base"));
    }

    #[test]
    fn test_unserializable_value() {
        let v = Value::array(vec![Value::from(f64::INFINITY)]);
        assert!(matches!(count_value_tokens(&v, "cl100k_base"), Err(RecodeError::UnserializableValue(_))));
    }
}
