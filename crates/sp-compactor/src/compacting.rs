//! Aggressive compacting: key abbreviation with a looser selection and,
//! in unsafe mode, booleans rewritten to `1`/`0`.

use serde::{Deserialize, Serialize};
use sp_core::{Result, Value};
use std::sync::Arc;

use crate::abbreviation::{KeyAbbreviation, Selection};
use crate::dictionary::StaticDictionary;
use crate::envelope::{Envelope, KeyDictionary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompactMode {
    /// Values are untouched; decoding is exact.
    #[default]
    Safe,
    /// `true`/`false` become `1`/`0`. Decoding cannot tell them from numbers.
    Unsafe,
}

#[derive(Debug, Clone)]
pub struct Compacting {
    keys: KeyAbbreviation,
    mode: CompactMode,
}

impl Compacting {
    pub fn new(dictionary: Arc<StaticDictionary>, mode: CompactMode) -> Self {
        let keys = KeyAbbreviation::new(dictionary)
            .with_selection(Selection::Aggressive)
            .with_booleans_as_numbers(mode == CompactMode::Unsafe);
        Self { keys, mode }
    }

    pub fn mode(&self) -> CompactMode {
        self.mode
    }

    pub fn encode(&self, value: &Value) -> Result<Envelope> {
        self.keys.encode(value)
    }

    pub fn decode(&self, dictionary: &KeyDictionary, body: &Value) -> Result<Value> {
        self.keys.decode(dictionary, body)
    }
}
