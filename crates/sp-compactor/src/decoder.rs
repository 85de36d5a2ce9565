//! Envelope decoder: sniffs the outermost shape and peels one layer at a time.

use sp_core::{Result, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::abbreviation::KeyAbbreviation;
use crate::dedup::Deduplication;
use crate::dictionary::{self, StaticDictionary};
use crate::envelope::{Envelope, EnvelopeKind};
use crate::escape;
use crate::pipeline::Options;
use crate::schema::SchemaSeparation;
use crate::serializer::{CompactJson, SerializerPass, TextSerializer};
use crate::strategy::Strategy;

/// Upper bound on stacked envelopes; the pipeline produces at most five.
pub const MAX_LAYERS: usize = 16;

#[derive(Clone)]
pub struct Decoder {
    dictionary: Arc<StaticDictionary>,
    serializer: Arc<dyn TextSerializer>,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(dictionary::current(), Arc::new(CompactJson))
    }
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("dictionary", &self.dictionary.len())
            .field("serializer", &self.serializer.name())
            .finish()
    }
}

impl Decoder {
    pub fn new(dictionary: Arc<StaticDictionary>, serializer: Arc<dyn TextSerializer>) -> Self {
        Self { dictionary, serializer }
    }

    /// The decoder matching what `optimize` used with these options.
    pub fn for_options(options: &Options) -> Self {
        let dictionary = options.dictionary.clone().unwrap_or_else(dictionary::current);
        Self::new(dictionary, options.serializer.clone())
    }

    fn strategy_for(&self, kind: EnvelopeKind) -> Option<Strategy> {
        Some(match kind {
            EnvelopeKind::Passthrough | EnvelopeKind::Escaped => return None,
            EnvelopeKind::Abbreviated => Strategy::Abbreviation(KeyAbbreviation::new(self.dictionary.clone())),
            EnvelopeKind::Schema => Strategy::Schema(SchemaSeparation),
            EnvelopeKind::Deduplicated => Strategy::Dedup(Deduplication::default()),
            EnvelopeKind::Serialized => Strategy::Serializer(SerializerPass::new(self.serializer.clone())),
        })
    }

    /// Decode `value` until no envelope shape is left.
    ///
    /// Values that are not envelopes come back unchanged, and so does a layer
    /// that turns out to be malformed. An escaped payload ends the descent.
    /// Only cycles and unserializable leaves fail.
    pub fn restore(&self, value: &Value) -> Result<Value> {
        let mut current = value.clone();
        for _ in 0..MAX_LAYERS {
            let envelope = Envelope::sniff(&current)?;
            if let Envelope::Escaped(body) = &envelope {
                return escape::unescape(body);
            }
            let Some(strategy) = self.strategy_for(envelope.kind()) else {
                return Ok(current);
            };
            match strategy.decode(&envelope) {
                Ok(inner) => current = inner,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    debug!(strategy = %strategy.kind(), reason = %err, "malformed envelope, stopping");
                    return Ok(current);
                }
            }
        }
        debug!(layers = MAX_LAYERS, "layer limit reached");
        Ok(current)
    }
}

/// Decode with the process-wide dictionary and the built-in serializer.
pub fn restore(value: &Value) -> Result<Value> {
    Decoder::default().restore(value)
}
