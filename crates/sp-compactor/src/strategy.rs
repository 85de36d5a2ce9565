//! The closed set of encoding passes behind one encode/decode surface.

use sp_core::{RecodeError, Result, Value};
use std::fmt;

use crate::abbreviation::KeyAbbreviation;
use crate::compacting::Compacting;
use crate::dedup::Deduplication;
use crate::envelope::Envelope;
use crate::schema::SchemaSeparation;
use crate::serializer::SerializerPass;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Dedup,
    Schema,
    Abbreviation,
    Compacting,
    Serializer,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dedup => "dedup",
            Self::Schema => "schema",
            Self::Abbreviation => "abbreviation",
            Self::Compacting => "compacting",
            Self::Serializer => "serializer",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum Strategy {
    Dedup(Deduplication),
    Schema(SchemaSeparation),
    Abbreviation(KeyAbbreviation),
    Compacting(Compacting),
    Serializer(SerializerPass),
}

impl Strategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Dedup(_) => StrategyKind::Dedup,
            Self::Schema(_) => StrategyKind::Schema,
            Self::Abbreviation(_) => StrategyKind::Abbreviation,
            Self::Compacting(_) => StrategyKind::Compacting,
            Self::Serializer(_) => StrategyKind::Serializer,
        }
    }

    pub fn encode(&self, value: &Value) -> Result<Envelope> {
        match self {
            Self::Dedup(pass) => pass.encode(value),
            Self::Schema(pass) => pass.encode(value),
            Self::Abbreviation(pass) => pass.encode(value),
            Self::Compacting(pass) => pass.encode(value),
            Self::Serializer(pass) => pass.encode(value),
        }
    }

    /// Invert one envelope. An envelope this strategy does not produce is `NotApplicable`.
    pub fn decode(&self, envelope: &Envelope) -> Result<Value> {
        match (self, envelope) {
            (Self::Dedup(pass), Envelope::Deduplicated { registry, body }) => pass.decode(registry, body),
            (Self::Schema(pass), Envelope::Schema(body)) => pass.decode(body),
            (Self::Abbreviation(pass), Envelope::Abbreviated { dictionary, body }) => pass.decode(dictionary, body),
            (Self::Compacting(pass), Envelope::Abbreviated { dictionary, body }) => pass.decode(dictionary, body),
            (Self::Serializer(pass), Envelope::Serialized(text)) => pass.decode(text),
            (strategy, envelope) => Err(RecodeError::not_applicable(format!(
                "{} cannot decode a {:?} envelope",
                strategy.kind(),
                envelope.kind()
            ))),
        }
    }
}
