//! Structural recoder: lossless re-encodings of JSON-model trees that cost fewer tokens.
//!
//! Passes, in pipeline order:
//! 1. Dedup: repeated subtrees moved into a registry, referenced by index
//! 2. Schema: arrays of same-keyed objects split into a field list and rows
//! 3. Abbreviation: object keys replaced by short tokens
//! 4. Compacting: looser abbreviation, optionally booleans as `1`/`0`
//! 5. Serializer: the whole payload as one text string
//!
//! [`optimize`] applies each pass speculatively and keeps it only if the
//! payload got cheaper; [`restore`] peels the resulting envelopes off again.

pub mod abbreviation;
pub mod compacting;
pub mod decoder;
pub mod dedup;
pub mod dictionary;
pub mod envelope;
pub mod escape;
pub mod estimator;
pub mod pipeline;
pub mod refine;
pub mod schema;
pub mod serializer;
pub mod strategy;
pub mod tokens;

pub use abbreviation::{KeyAbbreviation, Selection};
pub use compacting::{CompactMode, Compacting};
pub use decoder::{restore, Decoder};
pub use dedup::Deduplication;
pub use dictionary::{ScopedDictionary, StaticDictionary};
pub use envelope::{Envelope, EnvelopeKind, KeyDictionary};
pub use estimator::{estimate, Metrics};
pub use pipeline::{optimize, CostFunction, Optimized, Options, Pipeline};
pub use refine::refine;
pub use schema::SchemaSeparation;
pub use serializer::{CompactJson, SerializerPass, TextSerializer};
pub use strategy::{Strategy, StrategyKind};
pub use tokens::{count_tokens, count_value_tokens, Encoding};

pub use sp_core::{RecodeError, RecoderConfig, RefineOptions, Result, Value};
