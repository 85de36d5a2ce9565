//! Pipeline orchestrator: speculatively applies every pass, keeps only what pays.

use sp_core::{RecoderConfig, Result, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::abbreviation::KeyAbbreviation;
use crate::compacting::{CompactMode, Compacting};
use crate::dedup::Deduplication;
use crate::dictionary::{self, StaticDictionary};
use crate::escape;
use crate::estimator::{self, Metrics};
use crate::refine;
use crate::schema::{SchemaSeparation, MIN_ROWS};
use crate::serializer::{CompactJson, SerializerPass, TextSerializer};
use crate::strategy::{Strategy, StrategyKind};
use crate::tokens;

/// Estimated schema saving (bytes) that justifies the schema pass even in fast mode.
const FAST_SCHEMA_FLOOR: usize = 32;

/// Cost of one serialized payload.
#[derive(Clone)]
pub enum CostFunction {
    /// Estimated tokens under an encoding or model name.
    Tokens(String),
    Bytes,
    Custom(Arc<dyn Fn(&str) -> usize + Send + Sync>),
}

impl CostFunction {
    pub fn custom(f: impl Fn(&str) -> usize + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    pub fn measure(&self, text: &str) -> usize {
        match self {
            Self::Tokens(encoding) => tokens::count_tokens(text, encoding),
            Self::Bytes => text.len(),
            Self::Custom(f) => f(text),
        }
    }
}

impl Default for CostFunction {
    fn default() -> Self {
        Self::Tokens(RecoderConfig::default().encoding)
    }
}

impl fmt::Debug for CostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tokens(encoding) => f.debug_tuple("Tokens").field(encoding).finish(),
            Self::Bytes => f.write_str("Bytes"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Everything one `optimize` call needs.
#[derive(Clone)]
pub struct Options {
    pub config: RecoderConfig,
    pub cost: CostFunction,
    pub serializer: Arc<dyn TextSerializer>,
    /// Overrides the process-wide static dictionary for this call only.
    pub dictionary: Option<Arc<StaticDictionary>>,
}

impl Options {
    /// Options for `config`, costing by tokens under `config.encoding`.
    pub fn new(config: RecoderConfig) -> Self {
        let cost = CostFunction::Tokens(config.encoding.clone());
        Self { config, cost, serializer: Arc::new(CompactJson), dictionary: None }
    }

    pub fn with_cost(mut self, cost: CostFunction) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn TextSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_dictionary(mut self, dictionary: Arc<StaticDictionary>) -> Self {
        self.dictionary = Some(dictionary);
        self
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new(RecoderConfig::default())
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("config", &self.config)
            .field("cost", &self.cost)
            .field("serializer", &self.serializer.name())
            .field("dictionary", &self.dictionary.as_ref().map(|d| d.len()))
            .finish()
    }
}

/// Result of one `optimize` call.
#[derive(Debug, Clone)]
pub struct Optimized {
    /// The wire value: an envelope, or the input itself.
    pub value: Value,
    /// Accepted passes, outermost last.
    pub passes: Vec<StrategyKind>,
    pub metrics: Metrics,
    /// `None` when the input was passed through before anything was measured.
    pub cost_before: Option<usize>,
    pub cost_after: Option<usize>,
    /// The preprocessor ran and its output was kept.
    pub refined: bool,
    /// The payload looked like an envelope and sits, keys escaped, in a
    /// `{"$e": ..}` wrapper under any accepted passes.
    pub escaped: bool,
}

impl Optimized {
    fn passthrough(value: &Value, metrics: Metrics, cost: Option<usize>) -> Self {
        Self {
            value: value.clone(),
            passes: Vec::new(),
            metrics,
            cost_before: cost,
            cost_after: cost,
            refined: false,
            escaped: false,
        }
    }

    /// The input is handed back as it is.
    pub fn is_passthrough(&self) -> bool {
        self.passes.is_empty() && !self.refined && !self.escaped
    }

    /// `cost_after / cost_before`, 1.0 when nothing was measured.
    pub fn ratio(&self) -> f64 {
        match (self.cost_before, self.cost_after) {
            (Some(before), Some(after)) if before > 0 => after as f64 / before as f64,
            _ => 1.0,
        }
    }
}

/// Cost and byte length of one serialized value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Measure {
    cost: usize,
    bytes: usize,
}

impl Measure {
    fn beats(self, other: Measure) -> bool {
        self.cost < other.cost || self.bytes < other.bytes
    }
}

struct Working {
    value: Value,
    measure: Measure,
    passes: Vec<StrategyKind>,
}

/// One configured run of the pass sequence.
pub struct Pipeline<'a> {
    options: &'a Options,
    dictionary: Arc<StaticDictionary>,
}

impl<'a> Pipeline<'a> {
    pub fn new(options: &'a Options) -> Self {
        let dictionary = options.dictionary.clone().unwrap_or_else(dictionary::current);
        Self { options, dictionary }
    }

    fn measure(&self, value: &Value) -> Result<Measure> {
        let text = value.to_json_string()?;
        Ok(Measure { cost: self.options.cost.measure(&text), bytes: text.len() })
    }

    pub fn optimize(&self, input: &Value) -> Result<Optimized> {
        let config = &self.options.config;
        let metrics = estimator::estimate(input)?;

        if metrics.estimated_bytes < config.min_size {
            if escape::needs_escape(input)? {
                debug!(bytes = metrics.estimated_bytes, "below minimum size, escaping envelope-shaped input");
                return Ok(Optimized {
                    value: escape::wrap(input)?,
                    escaped: true,
                    ..Optimized::passthrough(input, metrics, None)
                });
            }
            debug!(bytes = metrics.estimated_bytes, min_size = config.min_size, "below minimum size, passing through");
            return Ok(Optimized::passthrough(input, metrics, None));
        }

        let original = self.measure(input)?;
        let (start, refined) = match &config.refine {
            Some(options) => (refine::refine(input, options)?, true),
            None => (input.clone(), false),
        };
        // Returned unchanged, an envelope-shaped payload would be misread by `restore`.
        let escaped = escape::needs_escape(&start)?;
        let start = if escaped {
            debug!("escaping envelope-shaped input");
            escape::wrap(&start)?
        } else {
            start
        };
        let mut working = Working { measure: self.measure(&start)?, value: start, passes: Vec::new() };

        let fast = config.fast_mode && metrics.estimated_bytes < config.fast_threshold;
        if !fast {
            self.speculate(&Strategy::Dedup(Deduplication::new(config.dedup_min_size)), &mut working)?;
        }
        let schema_worth_it = metrics.longest_array >= MIN_ROWS
            && (!fast
                || metrics.schema_savings > FAST_SCHEMA_FLOOR
                || metrics.schema_savings > metrics.abbreviation_savings);
        if schema_worth_it {
            self.speculate(&Strategy::Schema(SchemaSeparation), &mut working)?;
        }

        self.speculate(&Strategy::Abbreviation(KeyAbbreviation::new(self.dictionary.clone())), &mut working)?;

        if config.aggressive {
            let mode = if config.unsafe_compacting { CompactMode::Unsafe } else { CompactMode::Safe };
            self.speculate(&Strategy::Compacting(Compacting::new(self.dictionary.clone(), mode)), &mut working)?;
        }
        if config.final_pass {
            let pass = SerializerPass::new(self.options.serializer.clone());
            self.speculate(&Strategy::Serializer(pass), &mut working)?;
        }

        if config.validate && !escaped && working.measure.cost >= original.cost {
            debug!(before = original.cost, after = working.measure.cost, "no net improvement, returning input");
            return Ok(Optimized::passthrough(input, metrics, Some(original.cost)));
        }

        debug!(passes = ?working.passes, before = original.cost, after = working.measure.cost, "optimized");
        Ok(Optimized {
            value: working.value,
            passes: working.passes,
            metrics,
            cost_before: Some(original.cost),
            cost_after: Some(working.measure.cost),
            refined,
            escaped,
        })
    }

    /// Encode the working value with `strategy` and keep the result only if it is cheaper.
    fn speculate(&self, strategy: &Strategy, working: &mut Working) -> Result<bool> {
        let kind = strategy.kind();
        let candidate = match strategy.encode(&working.value) {
            Ok(envelope) => envelope.into_value(),
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                debug!(strategy = %kind, reason = %err, "pass skipped");
                return Ok(false);
            }
        };
        let measure = self.measure(&candidate)?;
        let accepted = measure.beats(working.measure);
        debug!(strategy = %kind, before = working.measure.cost, after = measure.cost, accepted, "speculative pass");
        if accepted {
            working.value = candidate;
            working.measure = measure;
            working.passes.push(kind);
        }
        Ok(accepted)
    }
}

/// Shorthand for [`Pipeline::optimize`].
pub fn optimize(value: &Value, options: &Options) -> Result<Optimized> {
    Pipeline::new(options).optimize(value)
}
