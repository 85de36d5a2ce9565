//! Final text-serializer pass: the whole payload as one `{"$t": text}` string.

use sp_core::walk::{self, Control, Event};
use sp_core::{json, RecodeError, Result, Value};
use std::fmt;
use std::sync::Arc;

use crate::envelope::Envelope;

/// A reversible value ↔ text format.
pub trait TextSerializer: Send + Sync {
    fn name(&self) -> &str;
    fn serialize(&self, value: &Value) -> anyhow::Result<String>;
    fn deserialize(&self, text: &str) -> anyhow::Result<Value>;
}

/// Compact JSON, the built-in format.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactJson;

impl TextSerializer for CompactJson {
    fn name(&self) -> &str {
        "compact-json"
    }

    /// Refuses date-times, which would come back as plain strings, and
    /// nesting the parser could not read back.
    fn serialize(&self, value: &Value) -> anyhow::Result<String> {
        let mut has_datetime = false;
        walk::walk(value, |event| {
            if let Event::Leaf { value: Value::DateTime(_), .. } = event {
                has_datetime = true;
                return Ok(Control::Break);
            }
            Ok(Control::Continue)
        })?;
        if has_datetime {
            anyhow::bail!("compact JSON cannot keep a datetime apart from a string");
        }
        let depth = json::nesting(value)?;
        if depth > json::MAX_PARSE_NESTING {
            anyhow::bail!("nesting {depth} is deeper than compact JSON reads back");
        }
        Ok(json::to_string(value)?)
    }

    fn deserialize(&self, text: &str) -> anyhow::Result<Value> {
        Ok(Value::parse(text)?)
    }
}

/// Recover a typed error from a serializer so fatal kinds stay fatal.
fn lift(err: anyhow::Error) -> RecodeError {
    match err.downcast::<RecodeError>() {
        Ok(err) => err,
        Err(err) => RecodeError::Other(err),
    }
}

#[derive(Clone)]
pub struct SerializerPass {
    serializer: Arc<dyn TextSerializer>,
}

impl fmt::Debug for SerializerPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerPass").field("serializer", &self.serializer.name()).finish()
    }
}

impl Default for SerializerPass {
    fn default() -> Self {
        Self::new(Arc::new(CompactJson))
    }
}

impl SerializerPass {
    pub fn new(serializer: Arc<dyn TextSerializer>) -> Self {
        Self { serializer }
    }

    pub fn name(&self) -> &str {
        self.serializer.name()
    }

    pub fn encode(&self, value: &Value) -> Result<Envelope> {
        let text = self.serializer.serialize(value).map_err(lift)?;
        Ok(Envelope::Serialized(text))
    }

    /// Text the serializer cannot read is `NotApplicable`, never fatal.
    pub fn decode(&self, text: &str) -> Result<Value> {
        self.serializer
            .deserialize(text)
            .map_err(|err| RecodeError::not_applicable(format!("{} cannot read payload: {err}", self.name())))
    }
}
