//! Lossy preprocessing: number rounding and empty-field pruning.

use sp_core::walk::{self, Rebuild};
use sp_core::{Map, RefineOptions, Result, Value};

struct Refiner<'a> {
    options: &'a RefineOptions,
    factor: Option<f64>,
}

impl Refiner<'_> {
    fn prunes(&self, value: &Value) -> bool {
        match value {
            Value::Null => self.options.prune_null,
            Value::String(s) => self.options.prune_empty && s.is_empty(),
            Value::Array(node) => self.options.prune_empty && node.read().is_empty(),
            Value::Object(node) => self.options.prune_empty && node.read().is_empty(),
            _ => false,
        }
    }
}

impl Rebuild for Refiner<'_> {
    fn leaf(&mut self, value: &Value) -> Result<Value> {
        Ok(match (value, self.factor) {
            (Value::Number(n), Some(factor)) => {
                let rounded = (n * factor).round() / factor;
                Value::Number(if rounded.is_finite() { rounded } else { *n })
            }
            _ => value.clone(),
        })
    }

    // Children are finished first, so a field emptied by pruning is pruned too.
    fn finish_object(&mut self, mut map: Map) -> Result<Value> {
        map.retain(|_, value| !self.prunes(value));
        Ok(Value::object(map))
    }
}

/// Apply `options` to a fresh copy of `value`. Array elements are never removed.
///
/// Rounding is half away from zero (`f64::round`): at precision 2, `0.125`
/// becomes `0.13` and `-0.125` becomes `-0.13`. A result of negative zero is
/// written as `0`.
pub fn refine(value: &Value, options: &RefineOptions) -> Result<Value> {
    let factor = options.precision.map(|digits| 10f64.powi(digits.min(300) as i32));
    walk::rebuild(value, &mut Refiner { options, factor })
}
