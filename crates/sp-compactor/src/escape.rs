//! Key escaping for payloads that already look like envelopes.
//!
//! Every key starting with `$` gets one more `$`. No escaped object can then
//! carry a wire key, so [`crate::restore`] leaves the payload alone until the
//! `{"$e": ..}` wrapper strips the extra `$` again.

use sp_core::walk::{self, Rebuild};
use sp_core::{Result, Value};

use crate::envelope::{Envelope, EnvelopeKind};

const MARK: char = '$';

struct Escape;

impl Rebuild for Escape {
    fn key(&mut self, key: &str) -> Result<String> {
        Ok(if key.starts_with(MARK) { format!("{MARK}{key}") } else { key.to_owned() })
    }
}

struct Unescape;

impl Rebuild for Unescape {
    fn key(&mut self, key: &str) -> Result<String> {
        Ok(match key.strip_prefix(MARK) {
            Some(rest) if rest.starts_with(MARK) => rest.to_owned(),
            _ => key.to_owned(),
        })
    }
}

/// True if `restore` would read `value` as an envelope rather than hand it back.
pub fn needs_escape(value: &Value) -> Result<bool> {
    Ok(Envelope::sniff(value)?.kind() != EnvelopeKind::Passthrough)
}

/// `{"$e": value}` with the keys of `value` escaped.
pub fn wrap(value: &Value) -> Result<Value> {
    Ok(Envelope::Escaped(walk::rebuild(value, &mut Escape)?).into_value())
}

/// Inverse of the escaping done by [`wrap`], applied to the wrapped body.
pub fn unescape(body: &Value) -> Result<Value> {
    walk::rebuild(body, &mut Unescape)
}
