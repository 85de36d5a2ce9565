//! Value model and iterative traversal kernel for the structural recoder.

pub mod config;
pub mod error;
pub mod json;
pub mod value;
pub mod walk;

pub use config::{RecoderConfig, RefineOptions};
pub use error::{RecodeError, Result};
pub use value::{Composite, Map, Node, Value};
pub use walk::{deep_clone, rebuild, walk, AncestorPath, Control, Event, Rebuild};
