use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecodeError {
    #[error("Circular reference: a composite value is its own ancestor")]
    CircularReference,
    #[error("Unserializable value: {0}")]
    UnserializableValue(String),
    #[error("Strategy not applicable: {0}")]
    NotApplicable(String),
    #[error("Invalid dictionary: {0}")]
    InvalidDictionary(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RecodeError {
    /// Fatal errors abort a whole call; anything else only disqualifies one pass.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CircularReference | Self::UnserializableValue(_) | Self::Serialization(_)
        )
    }

    pub fn not_applicable(reason: impl Into<String>) -> Self {
        Self::NotApplicable(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, RecodeError>;
