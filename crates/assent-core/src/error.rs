use thiserror::Error;

/// Top-level error type for the assent subsystem.
///
/// Component crates define their own error enums and wrap this one through
/// `#[from]` so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AssentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid stored value in column {column}: {value}")]
    CorruptRow { column: &'static str, value: String },
}

impl From<toml::de::Error> for AssentError {
    fn from(err: toml::de::Error) -> Self {
        AssentError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for AssentError {
    fn from(err: toml::ser::Error) -> Self {
        AssentError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AssentError {
    fn from(err: serde_json::Error) -> Self {
        AssentError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for assent operations.
pub type Result<T> = std::result::Result<T, AssentError>;
