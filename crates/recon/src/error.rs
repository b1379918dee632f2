use std::fmt;

#[derive(Debug)]
pub enum ReconError {
    /// TOML / JSON parse or deserialization error.
    ConfigParse(String),
    /// Profile validation error (empty data point, duplicate source, etc.).
    ConfigValidation(String),
    /// Engine input that cannot be reconciled at all.
    InvalidInput(String),
    /// Two sources share a display name (case-insensitive).
    DuplicateSource(String),
    /// The caller's cancel token fired between stages.
    Cancelled,
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::DuplicateSource(name) => write!(f, "duplicate source name: '{name}'"),
            Self::Cancelled => write!(f, "reconciliation cancelled"),
        }
    }
}

impl std::error::Error for ReconError {}
