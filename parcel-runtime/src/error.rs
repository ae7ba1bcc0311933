use thiserror::Error;

/// Failure of a synchronous chain-state read.
///
/// Reverts (including unsupported-call conditions on older interface
/// generations) are expected and trigger fallback handling; transport
/// failures are not and abort the current event.
#[derive(Error, Debug, Clone)]
pub enum ChainError {
    #[error("Call reverted: {0}")]
    Reverted(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl ChainError {
    /// True for revert/unsupported-call conditions that allow degrading
    /// to the split-interface fallback or a null snapshot field.
    pub fn is_revert(&self) -> bool {
        matches!(self, ChainError::Reverted(_))
    }
}

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Chain call failed: {0}")]
    Chain(#[from] ChainError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<serde_json::Error> for IndexerError {
    fn from(e: serde_json::Error) -> Self {
        IndexerError::Serialization(e.to_string())
    }
}
