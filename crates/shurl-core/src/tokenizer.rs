use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizerError {
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("id {id} is out of the encodable range 0..={max}")]
    OutOfRange { id: u64, max: u64 },
    #[error("invalid tokenizer configuration: {0}")]
    InvalidConfig(String),
}

/// Reversible codec between store ids and opaque tokens.
///
/// Implementations must be deterministic and bijective over their supported
/// range for a fixed configuration.
pub trait Tokenizer: Send + Sync + 'static {
    fn encode(&self, id: u64) -> Result<String, TokenizerError>;

    fn decode(&self, token: &str) -> Result<u64, TokenizerError>;
}
