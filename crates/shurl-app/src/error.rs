use shurl_core::TokenizerError;
use thiserror::Error;

/// A fresh link could not be encoded and removing it failed as well. The
/// store now holds a row no token points at.
#[derive(Debug, Error)]
#[error("encoding id [{id}] failed ({encode}) and removing the link failed ({delete})")]
pub struct CompensationFailed {
    id: u64,
    #[source]
    encode: TokenizerError,
    delete: shurl_core::Error,
}

impl CompensationFailed {
    pub fn new(id: u64, encode: TokenizerError, delete: shurl_core::Error) -> Self {
        Self { id, encode, delete }
    }

    /// Id of the orphaned row.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn encode_error(&self) -> &TokenizerError {
        &self.encode
    }

    pub fn delete_error(&self) -> &shurl_core::Error {
        &self.delete
    }
}
