//! Defines the domain errors raised while handling an invocation.
//! Everything else (network, authorization, malformed payloads) is
//! reported through `anyhow` with context attached.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The configured roots don't match the object that triggered the
    /// invocation, or they can't name a container at all.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The storage service reported a copy status other than
    /// `success` once the synchronous copy returned.
    #[error("unable to copy blob {source_key} with status {status}")]
    CopyFailed { source_key: String, status: String },
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}
