//! Main Crate Error

use crate::common::Id;

#[derive(thiserror::Error, Debug)]
/// Xordht crate error enum.
pub enum Error {
    /// A [crate::Config] value is out of range.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Bytes or a string could not be read as an [Id].
    #[error("Invalid id: {0}")]
    InvalidId(String),

    /// The id does not fit in the configured keyspace.
    #[error("Id {id} does not fit in a {bit_length} bit keyspace")]
    IdOutOfKeyspace { id: Id, bit_length: usize },

    #[error(transparent)]
    /// Transparent [reqwest::Error]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse json payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The remote node answered with a non-success status.
    #[error("Unexpected http status: {0}")]
    Status(u16),

    /// The remote node answered with a response of the wrong kind.
    #[error("Expected a {expected} response")]
    UnexpectedResponse { expected: &'static str },

    /// An inbound request is missing fields or has an unknown path.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// No node is reachable at this address.
    #[error("Unreachable: {0}")]
    Unreachable(String),
}
