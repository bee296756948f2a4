use thiserror::Error;

/// Every error kind a caller can observe, per the error handling design:
/// unknown receiver, unknown protocol, a walked/invoked shape mismatch, a
/// remote exception forwarded from the peer, and connection teardown.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProximateError {
    #[error("unknown receiver: {id}")]
    UnknownReceiver { id: String },

    #[error("unknown protocol: {key}")]
    UnknownProtocol { key: String },

    #[error("value is not callable")]
    NotCallable,

    #[error("value is not an object")]
    NotObject,

    #[error("no protocol registered for this value")]
    NoProtocolForValue,

    #[error("{message}")]
    Remote {
        message: String,
        stack: Option<String>,
    },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed wire message: {0}")]
    Malformed(String),
}

impl ProximateError {
    pub fn remote(message: impl Into<String>, stack: Option<String>) -> Self {
        ProximateError::Remote {
            message: message.into(),
            stack,
        }
    }
}
