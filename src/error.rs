use crate::auth::AuthError;
use crate::protocol::state::{Direction, SubProtocol};
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LodestoneError>;

/// Every way a connection can fail. All of them end the session.
#[derive(Debug, Error)]
pub enum LodestoneError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Unknown metadata type id: {0}")]
    UnknownMetadataType(i32),

    #[error("Packet 0x{id:02x} is not legal in {state:?} ({direction:?})")]
    IllegalPacket {
        state: SubProtocol,
        direction: Direction,
        id: i32,
    },

    #[error("Invalid client intent: {0}")]
    InvalidIntent(i32),

    #[error("Illegal sub-protocol transition {from:?} -> {to:?}")]
    IllegalTransition { from: SubProtocol, to: SubProtocol },

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Disconnected: {0}")]
    Disconnected(String),
}

impl LodestoneError {
    pub fn decode(msg: impl Into<String>) -> Self {
        LodestoneError::Decode(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        LodestoneError::Encode(msg.into())
    }

    /// True for failures caused by bytes on the wire rather than by the peer
    /// breaking the protocol or by the environment.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            LodestoneError::Decode(_) | LodestoneError::UnknownMetadataType(_)
        ) || matches!(self, LodestoneError::Io(err) if err.kind() == io::ErrorKind::UnexpectedEof
            || err.kind() == io::ErrorKind::InvalidData)
    }
}
