//! Protocol-level errors shared by the server and the client

use thiserror::Error;

/// Everything that can go wrong while decoding bytes that came off the wire.
///
/// All of these are recoverable: a bad discovery packet is dropped, a bad
/// answer token gets an Error frame back, and a bad server frame is logged
/// and skipped by the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed discovery packet: {0}")]
    MalformedDiscoveryPacket(String),

    #[error("invalid answer token: {0:?}")]
    InvalidAnswerToken(char),

    #[error("unknown message tag in frame {0:?}")]
    UnknownMessageTag(String),

    #[error("no frame terminator within {0} bytes")]
    FrameTooLong(usize),

    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("player name exceeds {0} bytes")]
    NameTooLong(usize),

    #[error("player name is empty")]
    EmptyName,
}
