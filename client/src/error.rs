use shared::ProtocolError;
use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("no server offer received within {0:?}")]
    NoServerFound(Duration),

    #[error("discovery listener stopped")]
    DiscoveryClosed,

    #[error("connection error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
