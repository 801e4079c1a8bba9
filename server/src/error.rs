use crate::ledger::LedgerError;
use shared::questions::QuestionBankError;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Failures that stop the server from starting. Once a session is running,
/// participant problems are handled inside the session and never surface here.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to open the discovery socket: {0}")]
    Broadcast(#[source] io::Error),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Questions(#[from] QuestionBankError),
}
