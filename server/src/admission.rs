//! Admission window
//!
//! Accepts stream connections until the roster is ready:
//! - below `min_participants` the window waits indefinitely for the next join
//! - from then on every join re-arms a `join_timeout` grace period, and the
//!   window closes the first time that period passes without a new join
//! - reaching `max_participants` closes it immediately; a maximum below the
//!   minimum is raised to the minimum
//!
//! Each connection's identity frame is read right in the accept path, so the
//! roster order is join order.

use crate::config::ServerConfig;
use log::{debug, info, warn};
use shared::protocol::parse_join;
use shared::{Message, MAX_NAME_LEN, NAME_TERMINATOR};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, timeout_at, Instant};

#[derive(Debug, Clone)]
pub struct AdmissionRules {
    pub min_participants: usize,
    pub max_participants: Option<usize>,
    pub join_timeout: Duration,
}

impl AdmissionRules {
    /// Whether `joined` entrants close the window. Never true below the
    /// minimum, whatever the configured maximum.
    pub fn roster_full(&self, joined: usize) -> bool {
        joined >= self.min_participants
            && self.max_participants.is_some_and(|max| joined >= max)
    }
}

impl From<&ServerConfig> for AdmissionRules {
    fn from(config: &ServerConfig) -> Self {
        let min_participants = config.min_participants.max(1);
        let max_participants = config.max_participants.map(|max| {
            if max < min_participants {
                warn!(
                    "Max players {} is below the minimum, using {}",
                    max, min_participants
                );
            }
            max.max(min_participants)
        });
        Self {
            min_participants,
            max_participants,
            join_timeout: config.join_timeout,
        }
    }
}

/// A connection whose identity frame has been read and accepted
#[derive(Debug)]
pub struct Entrant {
    pub name: String,
    pub addr: SocketAddr,
    pub stream: TcpStream,
}

/// Runs the admission window on `listener` and returns the roster in join
/// order. Never returns fewer than `min_participants` entrants.
pub async fn admit(listener: &TcpListener, rules: &AdmissionRules) -> Vec<Entrant> {
    let mut entrants: Vec<Entrant> = Vec::new();
    let mut grace_deadline: Option<Instant> = None;

    loop {
        if rules.roster_full(entrants.len()) {
            info!("Roster full with {} participants", entrants.len());
            break;
        }

        let accepted = match grace_deadline {
            None => listener.accept().await,
            Some(deadline) => match timeout_at(deadline, listener.accept()).await {
                Ok(accepted) => accepted,
                Err(_) => {
                    info!("No one else joined in time, admission closed");
                    break;
                }
            },
        };

        let (mut stream, addr) = match accepted {
            Ok(connection) => connection,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                continue;
            }
        };
        debug!("Connection from {}", addr);

        let name = match timeout(rules.join_timeout, read_identity(&mut stream)).await {
            Ok(Ok(frame)) => match parse_join(&frame) {
                Ok(name) => name,
                Err(e) => {
                    warn!("Rejecting {}: {}", addr, e);
                    refuse(stream, format!("Invalid name: {}", e));
                    continue;
                }
            },
            Ok(Err(e)) => {
                warn!("Lost {} before it sent a name: {}", addr, e);
                continue;
            }
            Err(_) => {
                warn!("{} did not send a name in time", addr);
                refuse(stream, "No name received".to_string());
                continue;
            }
        };

        if entrants.iter().any(|entrant| entrant.name == name) {
            warn!("Rejecting {}: name {:?} is taken", addr, name);
            refuse(stream, format!("The name {} is already taken", name));
            continue;
        }

        info!("{} joined from {}", name, addr);
        entrants.push(Entrant { name, addr, stream });

        if entrants.len() >= rules.min_participants {
            grace_deadline = Some(Instant::now() + rules.join_timeout);
        }
    }

    entrants
}

/// Reads up to and including the newline that ends the identity frame.
async fn read_identity(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut frame = Vec::new();
    loop {
        let byte = stream.read_u8().await?;
        if byte == NAME_TERMINATOR {
            return Ok(frame);
        }
        frame.push(byte);
        // One past the limit is enough for parse_join to reject it
        if frame.len() > MAX_NAME_LEN {
            return Ok(frame);
        }
    }
}

/// Sends an Error frame and closes the connection without holding up
/// admission.
fn refuse(mut stream: TcpStream, reason: String) {
    tokio::spawn(async move {
        let _ = stream.write_all(&Message::error(reason).encode()).await;
        let _ = stream.shutdown().await;
    });
}
