//! Per-connection I/O tasks
//!
//! Every accepted stream is split in two:
//! - a receiver task that forwards each inbound byte to the participant's
//!   worker as an answer token, and ends on EOF or error; at most
//!   `TOKEN_QUEUE_LEN` tokens wait for the worker, later bytes are dropped
//! - a sender task that drains the participant's outbox onto the socket,
//!   and shuts the write side down once every outbox handle is dropped
//!
//! The worker and the coordinator only ever see channels, which keeps all
//! socket errors inside this module.

use log::{debug, info, warn};
use shared::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

const READ_BUFFER_SIZE: usize = 64;
/// Tokens held for a worker that is not reading, e.g. between rounds
pub const TOKEN_QUEUE_LEN: usize = 16;

/// Owns the I/O tasks of one participant's connection
#[derive(Debug)]
pub struct ConnectionHandle {
    label: String,
    outbox: mpsc::UnboundedSender<Message>,
    receiver: JoinHandle<()>,
    sender: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Spawns the receiver and sender tasks. Returns the handle plus the
    /// stream of inbound bytes for the worker.
    pub fn spawn<R, W>(
        label: impl Into<String>,
        reader: R,
        writer: W,
    ) -> (Self, mpsc::Receiver<u8>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let label = label.into();
        let (tokens_tx, tokens_rx) = mpsc::channel(TOKEN_QUEUE_LEN);
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();

        let receiver = tokio::spawn(run_receiver(label.clone(), reader, tokens_tx));
        let sender = tokio::spawn(run_sender(label.clone(), writer, outbox_rx));

        let handle = Self {
            label,
            outbox: outbox_tx,
            receiver,
            sender,
        };
        (handle, tokens_rx)
    }

    pub fn outbox(&self) -> mpsc::UnboundedSender<Message> {
        self.outbox.clone()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// True once the peer has hung up or the read side failed
    pub fn is_closed(&self) -> bool {
        self.receiver.is_finished()
    }

    /// Flushes queued frames and gives the peer until `deadline` to hang up
    /// before both tasks are aborted, which closes the socket.
    ///
    /// Every other outbox handle must already be dropped, or the flush waits
    /// for the deadline.
    pub async fn close(self, deadline: Instant) {
        let ConnectionHandle {
            label,
            outbox,
            mut receiver,
            mut sender,
        } = self;
        drop(outbox);

        if timeout_at(deadline, &mut sender).await.is_err() {
            warn!("Could not flush frames to {} in time", label);
            sender.abort();
        }

        if timeout_at(deadline, &mut receiver).await.is_err() {
            info!("{} did not hang up, closing the connection", label);
            receiver.abort();
        }
    }
}

async fn run_receiver<R>(label: String, mut reader: R, tokens: mpsc::Sender<u8>)
where
    R: AsyncRead + Unpin,
{
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    let mut dropped: u64 = 0;

    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => {
                debug!("{} closed the connection", label);
                break;
            }
            Ok(len) => {
                for byte in &buffer[..len] {
                    // Nobody listens once the worker is done; keep reading so a
                    // hang-up is still noticed.
                    if let Err(mpsc::error::TrySendError::Full(_)) = tokens.try_send(*byte) {
                        dropped += 1;
                    }
                }
            }
            Err(e) => {
                warn!("Error reading from {}: {}", label, e);
                break;
            }
        }
    }

    if dropped > 0 {
        debug!("Dropped {} unread bytes from {}", dropped, label);
    }
}

async fn run_sender<W>(label: String, mut writer: W, mut outbox: mpsc::UnboundedReceiver<Message>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outbox.recv().await {
        if let Err(e) = writer.write_all(&message.encode()).await {
            warn!("Failed to send to {}: {}", label, e);
            return;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown of {} failed: {}", label, e);
    }
}
