//! UDP offer broadcaster
//!
//! Sends the discovery packet on a fixed period while admission is open.

use log::{debug, info, warn};
use shared::DiscoveryPacket;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Running broadcaster; dropping the handle also stops it
#[derive(Debug)]
pub struct BroadcastHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<u64>,
}

impl BroadcastHandle {
    /// Stops broadcasting and returns how many offers were sent.
    pub async fn stop(self) -> u64 {
        let _ = self.stop.send(());
        self.task.await.unwrap_or(0)
    }
}

/// Binds an ephemeral broadcast-capable socket and starts sending `packet`
/// to `target` every `period`.
pub async fn spawn(
    packet: DiscoveryPacket,
    target: SocketAddr,
    period: Duration,
) -> io::Result<BroadcastHandle> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_broadcast(true)?;

    info!(
        "Server started, listening on port {}. Offering as {:?} to {}",
        packet.port, packet.server_name, target
    );

    let (stop_tx, stop_rx) = oneshot::channel();
    let task = tokio::spawn(run(socket, packet.encode(), target, period, stop_rx));
    Ok(BroadcastHandle {
        stop: stop_tx,
        task,
    })
}

async fn run(
    socket: UdpSocket,
    datagram: [u8; shared::DISCOVERY_PACKET_LEN],
    target: SocketAddr,
    period: Duration,
    mut stop: oneshot::Receiver<()>,
) -> u64 {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sent = 0;

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                match socket.send_to(&datagram, target).await {
                    Ok(_) => sent += 1,
                    Err(e) => warn!("Failed to broadcast offer: {}", e),
                }
            }
        }
    }

    debug!("Stopped broadcasting after {} offers", sent);
    sent
}
