//! Listening for server offers
//!
//! One UDP socket per process is bound to the discovery port with address
//! reuse, so several client processes on the same host can all hear the
//! broadcast. An [`OfferListener`] owns that socket and fans every valid
//! offer out to any number of subscribers (one per bot).

use crate::error::ClientError;
use log::{debug, info, warn};
use shared::DiscoveryPacket;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

const OFFER_CHANNEL_CAPACITY: usize = 16;

/// A server that announced itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    pub server_name: String,
    /// Sender's IP with the advertised stream port
    pub addr: SocketAddr,
}

/// Binds a non-blocking UDP socket on `port` that other sockets may share.
pub fn bind_discovery_socket(port: u16) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)).into())?;
    UdpSocket::from_std(socket.into())
}

/// Shared offer receiver; the socket is closed when this is dropped
#[derive(Debug)]
pub struct OfferListener {
    offers: broadcast::Sender<Offer>,
    task: JoinHandle<()>,
}

impl OfferListener {
    pub fn spawn(socket: UdpSocket) -> Self {
        let (offers, _) = broadcast::channel(OFFER_CHANNEL_CAPACITY);
        let task = tokio::spawn(listen(socket, offers.clone()));
        Self { offers, task }
    }

    /// A feed of offers received from now on
    pub fn subscribe(&self) -> OfferFeed {
        OfferFeed {
            offers: self.offers.subscribe(),
        }
    }
}

impl Drop for OfferListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn listen(socket: UdpSocket, offers: broadcast::Sender<Offer>) {
    let mut buffer = [0u8; 1024];

    loop {
        let (len, from) = match socket.recv_from(&mut buffer).await {
            Ok(received) => received,
            Err(e) => {
                warn!("Discovery socket error: {}", e);
                continue;
            }
        };

        match DiscoveryPacket::decode(&buffer[..len]) {
            Ok(packet) => {
                let offer = Offer {
                    server_name: packet.server_name,
                    addr: SocketAddr::new(from.ip(), packet.port),
                };
                // No subscribers just means nobody is looking right now
                let _ = offers.send(offer);
            }
            Err(e) => debug!("Ignoring datagram from {}: {}", from, e),
        }
    }
}

/// One subscriber's view of the offers
#[derive(Debug)]
pub struct OfferFeed {
    offers: broadcast::Receiver<Offer>,
}

impl OfferFeed {
    /// Waits up to `wait` for the next offer.
    pub async fn next_offer(&mut self, wait: Duration) -> Result<Offer, ClientError> {
        let deadline = Instant::now() + wait;

        loop {
            match timeout_at(deadline, self.offers.recv()).await {
                Err(_) => return Err(ClientError::NoServerFound(wait)),
                Ok(Ok(offer)) => {
                    info!("Received offer from {:?} at {}", offer.server_name, offer.addr);
                    return Ok(offer);
                }
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    debug!("Skipped {} stale offers", skipped);
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(ClientError::DiscoveryClosed)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn sender() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    #[tokio::test]
    async fn test_discovery_port_can_be_shared() {
        let first = bind_discovery_socket(0).unwrap();
        let port = first.local_addr().unwrap().port();

        let second = bind_discovery_socket(port);
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_offer_reaches_every_subscriber() {
        let socket = bind_discovery_socket(0).unwrap();
        let port = socket.local_addr().unwrap().port();
        let listener = OfferListener::spawn(socket);
        let mut first = listener.subscribe();
        let mut second = listener.subscribe();

        let packet = DiscoveryPacket::new("NovaBeach", 4242);
        sender()
            .await
            .send_to(&packet.encode(), ("127.0.0.1", port))
            .await
            .unwrap();

        let expected = Offer {
            server_name: "NovaBeach".into(),
            addr: "127.0.0.1:4242".parse().unwrap(),
        };
        assert_eq!(first.next_offer(Duration::from_secs(2)).await.unwrap(), expected);
        assert_eq!(second.next_offer(Duration::from_secs(2)).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_malformed_packets_are_skipped() {
        let socket = bind_discovery_socket(0).unwrap();
        let port = socket.local_addr().unwrap().port();
        let listener = OfferListener::spawn(socket);
        let mut feed = listener.subscribe();

        let mut bad_cookie = DiscoveryPacket::new("Rogue", 1).encode();
        bad_cookie[0] = 0;
        let sender = sender().await;
        sender.send_to(&bad_cookie, ("127.0.0.1", port)).await.unwrap();
        sender.send_to(b"hello", ("127.0.0.1", port)).await.unwrap();
        sender
            .send_to(&DiscoveryPacket::new("NovaBeach", 4242).encode(), ("127.0.0.1", port))
            .await
            .unwrap();

        let offer = feed.next_offer(Duration::from_secs(2)).await.unwrap();
        assert_eq!(offer.server_name, "NovaBeach");
    }

    #[tokio::test]
    async fn test_no_server_found_after_timeout() {
        let listener = OfferListener::spawn(bind_discovery_socket(0).unwrap());
        let mut feed = listener.subscribe();

        let result = feed.next_offer(Duration::from_millis(100)).await;
        assert!(matches!(result, Err(ClientError::NoServerFound(_))));
    }
}
