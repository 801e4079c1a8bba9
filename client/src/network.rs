//! Client connection state machine
//!
//! A client cycles forever through three states:
//! 1. looking for a server, waiting for the next offer on its feed
//! 2. connecting to the offered address and sending its name
//! 3. playing: printing frames as they arrive and answering questions
//!
//! A finished game or a lost connection sends it back to step 1.

use crate::discovery::{Offer, OfferFeed};
use crate::error::ClientError;
use crate::strategy::Strategy;
use log::{debug, info, warn};
use shared::protocol::{encode_join, FrameDecoder};
use shared::{Message, MessageKind};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::sleep;

const READ_BUFFER_SIZE: usize = 1024;
const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    LookingForServer,
    Connecting(Offer),
    Playing(SocketAddr),
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientState::LookingForServer => write!(f, "looking for server"),
            ClientState::Connecting(offer) => write!(f, "connecting to {}", offer.addr),
            ClientState::Playing(addr) => write!(f, "playing on {}", addr),
        }
    }
}

/// How a game connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The GameOver frame's text
    GameOver(String),
    ServerClosed,
}

/// Where a client learns about servers
#[derive(Debug)]
pub enum ServerSource {
    Discovery(OfferFeed),
    /// Skip discovery and always use this address
    Fixed(SocketAddr),
}

pub struct Client {
    name: String,
    strategy: Strategy,
    servers: ServerSource,
    discovery_timeout: Duration,
    state: ClientState,
}

impl Client {
    pub fn new(
        name: String,
        strategy: Strategy,
        servers: ServerSource,
        discovery_timeout: Duration,
    ) -> Self {
        Self {
            name,
            strategy,
            servers,
            discovery_timeout,
            state: ClientState::LookingForServer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    fn transition(&mut self, next: ClientState) {
        info!("{} transitioned from {} to {}", self.name, self.state, next);
        self.state = next;
    }

    /// Loops through the client states until discovery itself fails.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        loop {
            match self.state.clone() {
                ClientState::LookingForServer => match self.find_server().await {
                    Ok(offer) => self.transition(ClientState::Connecting(offer)),
                    Err(ClientError::NoServerFound(waited)) => {
                        warn!("{}: no server offers in {:?}, still looking", self.name, waited);
                    }
                    Err(e) => return Err(e),
                },
                ClientState::Connecting(offer) => match TcpStream::connect(offer.addr).await {
                    Ok(stream) => {
                        info!("{} connected to {:?}", self.name, offer.server_name);
                        self.transition(ClientState::Playing(offer.addr));
                        match self.play(stream).await {
                            Ok(SessionEnd::GameOver(text)) => info!("{}: {}", self.name, text),
                            Ok(SessionEnd::ServerClosed) => warn!("{}: server disconnected", self.name),
                            Err(e) => warn!("{}: lost connection: {}", self.name, e),
                        }
                        self.transition(ClientState::LookingForServer);
                    }
                    Err(e) => {
                        warn!("{} failed to connect to {}: {}", self.name, offer.addr, e);
                        sleep(RETRY_DELAY).await;
                        self.transition(ClientState::LookingForServer);
                    }
                },
                ClientState::Playing(_) => self.transition(ClientState::LookingForServer),
            }
        }
    }

    async fn find_server(&mut self) -> Result<Offer, ClientError> {
        match &mut self.servers {
            ServerSource::Discovery(feed) => feed.next_offer(self.discovery_timeout).await,
            ServerSource::Fixed(addr) => Ok(Offer {
                server_name: addr.to_string(),
                addr: *addr,
            }),
        }
    }

    /// Plays one game on an established connection.
    pub async fn play(&mut self, stream: TcpStream) -> Result<SessionEnd, ClientError> {
        let (reader, writer) = stream.into_split();
        play_session(&self.name, &mut self.strategy, reader, writer).await
    }
}

/// Sends the join frame, then answers every question until the game ends
/// or the server goes away.
pub async fn play_session<R, W>(
    name: &str,
    strategy: &mut Strategy,
    mut reader: R,
    mut writer: W,
) -> Result<SessionEnd, ClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_join(name)).await?;

    let mut decoder = FrameDecoder::new();
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    let mut current_question: Option<String> = None;
    let mut unanswered: Option<String> = None;

    loop {
        tokio::select! {
            read = reader.read(&mut buffer) => {
                let len = read?;
                if len == 0 {
                    return Ok(SessionEnd::ServerClosed);
                }
                decoder.push(&buffer[..len]);

                while let Some(frame) = decoder.next_message() {
                    let message = match frame {
                        Ok(message) => message,
                        Err(e) => {
                            warn!("{}: skipping frame: {}", name, e);
                            continue;
                        }
                    };
                    show(name, strategy, &message);

                    match message.kind {
                        MessageKind::Question => {
                            current_question = Some(message.payload.clone());
                            unanswered = current_question.clone();
                        }
                        // Try again on the same question
                        MessageKind::Error => unanswered = current_question.clone(),
                        MessageKind::GameOver => return Ok(SessionEnd::GameOver(message.payload)),
                        MessageKind::Welcome | MessageKind::General => {
                            current_question = None;
                            unanswered = None;
                        }
                    }
                }
            }
            token = strategy.answer(unanswered.clone().unwrap_or_default()), if unanswered.is_some() => {
                debug!("{} answers {}", name, token as char);
                writer.write_all(&[token]).await?;
                unanswered = None;
            }
        }
    }
}

fn show(name: &str, strategy: &Strategy, message: &Message) {
    if strategy.is_bot() {
        info!("{} got {:?}: {}", name, message.kind, message.payload.trim_end());
        return;
    }

    match message.kind {
        MessageKind::Welcome | MessageKind::General | MessageKind::GameOver => {
            println!("{}", message.payload.trim_end())
        }
        MessageKind::Error => println!("Error: {}", message.payload),
        MessageKind::Question => println!("Question: {}\nAnswer: ", message.payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::BotStrategy;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::QuestionBank;
    use std::sync::Arc;
    use tokio::io::{duplex, split};

    fn perfect_bot() -> Strategy {
        Strategy::Bot(BotStrategy::with_accuracy(
            1.0,
            Arc::new(QuestionBank::builtin()),
            StdRng::seed_from_u64(1),
        ))
    }

    #[tokio::test]
    async fn test_plays_until_game_over() {
        let (client_side, mut server) = duplex(1024);
        let (reader, writer) = split(client_side);

        let game = tokio::spawn(async move {
            let mut strategy = perfect_bot();
            play_session("BOT_#1", &mut strategy, reader, writer).await
        });

        let mut join = [0u8; 7];
        server.read_exact(&mut join).await.unwrap();
        assert_eq!(&join, b"BOT_#1\n");

        server
            .write_all(b"[W]Welcome to NovaBeach trivia king!\n\0[Q]Bananas are berries.\0")
            .await
            .unwrap();
        assert_eq!(server.read_u8().await.unwrap(), b'T');

        // An Error frame means the question is answered again
        server.write_all(b"[E]Invalid answer\0").await.unwrap();
        assert_eq!(server.read_u8().await.unwrap(), b'T');

        server
            .write_all(b"[G]Correct! You advance to the next round.\0[GO]You are the winner!\0")
            .await
            .unwrap();

        let end = game.await.unwrap().unwrap();
        assert_eq!(end, SessionEnd::GameOver("You are the winner!".into()));
    }

    #[tokio::test]
    async fn test_frames_split_across_reads() {
        let (client_side, mut server) = duplex(1024);
        let (reader, writer) = split(client_side);

        let game = tokio::spawn(async move {
            let mut strategy = perfect_bot();
            play_session("Amy", &mut strategy, reader, writer).await
        });

        let mut join = [0u8; 4];
        server.read_exact(&mut join).await.unwrap();

        server.write_all(b"[Q]Sharks are").await.unwrap();
        server.flush().await.unwrap();
        tokio::task::yield_now().await;
        server.write_all(b" mammals.\0").await.unwrap();
        assert_eq!(server.read_u8().await.unwrap(), b'F');

        drop(server);
        assert_eq!(game.await.unwrap().unwrap(), SessionEnd::ServerClosed);
    }

    #[test]
    fn test_state_display() {
        let offer = Offer {
            server_name: "NovaBeach".into(),
            addr: "10.0.0.5:4242".parse().unwrap(),
        };
        assert_eq!(ClientState::LookingForServer.to_string(), "looking for server");
        assert_eq!(ClientState::Connecting(offer).to_string(), "connecting to 10.0.0.5:4242");
    }
}
