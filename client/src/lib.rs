//! # Trivia Client Library
//!
//! This library provides the player side of the LAN trivia game: finding a
//! server, joining it under a team name, and answering its true/false
//! questions either from the keyboard or automatically as a bot.
//!
//! ## Architecture Overview
//!
//! ### Discovery
//! Servers announce themselves with UDP broadcasts on a well-known port. A
//! process opens that port once, with address reuse so other client
//! processes on the same machine can share it, and fans every valid offer
//! out to all of its players. Malformed datagrams are ignored.
//!
//! ### Connection State Machine
//! Each [`network::Client`] moves between looking for a server, connecting,
//! and playing. A finished game or a dropped connection always leads back to
//! looking for a server, so a client keeps playing game after game.
//!
//! ### Answer Strategies
//! A [`strategy::Strategy`] decides each answer:
//! - console players type a line and its first character is sent
//! - bots look the question up in the shared question bank and answer
//!   correctly with a probability set by their [`strategy::BotLevel`]
//!
//! ## Module Organization
//!
//! - `discovery`: reusable discovery socket, offer fan-out and timeouts
//! - `error`: [`error::ClientError`]
//! - `names`: team names and unique `BOT_#<n>` names
//! - `network`: the client state machine and the per-game frame loop
//! - `strategy`: console and bot answer strategies
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::discovery::{bind_discovery_socket, OfferListener};
//! use client::network::{Client, ServerSource};
//! use client::strategy::{BotLevel, BotStrategy, Strategy};
//! use rand::{rngs::StdRng, SeedableRng};
//! use shared::{QuestionBank, DISCOVERY_PORT};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let offers = OfferListener::spawn(bind_discovery_socket(DISCOVERY_PORT)?);
//!     let bot = BotStrategy::new(
//!         BotLevel::Expert,
//!         Arc::new(QuestionBank::builtin()),
//!         StdRng::from_entropy(),
//!     );
//!
//!     let mut client = Client::new(
//!         "BOT_#1".to_string(),
//!         Strategy::Bot(bot),
//!         ServerSource::Discovery(offers.subscribe()),
//!         Duration::from_secs(10),
//!     );
//!     client.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod discovery;
pub mod error;
pub mod names;
pub mod network;
pub mod strategy;
