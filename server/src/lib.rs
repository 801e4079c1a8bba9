//! # Trivia Server Library
//!
//! This library provides the server side of the LAN trivia game. A server
//! advertises itself on the local network, admits a roster of players and
//! bots over TCP, then puts true/false questions to everyone still in the
//! game until a single winner remains.
//!
//! ## Core Responsibilities
//!
//! ### Discovery
//! While admission is open the server broadcasts a fixed-size UDP offer
//! packet once per period, carrying its name and the TCP port clients should
//! connect to. Broadcasting stops the moment admission closes.
//!
//! ### Admission
//! Connections are accepted in two phases. Until the minimum roster size is
//! reached the server waits indefinitely; after that every join re-arms a
//! grace timer and the first expiry closes admission. Each connection sends
//! its name as a single newline-terminated line before it is seated.
//!
//! ### Synchronized Rounds
//! Every round has three synchronization points:
//! - the round start, where the cohort (everyone still active) is fixed and
//!   every cohort member is sent the question
//! - outcome collection, a counting barrier that completes once every cohort
//!   member has answered, timed out or disconnected
//! - resolution, where wrong answers are eliminated and every cohort member
//!   is told its verdict before anyone sees the next question
//!
//! A round where nobody answers correctly is void: nobody is eliminated and
//! a fresh question is drawn for the same cohort.
//!
//! ## Architecture Design
//!
//! ### One Worker per Participant
//! Each participant gets a [`worker::ParticipantWorker`] task that owns the
//! answer side of its connection. The worker never touches shared state; it
//! talks to the [`coordinator::Coordinator`] through channels only.
//!
//! ### Single-Writer Session
//! The [`session::Session`] is owned by the coordinator once admission
//! closes. Every status change and answer slot write happens on that one
//! task, so no locks are needed around the roster.
//!
//! ### Isolated Connections
//! Socket reads and writes live in [`connection::ConnectionHandle`] tasks.
//! A broken or misbehaving client shows up as a timeout or a disconnect for
//! that participant and never reaches the coordinator as an error.
//!
//! ## Module Organization
//!
//! - `admission`: the two-phase accept loop and name handling
//! - `broadcaster`: the periodic UDP offer sender
//! - `config`: [`config::ServerConfig`] and the stopping policies
//! - `connection`: per-connection reader and writer tasks
//! - `coordinator`: round state machine, heats and tournament tally
//! - `error`: [`error::ServerError`]
//! - `ledger`: win counts per name, persisted as JSON
//! - `network`: the [`network::Server`] lifecycle loop
//! - `session`: roster, answer slots and question history
//! - `worker`: per-participant round loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::bind(ServerConfig::default()).await?;
//!
//!     // Offer, admit, play, record the winner, and start over, forever
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod admission;
pub mod broadcaster;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod network;
pub mod session;
pub mod worker;
