//! Server lifecycle: discovery and admission, the game, then the ledger

use crate::admission::{self, AdmissionRules, Entrant};
use crate::broadcaster;
use crate::config::ServerConfig;
use crate::connection::ConnectionHandle;
use crate::coordinator::Coordinator;
use crate::error::ServerError;
use crate::ledger::{
    self, record_win_blocking, render_podium, FileLedger, MemoryLedger, SharedLedger, WinLedger,
};
use crate::session::{Seat, Session};
use crate::worker::ParticipantWorker;
use log::{error, info, warn};
use shared::{DiscoveryPacket, Message, QuestionBank, QuestionSource};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, MutexGuard};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};

const SESSION_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Owns the listening socket and loops sessions forever
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    questions: Arc<dyn QuestionSource>,
    ledger: SharedLedger,
}

impl Server {
    /// Binds the stream listener and loads the question bank and ledger
    /// named in `config`.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let questions: Arc<dyn QuestionSource> = match &config.questions_path {
            Some(path) => {
                let bank = QuestionBank::from_json_file(path)?;
                info!("Loaded {} questions from {}", bank.len(), path.display());
                Arc::new(bank)
            }
            None => Arc::new(QuestionBank::builtin()),
        };

        let ledger: Box<dyn WinLedger> = match &config.ledger_path {
            Some(path) => Box::new(FileLedger::open(path)?),
            None => Box::new(MemoryLedger::new()),
        };

        Self::with_parts(config, questions, ledger).await
    }

    pub async fn with_parts(
        config: ServerConfig,
        questions: Arc<dyn QuestionSource>,
        ledger: Box<dyn WinLedger>,
    ) -> Result<Self, ServerError> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        info!("Server listening on {}", listener.local_addr().unwrap_or(addr));

        Ok(Self {
            config,
            listener,
            questions,
            ledger: ledger::share(ledger),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn ledger(&self) -> MutexGuard<'_, Box<dyn WinLedger>> {
        ledger::lock(&self.ledger)
    }

    /// Runs sessions back to back. Only a failure before the first session
    /// completes is returned; later ones are logged and the session retried.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        let mut played: u64 = 0;
        loop {
            match self.run_session().await {
                Ok(_) => played += 1,
                Err(e) => {
                    let delay = retry_delay(played, e)?;
                    sleep(delay).await;
                }
            }
        }
    }

    /// One full cycle: offer and admit, play, record the winner, tear down.
    /// Returns the winner's name.
    pub async fn run_session(&mut self) -> Result<Option<String>, ServerError> {
        let port = self.local_addr().map_err(ServerError::Broadcast)?.port();
        let offers = broadcaster::spawn(
            DiscoveryPacket::new(self.config.server_name.as_str(), port),
            self.config.broadcast_addr,
            self.config.broadcast_period,
        )
        .await
        .map_err(ServerError::Broadcast)?;

        let rules = AdmissionRules::from(&self.config);
        let entrants = admission::admit(&self.listener, &rules).await;
        let offered = offers.stop().await;
        info!(
            "Admission closed with {} participants after {} offers",
            entrants.len(),
            offered
        );

        let (reports_tx, mut reports_rx) = mpsc::unbounded_channel();
        let mut session = Session::new();
        let mut connections = Vec::with_capacity(entrants.len());
        let mut workers = JoinSet::new();

        for Entrant { name, addr, stream } in entrants {
            let (reader, writer) = stream.into_split();
            let (connection, tokens) = ConnectionHandle::spawn(name.clone(), reader, writer);
            let (commands_tx, commands_rx) = mpsc::unbounded_channel();

            let seat = Seat::new(commands_tx, connection.outbox());
            let Some(id) = session.admit(name.clone(), Some(addr), seat) else {
                warn!("Dropping {}: name already seated", name);
                connections.push(connection);
                continue;
            };

            let worker = ParticipantWorker::new(
                id,
                name,
                tokens,
                connection.outbox(),
                commands_rx,
                reports_tx.clone(),
                self.config.rounds.answer_timeout,
            );
            workers.spawn(worker.run());
            connections.push(connection);
        }
        drop(reports_tx);

        let welcome = welcome_message(&self.config.server_name, &session);
        for participant in session.participants() {
            participant.send(welcome.clone());
        }

        let mut coordinator = Coordinator::new(self.config.rounds.clone(), Arc::clone(&self.questions));
        let winner = coordinator
            .run(&mut session, &mut reports_rx)
            .await
            .map(|id| session.name_of(id).to_string());

        if let Some(name) = &winner {
            if let Err(e) = record_win_blocking(&self.ledger, name.clone()).await {
                error!("Could not record win for {}: {}", name, e);
            }
        }
        let podium = render_podium(&**self.ledger());
        info!("{}", podium);

        // Teardown: workers stop once their seats are gone
        drop(session);
        while let Some(exit) = workers.join_next().await {
            if let Err(e) = exit {
                warn!("Worker task failed: {}", e);
            }
        }

        let deadline = Instant::now() + self.config.post_game_grace;
        let mut closing = JoinSet::new();
        for connection in connections {
            closing.spawn(connection.close(deadline));
        }
        while closing.join_next().await.is_some() {}

        info!("Game over, sending out offer requests...");
        Ok(winner)
    }
}

/// Startup failures are returned as is; after at least one completed
/// session a failure only delays the next attempt.
fn retry_delay(sessions_played: u64, error: ServerError) -> Result<Duration, ServerError> {
    if sessions_played == 0 {
        return Err(error);
    }
    error!("Session failed, retrying in {:?}: {}", SESSION_RETRY_DELAY, error);
    Ok(SESSION_RETRY_DELAY)
}

/// Server name plus the roster in join order
pub fn welcome_message(server_name: &str, session: &Session) -> Message {
    let mut text = format!("Welcome to {} trivia king!\n", server_name);
    for (i, participant) in session.participants().enumerate() {
        text.push_str(&format!("Player {}: {}\n", i + 1, participant.name));
    }
    text.push_str("==\n");
    Message::welcome(text)
}
