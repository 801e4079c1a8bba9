//! Participant worker: one task per connected participant
//!
//! Each round the worker:
//! 1. waits for the coordinator's `Start` command
//! 2. sends the question and waits, under a deadline, for one valid answer
//!    token; invalid tokens get an Error frame and the wait continues against
//!    the same deadline
//! 3. reports exactly one [`Outcome`] and waits for the round's verdict
//!
//! Frames about the answer itself (Error, `Time is up!`) are queued before
//! the report goes out. The verdict frame is queued by the coordinator, ahead
//! of any standings or GameOver frame.
//!
//! The worker never touches the session. Everything it learns about the
//! connection arrives as answer bytes on `tokens`; a closed `tokens` channel
//! means the connection is gone.

use crate::session::{Outcome, ParticipantId};
use log::{debug, info, warn};
use shared::protocol::parse_answer;
use shared::Message;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

/// Coordinator → worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundCommand {
    /// Put `question` to the participant. `seq` identifies the drawn question.
    Start { seq: u64, question: String },
    Resolved { seq: u64, verdict: Verdict },
}

/// How a round ended for one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Survived,
    /// Out of the session
    Eliminated,
    /// Out of the current heat only; may play again in a later heat
    SittingOut,
    /// Nobody was right, so nobody is out
    Void,
}

impl Verdict {
    /// The General frame telling a participant how the round went
    pub fn message(self) -> Message {
        Message::general(match self {
            Verdict::Survived => "Correct! You advance to the next round.",
            Verdict::Void => "Nobody got it right, so nobody is out. Next question!",
            Verdict::SittingOut => "Wrong answer, you sit out the rest of this round.",
            Verdict::Eliminated => "Wrong answer, you are out. Stick around for the results.",
        })
    }
}

/// Worker → coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub participant: ParticipantId,
    pub seq: u64,
    pub outcome: Outcome,
}

/// Why a worker stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Eliminated,
    Disconnected,
    SessionOver,
}

pub struct ParticipantWorker {
    id: ParticipantId,
    name: String,
    tokens: mpsc::Receiver<u8>,
    outbox: mpsc::UnboundedSender<Message>,
    commands: mpsc::UnboundedReceiver<RoundCommand>,
    reports: mpsc::UnboundedSender<Report>,
    answer_timeout: Duration,
}

impl ParticipantWorker {
    pub fn new(
        id: ParticipantId,
        name: String,
        tokens: mpsc::Receiver<u8>,
        outbox: mpsc::UnboundedSender<Message>,
        commands: mpsc::UnboundedReceiver<RoundCommand>,
        reports: mpsc::UnboundedSender<Report>,
        answer_timeout: Duration,
    ) -> Self {
        Self {
            id,
            name,
            tokens,
            outbox,
            commands,
            reports,
            answer_timeout,
        }
    }

    pub fn spawn(self) -> JoinHandle<WorkerExit> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> WorkerExit {
        let exit = self.play().await;
        debug!("Worker for {} exited: {:?}", self.name, exit);
        exit
    }

    async fn play(&mut self) -> WorkerExit {
        loop {
            let (seq, question) = match self.commands.recv().await {
                Some(RoundCommand::Start { seq, question }) => (seq, question),
                Some(RoundCommand::Resolved { seq, .. }) => {
                    debug!("{} got a verdict for {} outside a round", self.name, seq);
                    continue;
                }
                None => return WorkerExit::SessionOver,
            };

            self.discard_stale_tokens();
            self.send(Message::question(question));

            let outcome = self.collect_answer().await;
            if outcome == Outcome::TimedOut {
                self.send(Message::general("Time is up!"));
            }

            let report = Report {
                participant: self.id,
                seq,
                outcome,
            };
            if self.reports.send(report).is_err() {
                return WorkerExit::SessionOver;
            }
            if outcome == Outcome::Disconnected {
                return WorkerExit::Disconnected;
            }

            match self.await_verdict(seq).await {
                None => return WorkerExit::SessionOver,
                Some(Verdict::Eliminated) => {
                    info!("{} was eliminated", self.name);
                    return WorkerExit::Eliminated;
                }
                Some(_) => {}
            }
        }
    }

    /// Waits for one valid answer token, bounded by the answer timeout.
    async fn collect_answer(&mut self) -> Outcome {
        let deadline = Instant::now() + self.answer_timeout;

        loop {
            match timeout_at(deadline, self.tokens.recv()).await {
                Err(_) => return Outcome::TimedOut,
                Ok(None) => return Outcome::Disconnected,
                Ok(Some(token)) => match parse_answer(token) {
                    Ok(answer) => return Outcome::Answered(answer),
                    Err(e) => {
                        warn!("{} sent {}", self.name, e);
                        self.send(Message::error(format!(
                            "Invalid answer: {}",
                            (token as char).escape_default()
                        )));
                    }
                },
            }
        }
    }

    async fn await_verdict(&mut self, seq: u64) -> Option<Verdict> {
        loop {
            match self.commands.recv().await? {
                RoundCommand::Resolved { seq: resolved, verdict } if resolved == seq => {
                    return Some(verdict)
                }
                other => debug!("{} skipping {:?} while awaiting verdict", self.name, other),
            }
        }
    }

    /// Answers typed before the question went out belong to no round.
    fn discard_stale_tokens(&mut self) {
        let mut discarded = 0;
        while self.tokens.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!("Discarded {} stale bytes from {}", discarded, self.name);
        }
    }

    fn send(&self, message: Message) {
        if self.outbox.send(message).is_err() {
            debug!("Outbox for {} is closed", self.name);
        }
    }
}
