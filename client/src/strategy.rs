//! How a client picks its answers

use clap::ValueEnum;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::Rng;
use shared::protocol::answer_token;
use shared::QuestionBank;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Bot skill: the chance of answering a known question correctly
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BotLevel {
    Expert,
    Skilled,
    Average,
    Novice,
}

impl BotLevel {
    pub fn accuracy(self) -> f64 {
        match self {
            BotLevel::Expert => 0.8,
            BotLevel::Skilled => 0.65,
            BotLevel::Average => 0.4,
            BotLevel::Novice => 0.15,
        }
    }
}

/// Answers from the shared question bank, right with probability `accuracy`.
/// Questions it does not know are a coin flip.
#[derive(Debug)]
pub struct BotStrategy {
    accuracy: f64,
    bank: Arc<QuestionBank>,
    rng: StdRng,
}

impl BotStrategy {
    pub fn new(level: BotLevel, bank: Arc<QuestionBank>, rng: StdRng) -> Self {
        Self::with_accuracy(level.accuracy(), bank, rng)
    }

    pub fn with_accuracy(accuracy: f64, bank: Arc<QuestionBank>, rng: StdRng) -> Self {
        Self {
            accuracy: accuracy.clamp(0.0, 1.0),
            bank,
            rng,
        }
    }

    pub fn choose(&mut self, question: &str) -> bool {
        match self.bank.lookup(question) {
            Some(correct) => {
                if self.rng.gen_bool(self.accuracy) {
                    correct
                } else {
                    !correct
                }
            }
            None => {
                debug!("Unknown question, guessing: {}", question);
                self.rng.gen_bool(0.5)
            }
        }
    }
}

/// Answers typed by a person, one line per answer
#[derive(Debug)]
pub struct ConsoleStrategy {
    lines: mpsc::UnboundedReceiver<String>,
}

impl ConsoleStrategy {
    pub fn new(lines: mpsc::UnboundedReceiver<String>) -> Self {
        Self { lines }
    }

    /// Forwards stdin line by line from a background task.
    pub fn from_stdin() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self::new(rx)
    }

    /// The first character of the next non-empty line. Never resolves once
    /// input is closed.
    async fn next_token(&mut self) -> u8 {
        while let Some(line) = self.lines.recv().await {
            let line = line.trim();
            if let Some(token) = line.bytes().next() {
                if line.len() > 1 {
                    info!("Only the first character is sent: {}", token as char);
                }
                return token;
            }
        }
        std::future::pending().await
    }
}

#[derive(Debug)]
pub enum Strategy {
    Bot(BotStrategy),
    Console(ConsoleStrategy),
}

impl Strategy {
    /// The answer token for `question`.
    ///
    /// Cancel-safe: dropping the future before it resolves loses no input.
    pub async fn answer(&mut self, question: String) -> u8 {
        match self {
            Strategy::Bot(bot) => answer_token(bot.choose(&question)),
            Strategy::Console(console) => console.next_token().await,
        }
    }

    pub fn is_bot(&self) -> bool {
        matches!(self, Strategy::Bot(_))
    }
}
