//! Win ledger: how many sessions each name has won
//!
//! [`FileLedger`] keeps the counts in a JSON object (`{"name": wins}`) and
//! rewrites the whole file on every win through a temp file + rename, so a
//! crash mid-write leaves the previous counts intact.
//!
//! Those writes block, so the server keeps its ledger behind a
//! [`SharedLedger`] and records wins through [`record_win_blocking`], which
//! runs them on tokio's blocking pool.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("ledger file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("ledger write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub trait WinLedger: Send {
    /// Adds one win for `name`. Durable once this returns `Ok`.
    fn record_win(&mut self, name: &str) -> Result<(), LedgerError>;

    /// Every name with its win count, most wins first, ties by name
    fn leaderboard(&self) -> Vec<(String, u32)>;

    fn wins(&self, name: &str) -> u32 {
        self.leaderboard()
            .into_iter()
            .find(|(who, _)| who == name)
            .map(|(_, wins)| wins)
            .unwrap_or(0)
    }

    /// Sessions that ended with a winner
    fn total_games(&self) -> u32 {
        self.leaderboard().iter().map(|(_, wins)| wins).sum()
    }

    fn leader(&self) -> Option<(String, u32)> {
        self.leaderboard().into_iter().next()
    }
}

fn ranked(counts: &BTreeMap<String, u32>) -> Vec<(String, u32)> {
    let mut board: Vec<(String, u32)> = counts
        .iter()
        .map(|(name, wins)| (name.clone(), *wins))
        .collect();
    // BTreeMap order already sorts by name; the stable sort keeps it for ties
    board.sort_by(|a, b| b.1.cmp(&a.1));
    board
}

/// In-process ledger, forgotten when the server exits
#[derive(Debug, Default)]
pub struct MemoryLedger {
    counts: BTreeMap<String, u32>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WinLedger for MemoryLedger {
    fn record_win(&mut self, name: &str) -> Result<(), LedgerError> {
        *self.counts.entry(name.to_string()).or_insert(0) += 1;
        Ok(())
    }

    fn leaderboard(&self) -> Vec<(String, u32)> {
        ranked(&self.counts)
    }
}

/// On-disk layout: a single JSON object of name to wins
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
struct WinCounts(BTreeMap<String, u32>);

/// JSON-file ledger
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    counts: WinCounts,
}

impl FileLedger {
    /// Loads existing counts, or starts empty if the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let counts: WinCounts = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => WinCounts::default(),
            Ok(text) => serde_json::from_str(&text).map_err(|source| LedgerError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No ledger at {}, starting fresh", path.display());
                WinCounts::default()
            }
            Err(source) => return Err(LedgerError::Io { path, source }),
        };

        info!("Loaded {} champions from {}", counts.0.len(), path.display());
        Ok(Self { path, counts })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), LedgerError> {
        let io_err = |source| LedgerError::Io {
            path: self.path.clone(),
            source,
        };

        let json = serde_json::to_string_pretty(&self.counts).map_err(|source| LedgerError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        let mut file = File::create(&staging).map_err(io_err)?;
        file.write_all(json.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        fs::rename(&staging, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl WinLedger for FileLedger {
    fn record_win(&mut self, name: &str) -> Result<(), LedgerError> {
        *self.counts.0.entry(name.to_string()).or_insert(0) += 1;
        self.persist()
    }

    fn leaderboard(&self) -> Vec<(String, u32)> {
        ranked(&self.counts.0)
    }
}

pub type SharedLedger = Arc<Mutex<Box<dyn WinLedger>>>;

pub fn share(ledger: Box<dyn WinLedger>) -> SharedLedger {
    Arc::new(Mutex::new(ledger))
}

/// Locks the ledger. A panic during an earlier write leaves the counts as
/// they were, so a poisoned lock is still usable.
pub fn lock(ledger: &SharedLedger) -> MutexGuard<'_, Box<dyn WinLedger>> {
    ledger.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records a win on the blocking pool so file I/O never stalls the runtime.
pub async fn record_win_blocking(ledger: &SharedLedger, name: String) -> Result<(), LedgerError> {
    let ledger = Arc::clone(ledger);
    tokio::task::spawn_blocking(move || lock(&ledger).record_win(&name)).await?
}

/// Top three on a podium, then everyone.
pub fn render_podium(ledger: &dyn WinLedger) -> String {
    let board = ledger.leaderboard();
    if board.is_empty() {
        return "No champions yet".to_string();
    }

    let mut text = String::from("Hall of champions\n");
    for (place, (name, wins)) in board.iter().take(3).enumerate() {
        let medal = ["Gold", "Silver", "Bronze"][place];
        text.push_str(&format!("{:>6}: {} ({} wins)\n", medal, name, wins));
    }
    text.push_str(&format!("Games won so far: {}\n", ledger.total_games()));
    for (rank, (name, wins)) in board.iter().enumerate() {
        text.push_str(&format!("{:>3}. {:<24} {}\n", rank + 1, name, wins));
    }
    text
}
