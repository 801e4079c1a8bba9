//! Round coordinator
//!
//! Drives a [`Session`] from the moment admission closes until a winner is
//! known. Each question goes through three synchronization points:
//!
//! 1. **Round start**: the cohort (everyone Active right now) is fixed and
//!    every cohort worker gets a `Start` command carrying the question.
//! 2. **Outcome collection**: the coordinator counts reports until no cohort
//!    member is pending. Timeouts and disconnects count as reports, a worker
//!    that is already gone counts as disconnected the moment its `Start`
//!    cannot be delivered, and the whole wait is capped by a deadline just
//!    past the answer timeout, so one silent participant can never stall
//!    the others.
//! 3. **Resolution**: every connected cohort member is sent its verdict frame
//!    and every cohort worker gets a `Resolved` command, before any worker can
//!    see the next `Start` and before any standings or GameOver frame.
//!
//! Two stopping policies are supported, see [`StoppingPolicy`].

use crate::config::{RoundSettings, StoppingPolicy};
use crate::session::{
    Outcome, ParticipantId, ParticipantStatus, RoundResolution, Session, SessionState,
};
use crate::worker::{Report, RoundCommand, Verdict};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{Message, Question, QuestionSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout_at, Instant};

/// Extra time past the answer timeout before pending outcomes are forced
const COLLECTION_SLACK: Duration = Duration::from_secs(1);

/// How a single elimination heat ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeatOutcome {
    Winner(ParticipantId),
    NoSurvivor,
    OutOfQuestions,
}

/// Tournament points: one per heat won
#[derive(Debug, Default, Clone)]
pub struct Tally {
    wins: Vec<(ParticipantId, u32)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TallyDecision {
    KeepPlaying,
    Tiebreak(Vec<ParticipantId>),
    Winner(ParticipantId),
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: ParticipantId) {
        match self.wins.iter_mut().find(|(who, _)| *who == id) {
            Some((_, count)) => *count += 1,
            None => self.wins.push((id, 1)),
        }
    }

    pub fn count(&self, id: ParticipantId) -> u32 {
        self.wins
            .iter()
            .find(|(who, _)| *who == id)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    /// Everyone holding the top score, in the order they first scored
    pub fn leaders(&self) -> Vec<ParticipantId> {
        let Some(best) = self.wins.iter().map(|(_, count)| *count).max() else {
            return Vec::new();
        };
        self.wins
            .iter()
            .filter(|(_, count)| *count == best)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Decided once `min_rounds` are played and exactly one leader exists.
    pub fn decide(&self, rounds_played: u32, min_rounds: u32) -> TallyDecision {
        if rounds_played < min_rounds {
            return TallyDecision::KeepPlaying;
        }
        let leaders = self.leaders();
        match leaders.len() {
            0 => TallyDecision::KeepPlaying,
            1 => TallyDecision::Winner(leaders[0]),
            _ => TallyDecision::Tiebreak(leaders),
        }
    }
}

pub struct Coordinator {
    settings: RoundSettings,
    questions: Arc<dyn QuestionSource>,
    rng: StdRng,
}

impl Coordinator {
    pub fn new(settings: RoundSettings, questions: Arc<dyn QuestionSource>) -> Self {
        Self::with_rng(settings, questions, StdRng::from_entropy())
    }

    pub fn with_rng(settings: RoundSettings, questions: Arc<dyn QuestionSource>, rng: StdRng) -> Self {
        Self {
            settings,
            questions,
            rng,
        }
    }

    /// Plays a whole session and announces the result to every participant
    /// still connected. Returns the winner, if any.
    pub async fn run(
        &mut self,
        session: &mut Session,
        reports: &mut mpsc::UnboundedReceiver<Report>,
    ) -> Option<ParticipantId> {
        session.activate_joined();
        info!("Game starting with {} participants", session.active_ids().len());

        let winner = match self.settings.policy {
            StoppingPolicy::SingleElimination => {
                let everyone = session.connected_ids();
                match self.run_heat(session, reports, &everyone, Verdict::Eliminated).await {
                    HeatOutcome::Winner(id) => Some(id),
                    HeatOutcome::NoSurvivor | HeatOutcome::OutOfQuestions => None,
                }
            }
            StoppingPolicy::Tournament { min_rounds } => {
                self.run_tournament(session, reports, min_rounds).await
            }
        };

        session.state = SessionState::Finished;
        info!(
            "Answers this game: {} true, {} false",
            session.answer_frequency(true),
            session.answer_frequency(false)
        );
        announce_result(session, winner);
        winner
    }

    async fn run_tournament(
        &mut self,
        session: &mut Session,
        reports: &mut mpsc::UnboundedReceiver<Report>,
        min_rounds: u32,
    ) -> Option<ParticipantId> {
        let mut tally = Tally::new();
        let mut heats_won = 0;

        loop {
            let connected = session.connected_ids();
            if connected.is_empty() {
                info!("Everyone left, ending the tournament");
                return None;
            }

            let entrants = match tally.decide(heats_won, min_rounds) {
                TallyDecision::Winner(id) => return Some(id),
                TallyDecision::KeepPlaying => connected,
                TallyDecision::Tiebreak(leaders) => {
                    let live: Vec<ParticipantId> = leaders
                        .into_iter()
                        .filter(|id| connected.contains(id))
                        .collect();
                    match live.len() {
                        0 => connected,
                        1 => return Some(live[0]),
                        _ => {
                            info!("Tiebreak between {} participants", live.len());
                            live
                        }
                    }
                }
            };

            match self.run_heat(session, reports, &entrants, Verdict::SittingOut).await {
                HeatOutcome::Winner(id) => {
                    tally.record(id);
                    heats_won += 1;
                    info!(
                        "Round {} goes to {} ({} wins)",
                        heats_won,
                        session.name_of(id),
                        tally.count(id)
                    );
                    broadcast(session, standings_message(session, &tally, heats_won, id));
                }
                HeatOutcome::NoSurvivor => {}
                HeatOutcome::OutOfQuestions => {
                    let leaders = tally.leaders();
                    return (leaders.len() == 1).then(|| leaders[0]);
                }
            }
        }
    }

    /// Single-elimination among `entrants` until at most one is left.
    /// Losers get `loser_verdict`.
    async fn run_heat(
        &mut self,
        session: &mut Session,
        reports: &mut mpsc::UnboundedReceiver<Report>,
        entrants: &[ParticipantId],
        loser_verdict: Verdict,
    ) -> HeatOutcome {
        for id in session.connected_ids() {
            let status = if entrants.contains(&id) {
                ParticipantStatus::Active
            } else {
                ParticipantStatus::Eliminated
            };
            session.set_status(id, status);
        }

        loop {
            let active = session.active_ids();
            match active.as_slice() {
                [] => return HeatOutcome::NoSurvivor,
                [last] => return HeatOutcome::Winner(*last),
                _ => {}
            }

            let Some(question) = session.history.draw(self.questions.as_ref(), &mut self.rng) else {
                warn!("Question bank exhausted after {} questions", session.history.len());
                return HeatOutcome::OutOfQuestions;
            };

            self.play_round(session, reports, question, loser_verdict).await;

            if !self.settings.round_pause.is_zero() {
                sleep(self.settings.round_pause).await;
            }
        }
    }

    /// One question: broadcast, collect, resolve.
    async fn play_round(
        &mut self,
        session: &mut Session,
        reports: &mut mpsc::UnboundedReceiver<Report>,
        question: Question,
        loser_verdict: Verdict,
    ) -> RoundResolution {
        let round = session.begin_round(question).clone();
        info!(
            "Question {} (#{}) to {} participants: {} [{}]",
            round.seq,
            round.question.index,
            round.cohort.len(),
            round.question.text,
            round.question.answer
        );

        // Round start
        for id in &round.cohort {
            let delivered = session.get(*id).is_some_and(|p| {
                p.seat().command(RoundCommand::Start {
                    seq: round.seq,
                    question: round.question.text.clone(),
                })
            });
            if !delivered {
                session.record(&Report {
                    participant: *id,
                    seq: round.seq,
                    outcome: Outcome::Disconnected,
                });
            }
        }

        // Outcome collection
        let deadline = Instant::now() + self.settings.answer_timeout + COLLECTION_SLACK;
        while !session.pending().is_empty() {
            match timeout_at(deadline, reports.recv()).await {
                Ok(Some(report)) => {
                    session.record(&report);
                }
                Ok(None) => {
                    warn!("All workers are gone");
                    break;
                }
                Err(_) => {
                    warn!("{} participants never reported", session.pending().len());
                    break;
                }
            }
        }
        session.expire_pending();

        // Resolution
        let resolution = session.resolve();
        let verdicts: Vec<(ParticipantId, Verdict)> = if resolution.is_void() {
            info!("Nobody answered question {} correctly, replaying", round.seq);
            resolution
                .incorrect
                .iter()
                .map(|id| (*id, Verdict::Void))
                .collect()
        } else {
            for id in &resolution.incorrect {
                session.set_status(*id, ParticipantStatus::Eliminated);
                debug!("{} is out", session.name_of(*id));
            }
            resolution
                .correct
                .iter()
                .map(|id| (*id, Verdict::Survived))
                .chain(resolution.incorrect.iter().map(|id| (*id, loser_verdict)))
                .collect()
        };

        // Verdict frames go into the outbox here, so they are queued ahead of
        // any standings or GameOver frame that follows
        for (id, verdict) in verdicts {
            if let Some(participant) = session.get(id) {
                if participant.is_connected() {
                    participant.send(verdict.message());
                }
                participant.seat().command(RoundCommand::Resolved {
                    seq: round.seq,
                    verdict,
                });
            }
        }

        resolution
    }
}

fn broadcast(session: &Session, message: Message) {
    for participant in session.participants().filter(|p| p.is_connected()) {
        participant.send(message.clone());
    }
}

fn standings_message(session: &Session, tally: &Tally, round: u32, winner: ParticipantId) -> Message {
    let mut standings: Vec<(&str, u32)> = session
        .participants()
        .map(|p| (p.name.as_str(), tally.count(p.id)))
        .collect();
    // Stable sort keeps join order among equal scores
    standings.sort_by(|a, b| b.1.cmp(&a.1));

    let mut text = format!("Round {} winner: {}\n", round, session.name_of(winner));
    for (name, wins) in standings {
        text.push_str(&format!("{}: {}\n", name, wins));
    }
    Message::general(text)
}

fn announce_result(session: &Session, winner: Option<ParticipantId>) {
    match winner {
        None => {
            info!("Game over, no winner");
            broadcast(session, Message::game_over("No winner"));
        }
        Some(winner) => {
            let name = session.name_of(winner);
            info!("Game over, the winner is {}", name);
            for participant in session.participants().filter(|p| p.is_connected()) {
                let text = if participant.id == winner {
                    "You are the winner!".to_string()
                } else {
                    format!("The winner is: {}", name)
                };
                participant.send(Message::game_over(text));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Seat;
    use crate::worker::ParticipantWorker;
    use shared::protocol::answer_token;
    use shared::MessageKind;
    use std::collections::{HashSet, VecDeque};
    use tokio::task::JoinHandle;

    const ANSWER_TIMEOUT: Duration = Duration::from_secs(20);

    /// Every answer is true, so `Play::Answer(true)` is always correct.
    struct AllTrue(usize);

    impl QuestionSource for AllTrue {
        fn len(&self) -> usize {
            self.0
        }

        fn question(&self, index: usize) -> Option<Question> {
            (index < self.0).then(|| Question {
                index,
                text: format!("Question {}", index),
                answer: true,
            })
        }
    }

    #[derive(Debug, Clone, Copy)]
    enum Play {
        Answer(bool),
        Silent,
        HangUp,
    }

    struct Table {
        session: Session,
        reports: mpsc::UnboundedReceiver<Report>,
        players: Vec<JoinHandle<Vec<Message>>>,
    }

    /// Seats one real worker per script. Each scripted player answers the
    /// questions it is sent in order and collects every frame it receives.
    fn table(scripts: Vec<(&str, Vec<Play>)>) -> Table {
        let mut session = Session::new();
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let mut players = Vec::new();

        for (name, script) in scripts {
            let (tokens_tx, tokens_rx) = mpsc::channel(16);
            let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel();
            let (commands_tx, commands_rx) = mpsc::unbounded_channel();

            let id = session
                .admit(name.to_string(), None, Seat::new(commands_tx, outbox_tx.clone()))
                .unwrap();
            ParticipantWorker::new(
                id,
                name.to_string(),
                tokens_rx,
                outbox_tx,
                commands_rx,
                reports_tx.clone(),
                ANSWER_TIMEOUT,
            )
            .spawn();

            players.push(tokio::spawn(async move {
                let mut script: VecDeque<Play> = script.into();
                let mut tokens = Some(tokens_tx);
                let mut frames = Vec::new();
                while let Some(frame) = outbox_rx.recv().await {
                    if frame.kind == MessageKind::Question {
                        match script.pop_front().unwrap_or(Play::Silent) {
                            Play::Answer(answer) => {
                                if let Some(tokens) = &tokens {
                                    let _ = tokens.try_send(answer_token(answer));
                                }
                            }
                            Play::Silent => {}
                            Play::HangUp => tokens = None,
                        }
                    }
                    frames.push(frame);
                }
                frames
            }));
        }

        Table {
            session,
            reports: reports_rx,
            players,
        }
    }

    fn coordinator(policy: StoppingPolicy) -> Coordinator {
        let settings = RoundSettings {
            answer_timeout: ANSWER_TIMEOUT,
            round_pause: Duration::ZERO,
            policy,
        };
        Coordinator::with_rng(settings, Arc::new(AllTrue(100)), StdRng::seed_from_u64(42))
    }

    impl Table {
        async fn play(&mut self, policy: StoppingPolicy) -> Option<ParticipantId> {
            coordinator(policy)
                .run(&mut self.session, &mut self.reports)
                .await
        }

        /// Ends the session and returns what each player saw.
        async fn frames(self) -> Vec<Vec<Message>> {
            drop(self.session);
            let mut all = Vec::new();
            for player in self.players {
                all.push(player.await.unwrap());
            }
            all
        }
    }

    fn kinds(frames: &[Message]) -> Vec<MessageKind> {
        frames.iter().map(|m| m.kind).collect()
    }

    fn payloads(frames: &[Message], kind: MessageKind) -> Vec<String> {
        frames
            .iter()
            .filter(|m| m.kind == kind)
            .map(|m| m.payload.clone())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_elimination_three_players() {
        use Play::*;
        let mut table = table(vec![
            ("A", vec![Answer(true), Answer(true)]),
            ("B", vec![Answer(true), Answer(false)]),
            ("C", vec![Answer(false)]),
        ]);

        let winner = table.play(StoppingPolicy::SingleElimination).await;
        assert_eq!(winner, Some(1));
        assert_eq!(table.session.rounds_played, 2);
        assert_eq!(table.session.history.len(), 2);
        // C went out in the first round, so the second cohort was A and B
        assert_eq!(table.session.current_round().unwrap().cohort, vec![1, 2]);
        assert_eq!(table.session.get(3).unwrap().status, ParticipantStatus::Eliminated);
        assert_eq!(table.session.state, SessionState::Finished);
        assert_eq!(table.session.answer_frequency(true), 3);
        assert_eq!(table.session.answer_frequency(false), 2);

        let frames = table.frames().await;
        assert_eq!(payloads(&frames[0], MessageKind::GameOver), vec!["You are the winner!"]);
        assert_eq!(payloads(&frames[1], MessageKind::GameOver), vec!["The winner is: A"]);
        assert_eq!(payloads(&frames[2], MessageKind::Question).len(), 1);
        assert!(payloads(&frames[2], MessageKind::General)
            .contains(&"Wrong answer, you are out. Stick around for the results.".to_string()));
        assert_eq!(payloads(&frames[2], MessageKind::GameOver), vec!["The winner is: A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_game_over_is_the_last_frame() {
        let mut table = table(vec![
            ("A", vec![Play::Answer(true)]),
            ("B", vec![Play::Answer(false)]),
        ]);

        assert_eq!(table.play(StoppingPolicy::SingleElimination).await, Some(1));

        let frames = table.frames().await;
        let expected = vec![MessageKind::Question, MessageKind::General, MessageKind::GameOver];
        assert_eq!(kinds(&frames[0]), expected);
        assert_eq!(kinds(&frames[1]), expected);

        assert_eq!(frames[0][1], Verdict::Survived.message());
        assert_eq!(frames[0][2], Message::game_over("You are the winner!"));
        assert_eq!(frames[1][1], Verdict::Eliminated.message());
        assert_eq!(frames[1][2], Message::game_over("The winner is: A"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tournament_verdict_precedes_standings() {
        let mut table = table(vec![
            ("A", vec![Play::Answer(true); 2]),
            ("B", vec![Play::Answer(false); 2]),
        ]);

        assert_eq!(table.play(StoppingPolicy::Tournament { min_rounds: 2 }).await, Some(1));

        let frames = table.frames().await;
        let a: Vec<&str> = frames[0].iter().skip(1).map(|m| m.payload.as_str()).collect();
        assert_eq!(
            a,
            vec![
                "Correct! You advance to the next round.",
                "Round 1 winner: A\nA: 1\nB: 0\n",
                frames[0][3].payload.as_str(),
                "Correct! You advance to the next round.",
                "Round 2 winner: A\nA: 2\nB: 0\n",
                "You are the winner!",
            ]
        );
        assert_eq!(frames[0][3].kind, MessageKind::Question);
        assert_eq!(frames[1].last(), Some(&Message::game_over("The winner is: A")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_resolves_round_immediately() {
        let mut table = table(vec![("A", vec![Play::Answer(true)]), ("B", vec![Play::HangUp])]);

        let started = Instant::now();
        let winner = table.play(StoppingPolicy::SingleElimination).await;

        assert_eq!(winner, Some(1));
        assert_eq!(table.session.rounds_played, 1);
        assert_eq!(table.session.get(2).unwrap().status, ParticipantStatus::Disconnected);
        assert!(started.elapsed() < ANSWER_TIMEOUT);

        let frames = table.frames().await;
        assert!(payloads(&frames[1], MessageKind::GameOver).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_void_round_eliminates_nobody() {
        use Play::*;
        let mut table = table(vec![
            ("A", vec![Answer(false), Answer(true)]),
            ("B", vec![Silent, Answer(false)]),
        ]);

        let started = Instant::now();
        let winner = table.play(StoppingPolicy::SingleElimination).await;

        assert_eq!(winner, Some(1));
        // The void question is spent but not counted
        assert_eq!(table.session.history.len(), 2);
        assert_eq!(table.session.rounds_played, 1);
        // B's silence costs one answer timeout, no more
        assert!(started.elapsed() < ANSWER_TIMEOUT * 2);

        let frames = table.frames().await;
        let void = "Nobody got it right, so nobody is out. Next question!".to_string();
        assert!(payloads(&frames[0], MessageKind::General).contains(&void));
        assert!(payloads(&frames[1], MessageKind::General).contains(&void));
        assert!(payloads(&frames[1], MessageKind::General).contains(&"Time is up!".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_everyone_leaving_means_no_winner() {
        let mut table = table(vec![("A", vec![Play::HangUp]), ("B", vec![Play::HangUp])]);

        let winner = table.play(StoppingPolicy::SingleElimination).await;
        assert_eq!(winner, None);
        assert!(table.session.connected_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_questions_never_repeat_within_session() {
        use Play::*;
        // Six void rounds before A finally gets one right
        let mut a = vec![Answer(false); 6];
        a.push(Answer(true));
        let b = vec![Answer(false); 7];
        let mut table = table(vec![("A", a), ("B", b)]);

        table.play(StoppingPolicy::SingleElimination).await;

        assert_eq!(table.session.history.len(), 7);
        let asked: HashSet<usize> = (0..100).filter(|i| table.session.history.contains(*i)).collect();
        assert_eq!(asked.len(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tournament_clear_leader_after_min_rounds() {
        let mut table = table(vec![
            ("A", vec![Play::Answer(true); 3]),
            ("B", vec![Play::Answer(false); 3]),
        ]);

        let winner = table.play(StoppingPolicy::Tournament { min_rounds: 3 }).await;
        assert_eq!(winner, Some(1));
        // Sitting out a heat is not elimination from the session
        assert_eq!(table.session.history.len(), 3);

        let frames = table.frames().await;
        let standings = payloads(&frames[1], MessageKind::General);
        assert!(standings.contains(&"Round 1 winner: A\nA: 1\nB: 0\n".to_string()));
        assert!(standings.contains(&"Round 3 winner: A\nA: 3\nB: 0\n".to_string()));
        assert_eq!(payloads(&frames[1], MessageKind::Question).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tournament_runs_tiebreak_between_leaders() {
        use Play::*;
        let mut table = table(vec![
            ("A", vec![Answer(true), Answer(false), Answer(false), Answer(true)]),
            ("B", vec![Answer(false), Answer(true), Answer(false), Answer(false)]),
            ("C", vec![Answer(false), Answer(false), Answer(true), Answer(false)]),
        ]);

        let winner = table.play(StoppingPolicy::Tournament { min_rounds: 3 }).await;
        assert_eq!(winner, Some(1));
        assert_eq!(table.session.history.len(), 4);

        let frames = table.frames().await;
        assert!(payloads(&frames[2], MessageKind::General)
            .contains(&"Round 4 winner: A\nA: 2\nB: 1\nC: 1\n".to_string()));
        assert_eq!(payloads(&frames[2], MessageKind::GameOver), vec!["The winner is: A"]);
    }

    #[test]
    fn test_tally_decided_after_min_rounds() {
        let mut tally = Tally::new();
        tally.record(1);
        tally.record(2);
        tally.record(1);

        assert_eq!(tally.decide(2, 3), TallyDecision::KeepPlaying);
        assert_eq!(tally.decide(3, 3), TallyDecision::Winner(1));
    }

    #[test]
    fn test_tally_tie_needs_another_round() {
        let mut tally = Tally::new();
        tally.record(1);
        tally.record(2);

        assert_eq!(tally.count(1), 1);
        assert_eq!(tally.count(3), 0);
        assert_eq!(tally.decide(3, 3), TallyDecision::Tiebreak(vec![1, 2]));

        tally.record(2);
        assert_eq!(tally.decide(4, 3), TallyDecision::Winner(2));
    }

    #[test]
    fn test_empty_tally_keeps_playing() {
        assert_eq!(Tally::new().decide(5, 3), TallyDecision::KeepPlaying);
        assert!(Tally::new().leaders().is_empty());
    }
}
