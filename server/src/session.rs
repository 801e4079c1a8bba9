//! Session state: the roster of participants and the round bookkeeping
//!
//! The [`Session`] is owned by the round coordinator once admission closes.
//! Workers never touch it directly; they report through a channel and the
//! coordinator applies those reports here, so every mutation of a
//! participant's status or answer slot happens on a single task.

use crate::worker::RoundCommand;
use log::{debug, info, warn};
use rand::Rng;
use shared::{Message, Question, QuestionSource};
use std::collections::HashSet;
use std::net::SocketAddr;
use tokio::sync::mpsc;

use crate::worker::Report;

/// Unique participant identifier, assigned in join order
pub type ParticipantId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantStatus {
    /// Identity read, waiting for admission to close
    Joining,
    Active,
    Eliminated,
    Disconnected,
}

/// What a participant said in the current round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerSlot {
    Unset,
    True,
    False,
    TimedOut,
}

impl AnswerSlot {
    /// True/False only; a timeout never matches the correct answer.
    pub fn matches(self, correct: bool) -> bool {
        matches!(
            (self, correct),
            (AnswerSlot::True, true) | (AnswerSlot::False, false)
        )
    }
}

/// The single result a worker reports per round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Answered(bool),
    TimedOut,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Admitting,
    RoundInProgress,
    Resolving,
    Finished,
}

/// The coordinator's handles onto a participant's worker and outbound queue
#[derive(Debug, Clone)]
pub struct Seat {
    commands: mpsc::UnboundedSender<RoundCommand>,
    outbox: mpsc::UnboundedSender<Message>,
}

impl Seat {
    pub fn new(
        commands: mpsc::UnboundedSender<RoundCommand>,
        outbox: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self { commands, outbox }
    }

    /// Queues a frame for the participant. Returns false once the
    /// connection's writer is gone.
    pub fn send(&self, message: Message) -> bool {
        self.outbox.send(message).is_ok()
    }

    /// Returns false once the worker has exited.
    pub fn command(&self, command: RoundCommand) -> bool {
        self.commands.send(command).is_ok()
    }
}

/// One connected player or bot
#[derive(Debug)]
pub struct Participant {
    pub id: ParticipantId,
    /// Display name, unique within the session
    pub name: String,
    pub addr: Option<SocketAddr>,
    pub status: ParticipantStatus,
    pub slot: AnswerSlot,
    /// Whether this participant's outcome for the current round is in
    pub reported: bool,
    seat: Seat,
}

impl Participant {
    pub fn new(id: ParticipantId, name: String, addr: Option<SocketAddr>, seat: Seat) -> Self {
        Self {
            id,
            name,
            addr,
            status: ParticipantStatus::Joining,
            slot: AnswerSlot::Unset,
            reported: false,
            seat,
        }
    }

    pub fn seat(&self) -> &Seat {
        &self.seat
    }

    pub fn is_connected(&self) -> bool {
        self.status != ParticipantStatus::Disconnected
    }

    /// Best-effort frame delivery; a dead connection is noticed by the worker.
    pub fn send(&self, message: Message) {
        if !self.seat.send(message) {
            debug!("Dropping frame for {}: connection closed", self.name);
        }
    }
}

/// Question indices already drawn this session
#[derive(Debug, Default)]
pub struct QuestionHistory {
    used: HashSet<usize>,
}

impl QuestionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draws uniformly from the source, rejecting indices already used.
    ///
    /// Returns `None` only when every question has been spent.
    pub fn draw<R: Rng + ?Sized>(
        &mut self,
        source: &dyn QuestionSource,
        rng: &mut R,
    ) -> Option<Question> {
        if self.used.len() >= source.len() {
            return None;
        }

        loop {
            let index = rng.gen_range(0..source.len());
            if self.used.insert(index) {
                return source.question(index);
            }
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.used.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }
}

/// A question in flight and the cohort it was put to
#[derive(Debug, Clone)]
pub struct Round {
    /// Sequence number of the drawn question, void rounds included
    pub seq: u64,
    pub question: Question,
    /// Participants that were Active when the question went out
    pub cohort: Vec<ParticipantId>,
}

/// The partition of a round's cohort after resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundResolution {
    pub correct: Vec<ParticipantId>,
    pub incorrect: Vec<ParticipantId>,
    /// Dropped out during the round; they take no part in the verdict
    pub disconnected: Vec<ParticipantId>,
}

impl RoundResolution {
    /// Nobody answered correctly: nobody is eliminated
    pub fn is_void(&self) -> bool {
        self.correct.is_empty()
    }
}

/// The live game instance
#[derive(Debug)]
pub struct Session {
    participants: Vec<Participant>,
    next_id: ParticipantId,
    pub history: QuestionHistory,
    /// Rounds that produced a verdict; void rounds do not count
    pub rounds_played: u32,
    questions_asked: u64,
    /// Accepted answers this session, indexed by `answer as usize`
    answer_counts: [u32; 2],
    current: Option<Round>,
    pub state: SessionState,
}

impl Session {
    pub fn new() -> Self {
        Self {
            participants: Vec::new(),
            next_id: 1,
            history: QuestionHistory::new(),
            rounds_played: 0,
            questions_asked: 0,
            answer_counts: [0; 2],
            current: None,
            state: SessionState::Admitting,
        }
    }

    /// Adds a participant in `Joining` status.
    ///
    /// Returns `None` if the name is already taken in this session.
    pub fn admit(
        &mut self,
        name: String,
        addr: Option<SocketAddr>,
        seat: Seat,
    ) -> Option<ParticipantId> {
        if self.is_name_taken(&name) {
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;

        info!("Participant {} joined as {:?}", id, name);
        self.participants.push(Participant::new(id, name, addr, seat));
        Some(id)
    }

    /// How many accepted answers this session were `answer`
    pub fn answer_frequency(&self, answer: bool) -> u32 {
        self.answer_counts[answer as usize]
    }

    pub fn is_name_taken(&self, name: &str) -> bool {
        self.participants.iter().any(|p| p.name == name)
    }

    /// Flips every `Joining` participant to `Active` as the game starts.
    pub fn activate_joined(&mut self) {
        for participant in &mut self.participants {
            if participant.status == ParticipantStatus::Joining {
                participant.status = ParticipantStatus::Active;
            }
        }
    }

    pub fn get(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: ParticipantId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<ParticipantId> {
        self.participants
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.id)
    }

    pub fn name_of(&self, id: ParticipantId) -> &str {
        self.get(id).map(|p| p.name.as_str()).unwrap_or("<unknown>")
    }

    /// Participants in join order
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter()
    }

    /// Active participants in join order: the cohort for the next question
    pub fn active_ids(&self) -> Vec<ParticipantId> {
        self.ids_with(|p| p.status == ParticipantStatus::Active)
    }

    pub fn connected_ids(&self) -> Vec<ParticipantId> {
        self.ids_with(Participant::is_connected)
    }

    fn ids_with(&self, predicate: impl Fn(&Participant) -> bool) -> Vec<ParticipantId> {
        self.participants
            .iter()
            .filter(|p| predicate(p))
            .map(|p| p.id)
            .collect()
    }

    pub fn set_status(&mut self, id: ParticipantId, status: ParticipantStatus) {
        if let Some(participant) = self.get_mut(id) {
            // Disconnection is permanent
            if participant.status != ParticipantStatus::Disconnected {
                participant.status = status;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn current_round(&self) -> Option<&Round> {
        self.current.as_ref()
    }

    /// Fixes the cohort to the current Active set and clears their slots.
    pub fn begin_round(&mut self, question: Question) -> &Round {
        self.questions_asked += 1;
        let cohort = self.active_ids();

        for participant in &mut self.participants {
            if cohort.contains(&participant.id) {
                participant.slot = AnswerSlot::Unset;
                participant.reported = false;
            }
        }

        self.state = SessionState::RoundInProgress;
        self.current.insert(Round {
            seq: self.questions_asked,
            question,
            cohort,
        })
    }

    /// Applies a worker's report to the current round.
    ///
    /// Each cohort member's first report for the current question is
    /// accepted; stale, duplicate or foreign reports are ignored.
    pub fn record(&mut self, report: &Report) -> bool {
        let Some(round) = self.current.as_ref() else {
            return false;
        };
        if report.seq != round.seq || !round.cohort.contains(&report.participant) {
            debug!(
                "Ignoring report from {} for question {}",
                report.participant, report.seq
            );
            return false;
        }

        let Some(participant) = self.get_mut(report.participant) else {
            return false;
        };
        if participant.reported {
            warn!("Duplicate report from {}", participant.name);
            return false;
        }

        participant.reported = true;
        match report.outcome {
            Outcome::Answered(true) => participant.slot = AnswerSlot::True,
            Outcome::Answered(false) => participant.slot = AnswerSlot::False,
            Outcome::TimedOut => participant.slot = AnswerSlot::TimedOut,
            Outcome::Disconnected => {
                info!("{} disconnected", participant.name);
                participant.status = ParticipantStatus::Disconnected;
            }
        }
        if let Outcome::Answered(answer) = report.outcome {
            self.answer_counts[answer as usize] += 1;
        }
        true
    }

    /// Cohort members whose outcome is still outstanding
    pub fn pending(&self) -> Vec<ParticipantId> {
        let Some(round) = self.current.as_ref() else {
            return Vec::new();
        };
        round
            .cohort
            .iter()
            .copied()
            .filter(|id| self.get(*id).is_some_and(|p| !p.reported))
            .collect()
    }

    /// Records every outstanding cohort member as timed out.
    pub fn expire_pending(&mut self) {
        let Some(seq) = self.current.as_ref().map(|round| round.seq) else {
            return;
        };
        for participant in self.pending() {
            self.record(&Report {
                participant,
                seq,
                outcome: Outcome::TimedOut,
            });
        }
    }

    /// Partitions the current cohort by the drawn question's answer.
    pub fn resolve(&mut self) -> RoundResolution {
        self.state = SessionState::Resolving;
        let mut resolution = RoundResolution::default();

        let Some(round) = self.current.as_ref() else {
            return resolution;
        };

        for id in &round.cohort {
            let Some(participant) = self.get(*id) else {
                continue;
            };
            if participant.status == ParticipantStatus::Disconnected {
                resolution.disconnected.push(*id);
            } else if participant.slot.matches(round.question.answer) {
                resolution.correct.push(*id);
            } else {
                resolution.incorrect.push(*id);
            }
        }

        if !resolution.is_void() {
            self.rounds_played += 1;
        }
        resolution
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shared::QuestionBank;

    fn seat() -> Seat {
        let (commands, _) = mpsc::unbounded_channel();
        let (outbox, _) = mpsc::unbounded_channel();
        Seat::new(commands, outbox)
    }

    fn session_with(names: &[&str]) -> Session {
        let mut session = Session::new();
        for name in names {
            session.admit(name.to_string(), None, seat()).unwrap();
        }
        session.activate_joined();
        session
    }

    fn question(answer: bool) -> Question {
        Question {
            index: 0,
            text: "Is this a test?".into(),
            answer,
        }
    }

    fn report(participant: ParticipantId, seq: u64, outcome: Outcome) -> Report {
        Report {
            participant,
            seq,
            outcome,
        }
    }

    #[test]
    fn test_admit_assigns_ids_in_join_order() {
        let mut session = Session::new();
        let a = session.admit("A".into(), None, seat()).unwrap();
        let b = session.admit("B".into(), None, seat()).unwrap();

        assert_eq!((a, b), (1, 2));
        assert_eq!(session.get(a).unwrap().status, ParticipantStatus::Joining);
        let names: Vec<&str> = session.participants().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_admit_rejects_duplicate_name() {
        let mut session = Session::new();
        assert!(session.admit("A".into(), None, seat()).is_some());
        assert!(session.admit("A".into(), None, seat()).is_none());
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_activate_joined() {
        let session = session_with(&["A", "B"]);
        assert_eq!(session.active_ids(), vec![1, 2]);
        assert_eq!(session.find_by_name("B"), Some(2));
    }

    #[test]
    fn test_disconnection_is_permanent() {
        let mut session = session_with(&["A"]);
        session.set_status(1, ParticipantStatus::Disconnected);
        session.set_status(1, ParticipantStatus::Active);
        assert_eq!(
            session.get(1).unwrap().status,
            ParticipantStatus::Disconnected
        );
        assert!(session.active_ids().is_empty());
    }

    #[test]
    fn test_question_history_never_repeats() {
        let bank = QuestionBank::builtin();
        let mut history = QuestionHistory::new();
        let mut rng = StdRng::seed_from_u64(7);

        let mut seen = HashSet::new();
        for _ in 0..bank.len() {
            let question = history.draw(&bank, &mut rng).unwrap();
            assert!(seen.insert(question.index));
            assert!(history.contains(question.index));
        }

        assert_eq!(history.len(), bank.len());
        assert!(history.draw(&bank, &mut rng).is_none());
    }

    #[test]
    fn test_cohort_is_fixed_at_round_start() {
        let mut session = session_with(&["A", "B"]);
        let cohort = session.begin_round(question(true)).cohort.clone();
        assert_eq!(cohort, vec![1, 2]);

        // A later join does not enter the round
        session.admit("Late".into(), None, seat()).unwrap();
        session.activate_joined();
        assert_eq!(session.current_round().unwrap().cohort, vec![1, 2]);
        assert_eq!(session.pending(), vec![1, 2]);
    }

    #[test]
    fn test_record_accepts_one_report_per_member() {
        let mut session = session_with(&["A", "B"]);
        let seq = session.begin_round(question(true)).seq;

        assert!(session.record(&report(1, seq, Outcome::Answered(true))));
        assert!(!session.record(&report(1, seq, Outcome::Answered(false))));
        assert_eq!(session.get(1).unwrap().slot, AnswerSlot::True);

        // Wrong question or not in the cohort
        assert!(!session.record(&report(2, seq + 1, Outcome::Answered(true))));
        assert!(!session.record(&report(9, seq, Outcome::Answered(true))));
        assert_eq!(session.pending(), vec![2]);
    }

    #[test]
    fn test_answer_frequency_counts_accepted_answers() {
        let mut session = session_with(&["A", "B", "C"]);
        let seq = session.begin_round(question(true)).seq;

        session.record(&report(1, seq, Outcome::Answered(true)));
        session.record(&report(2, seq, Outcome::Answered(false)));
        session.record(&report(3, seq, Outcome::TimedOut));
        // Duplicates and strays are not answers
        session.record(&report(1, seq, Outcome::Answered(true)));
        session.record(&report(2, seq + 1, Outcome::Answered(true)));

        assert_eq!(session.answer_frequency(true), 1);
        assert_eq!(session.answer_frequency(false), 1);
    }

    #[test]
    fn test_three_way_round_resolution() {
        let mut session = session_with(&["A", "B", "C"]);
        let seq = session.begin_round(question(true)).seq;
        session.record(&report(1, seq, Outcome::Answered(true)));
        session.record(&report(2, seq, Outcome::Answered(true)));
        session.record(&report(3, seq, Outcome::Answered(false)));

        let resolution = session.resolve();
        assert_eq!(resolution.correct, vec![1, 2]);
        assert_eq!(resolution.incorrect, vec![3]);
        assert!(!resolution.is_void());
        assert_eq!(session.rounds_played, 1);
    }

    #[test]
    fn test_timeouts_and_disconnects_are_not_correct() {
        let mut session = session_with(&["A", "B", "C"]);
        let seq = session.begin_round(question(false)).seq;
        session.record(&report(1, seq, Outcome::Answered(false)));
        session.record(&report(2, seq, Outcome::Disconnected));
        session.expire_pending();

        assert_eq!(session.get(3).unwrap().slot, AnswerSlot::TimedOut);
        let resolution = session.resolve();
        assert_eq!(resolution.correct, vec![1]);
        assert_eq!(resolution.incorrect, vec![3]);
        assert_eq!(resolution.disconnected, vec![2]);
        assert_eq!(session.active_ids(), vec![1, 3]);
    }

    #[test]
    fn test_void_round_is_not_counted() {
        let mut session = session_with(&["A", "B"]);
        let seq = session.begin_round(question(true)).seq;
        session.record(&report(1, seq, Outcome::Answered(false)));
        session.record(&report(2, seq, Outcome::TimedOut));

        let resolution = session.resolve();
        assert!(resolution.is_void());
        assert_eq!(session.rounds_played, 0);
        assert_eq!(session.active_ids(), vec![1, 2]);

        // The replacement question gets a new sequence number
        let next = session.begin_round(question(true)).seq;
        assert_eq!(next, seq + 1);
    }

    #[test]
    fn test_answer_slot_matching() {
        assert!(AnswerSlot::True.matches(true));
        assert!(AnswerSlot::False.matches(false));
        assert!(!AnswerSlot::TimedOut.matches(true));
        assert!(!AnswerSlot::TimedOut.matches(false));
        assert!(!AnswerSlot::Unset.matches(true));
    }
}
