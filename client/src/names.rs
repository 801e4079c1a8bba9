//! Display names for players and bots

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

pub const TEAM_NAMES: &[&str] = &[
    "Hateful Brains",
    "Trivia Reservoirs",
    "Fellowship of the Quiz",
    "Sherlocked Minds",
    "Quizteros of Westeros",
    "The Big Bang Queries",
    "Stranger Thinkers",
    "Peaky Minders",
    "Quizzy Business",
    "Cerebral Assassins",
    "The Brainstorming Bandits",
    "The Trivia Titans",
    "The Mindbenders Society",
    "Puzzle Masters League",
    "Quizzards of the Coast",
    "Fact Frenzy Fighters",
    "Pulp Quiztion",
    "Quizocalypse Now",
    "Quizception",
    "Pandora's Quizbox",
    "Mind Palace Guards",
    "Riddle Me This",
    "The Knowledge Knights",
    "Quizantine Empire",
    "Trivia Templars",
    "Cranial Crusaders",
    "Jeopardy Giants",
    "Quantum Questers",
    "Socratic Circles",
    "Neuron Navigators",
    "Nobel Minds",
    "Savvy Sages",
];

pub const BOT_PREFIX: &str = "BOT_#";
const MAX_BOT_ID: u64 = 9_999_999_999;

/// Hands out names that are unique within this process.
#[derive(Debug, Default)]
pub struct NameGenerator {
    used: HashSet<String>,
}

impl NameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `BOT_#<n>` with a random, unused `n`
    pub fn bot_name<R: Rng + ?Sized>(&mut self, rng: &mut R) -> String {
        loop {
            let name = format!("{}{}", BOT_PREFIX, rng.gen_range(1..=MAX_BOT_ID));
            if self.used.insert(name.clone()) {
                return name;
            }
        }
    }

    /// A random unused team name; numbered once every name is taken.
    pub fn team_name<R: Rng + ?Sized>(&mut self, rng: &mut R) -> String {
        let free: Vec<&&str> = TEAM_NAMES
            .iter()
            .filter(|name| !self.used.contains(**name))
            .collect();

        let name = match free.choose(rng) {
            Some(name) => name.to_string(),
            None => {
                let base = TEAM_NAMES.choose(rng).copied().unwrap_or("Team");
                (2..)
                    .map(|n| format!("{} {}", base, n))
                    .find(|candidate| !self.used.contains(candidate))
                    .unwrap_or_else(|| base.to_string())
            }
        };
        self.used.insert(name.clone());
        name
    }

    /// Reserves a name chosen elsewhere, e.g. on the command line.
    pub fn reserve(&mut self, name: &str) -> bool {
        self.used.insert(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_bot_names_are_unique_and_prefixed() {
        let mut names = NameGenerator::new();
        let mut rng = StdRng::seed_from_u64(5);

        let bots: HashSet<String> = (0..500).map(|_| names.bot_name(&mut rng)).collect();
        assert_eq!(bots.len(), 500);
        assert!(bots.iter().all(|name| name.starts_with("BOT_#")));
    }

    #[test]
    fn test_team_names_are_unique_past_the_list() {
        let mut names = NameGenerator::new();
        let mut rng = StdRng::seed_from_u64(11);

        let teams: HashSet<String> = (0..TEAM_NAMES.len() + 5)
            .map(|_| names.team_name(&mut rng))
            .collect();
        assert_eq!(teams.len(), TEAM_NAMES.len() + 5);
        assert!(TEAM_NAMES.iter().all(|name| teams.contains(*name)));
    }

    #[test]
    fn test_reserved_name_is_not_handed_out() {
        let mut names = NameGenerator::new();
        let mut rng = StdRng::seed_from_u64(2);
        for name in TEAM_NAMES.iter().skip(1) {
            assert!(names.reserve(name));
        }
        assert!(!names.reserve(TEAM_NAMES[1]));
        assert_eq!(names.team_name(&mut rng), TEAM_NAMES[0]);
    }
}
