//! True/false question source
//!
//! The coordinator only needs indexed access to questions and their correct
//! answers, so it talks to a [`QuestionSource`]. [`QuestionBank`] is the
//! in-tree implementation: a built-in set, or one loaded from a JSON file of
//! `[{"text": "...", "answer": true}, ...]`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// A drawn question. Immutable once drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub index: usize,
    pub text: String,
    pub answer: bool,
}

/// Indexed access to a pool of true/false questions
pub trait QuestionSource: Send + Sync {
    fn len(&self) -> usize;

    fn question(&self, index: usize) -> Option<Question>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Error, Debug)]
pub enum QuestionBankError {
    #[error("failed to read question file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse question file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("question file contains no questions")]
    Empty,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntry {
    pub text: String,
    pub answer: bool,
}

#[derive(Debug, Clone)]
pub struct QuestionBank {
    entries: Vec<QuestionEntry>,
    by_text: HashMap<String, bool>,
}

impl QuestionBank {
    pub fn new(entries: Vec<QuestionEntry>) -> Self {
        let by_text = entries
            .iter()
            .map(|entry| (entry.text.clone(), entry.answer))
            .collect();
        Self { entries, by_text }
    }

    pub fn builtin() -> Self {
        Self::new(
            BUILTIN_QUESTIONS
                .iter()
                .map(|(text, answer)| QuestionEntry {
                    text: (*text).to_string(),
                    answer: *answer,
                })
                .collect(),
        )
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, QuestionBankError> {
        let contents = std::fs::read_to_string(path)?;
        let entries: Vec<QuestionEntry> = serde_json::from_str(&contents)?;
        if entries.is_empty() {
            return Err(QuestionBankError::Empty);
        }
        Ok(Self::new(entries))
    }

    /// Correct answer for a question text, if the bank knows it
    pub fn lookup(&self, text: &str) -> Option<bool> {
        self.by_text.get(text.trim()).copied()
    }
}

impl QuestionSource for QuestionBank {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn question(&self, index: usize) -> Option<Question> {
        self.entries.get(index).map(|entry| Question {
            index,
            text: entry.text.clone(),
            answer: entry.answer,
        })
    }
}

const BUILTIN_QUESTIONS: &[(&str, bool)] = &[
    ("The Great Wall of China is visible from the Moon with the naked eye.", false),
    ("Octopuses have three hearts.", true),
    ("Mount Everest is the tallest mountain measured from base to peak.", false),
    ("Bananas are berries.", true),
    ("Strawberries are berries.", false),
    ("Light from the Sun takes about eight minutes to reach Earth.", true),
    ("Venus is the hottest planet in the Solar System.", true),
    ("A group of crows is called a murder.", true),
    ("Goldfish have a memory span of only three seconds.", false),
    ("The Pacific is the largest ocean on Earth.", true),
    ("Humans share roughly 60 percent of their DNA with bananas.", true),
    ("Lightning never strikes the same place twice.", false),
    ("Sound travels faster in water than in air.", true),
    ("The chemical symbol for gold is Ag.", false),
    ("There are 206 bones in the adult human body.", true),
    ("Sharks are mammals.", false),
    ("Mercury is the closest planet to the Sun.", true),
    ("The capital of Australia is Sydney.", false),
    ("Honey never spoils.", true),
    ("A day on Venus is longer than a year on Venus.", true),
    ("Bats are blind.", false),
    ("The Eiffel Tower can grow taller in summer.", true),
    ("Water boils at 100 degrees Celsius at sea level.", true),
    ("The Amazon is the longest river in the world by every measurement.", false),
    ("Cleopatra lived closer in time to the Moon landing than to the building of the Great Pyramid.", true),
    ("An ostrich's eye is bigger than its brain.", true),
    ("Diamonds are made of carbon.", true),
    ("The human body has four lungs.", false),
    ("Spiders are insects.", false),
    ("Sloths can hold their breath longer than dolphins.", true),
    ("Tomatoes are fruits.", true),
    ("The Sahara is the largest desert on Earth.", false),
    ("A leap year has 366 days.", true),
    ("Penguins live at the North Pole.", false),
    ("Glass is a slow-flowing liquid at room temperature.", false),
    ("The heart of a blue whale is about the size of a small car.", true),
    ("Rust is iron oxide.", true),
    ("Napoleon Bonaparte was unusually short for his time.", false),
    ("Koalas are bears.", false),
    ("The speed of light is about 300,000 kilometers per second.", true),
    ("Humans only use 10 percent of their brains.", false),
    ("Jupiter has more than one moon.", true),
    ("Peanuts are nuts.", false),
    ("The Atlantic Ocean is saltier than the Pacific Ocean.", true),
    ("Bulls are enraged by the color red.", false),
    ("Hot water can freeze faster than cold water under some conditions.", true),
    ("Antarctica is the driest continent.", true),
    ("Chameleons change color mainly to blend into their surroundings.", false),
    ("The unicorn is the national animal of Scotland.", true),
    ("Camels store water in their humps.", false),
    ("Oxygen is the most abundant element in the Earth's crust.", true),
    ("Seahorse fathers carry the babies.", true),
    ("The Moon has its own light.", false),
    ("A jiffy is an actual unit of time.", true),
    ("Mount Kilimanjaro is in Kenya.", false),
    ("The first computer programmer was Ada Lovelace.", true),
    ("Dogs sweat mainly through their tongues.", false),
    ("Pluto is classified as a dwarf planet.", true),
    ("Vikings wore horned helmets into battle.", false),
    ("Butterflies taste with their feet.", true),
];
