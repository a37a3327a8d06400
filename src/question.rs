//! Question bank types
//!
//! The bank is static input data: `{practice, easy, moderate, hard}` lists
//! of multiple-choice questions, validated once when loaded.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Moderate,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Moderate, Difficulty::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Moderate => "moderate",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Sequence,
    Analogy,
    Logic,
    Letter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct: String,
    pub difficulty: Difficulty,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
}

impl Question {
    /// Options must be unique and contain the correct answer
    pub fn validate(&self) -> EngineResult<()> {
        if self.options.len() < 2 {
            return Err(EngineError::InvalidQuestion(format!(
                "{}: needs at least two options",
                self.id
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.options.iter().find(|o| !seen.insert(o.as_str())) {
            return Err(EngineError::InvalidQuestion(format!(
                "{}: duplicate option '{}'",
                self.id, dup
            )));
        }
        if !self.options.contains(&self.correct) {
            return Err(EngineError::InvalidQuestion(format!(
                "{}: correct answer '{}' is not an option",
                self.id, self.correct
            )));
        }
        Ok(())
    }

    pub fn is_correct(&self, answer: &str) -> bool {
        self.correct == answer
    }
}

/// Per-difficulty question counts for one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyCounts {
    pub easy: usize,
    pub moderate: usize,
    pub hard: usize,
}

impl DifficultyCounts {
    pub fn new(easy: usize, moderate: usize, hard: usize) -> Self {
        Self {
            easy,
            moderate,
            hard,
        }
    }

    pub fn get(&self, difficulty: Difficulty) -> usize {
        match difficulty {
            Difficulty::Easy => self.easy,
            Difficulty::Moderate => self.moderate,
            Difficulty::Hard => self.hard,
        }
    }

    pub fn total(&self) -> usize {
        self.easy + self.moderate + self.hard
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionBank {
    #[serde(default)]
    pub practice: Vec<Question>,
    #[serde(default)]
    pub easy: Vec<Question>,
    #[serde(default)]
    pub moderate: Vec<Question>,
    #[serde(default)]
    pub hard: Vec<Question>,
}

impl QuestionBank {
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let bank: Self = serde_json::from_str(json)?;
        bank.validate()?;
        Ok(bank)
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn bucket(&self, difficulty: Difficulty) -> &[Question] {
        match difficulty {
            Difficulty::Easy => &self.easy,
            Difficulty::Moderate => &self.moderate,
            Difficulty::Hard => &self.hard,
        }
    }

    /// Every question valid, filed under its own difficulty, ids unique
    pub fn validate(&self) -> EngineResult<()> {
        let mut ids = HashSet::new();
        let all = self.practice.iter().chain(
            Difficulty::ALL
                .iter()
                .flat_map(|&d| self.bucket(d).iter()),
        );
        for question in all {
            question.validate()?;
            if !ids.insert(question.id.as_str()) {
                return Err(EngineError::InvalidQuestion(format!(
                    "duplicate question id {}",
                    question.id
                )));
            }
        }
        for difficulty in Difficulty::ALL {
            if let Some(q) = self.bucket(difficulty).iter().find(|q| q.difficulty != difficulty) {
                return Err(EngineError::InvalidQuestion(format!(
                    "{} is {} but filed under {}",
                    q.id, q.difficulty, difficulty
                )));
            }
        }
        Ok(())
    }

    /// Questions available for test phases
    pub fn test_question_count(&self) -> usize {
        self.easy.len() + self.moderate.len() + self.hard.len()
    }

    /// Question bank shipped with the binary
    pub fn builtin() -> EngineResult<Self> {
        Self::from_json(include_str!("../data/questions.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: &str, options: &[&str], correct: &str) -> Question {
        Question {
            id: id.to_string(),
            prompt: "?".to_string(),
            options: options.iter().map(|s| s.to_string()).collect(),
            correct: correct.to_string(),
            difficulty: Difficulty::Easy,
            question_type: QuestionType::Logic,
        }
    }

    #[test]
    fn test_valid_question() {
        let q = question("q1", &["a", "b", "c"], "b");
        q.validate().unwrap();
        assert!(q.is_correct("b"));
        assert!(!q.is_correct("a"));
    }

    #[test]
    fn test_duplicate_options_rejected() {
        let q = question("q1", &["a", "a", "c"], "c");
        assert!(matches!(q.validate(), Err(EngineError::InvalidQuestion(_))));
    }

    #[test]
    fn test_correct_must_be_an_option() {
        let q = question("q1", &["a", "b"], "z");
        assert!(matches!(q.validate(), Err(EngineError::InvalidQuestion(_))));
    }

    #[test]
    fn test_bank_rejects_duplicate_ids_and_misfiled_questions() {
        let mut bank = QuestionBank {
            easy: vec![question("q1", &["a", "b"], "a"), question("q1", &["a", "b"], "b")],
            ..Default::default()
        };
        assert!(bank.validate().is_err());

        // An easy question filed under hard
        let misfiled = question("q2", &["a", "b"], "a");
        bank.easy.truncate(1);
        bank.hard = vec![misfiled];
        assert!(bank.validate().is_err());
    }

    #[test]
    fn test_bank_json_shape() {
        let json = r#"{
            "practice": [],
            "easy": [{"id": "e1", "prompt": "2, 4, 6, ?", "options": ["7", "8"],
                      "correct": "8", "difficulty": "easy", "type": "sequence"}],
            "moderate": [],
            "hard": []
        }"#;
        let bank = QuestionBank::from_json(json).unwrap();
        assert_eq!(bank.easy[0].question_type, QuestionType::Sequence);
        assert_eq!(bank.test_question_count(), 1);
    }

    #[test]
    fn test_builtin_bank_is_valid() {
        let bank = QuestionBank::builtin().unwrap();
        assert!(bank.practice.len() >= 3);
        assert!(bank.easy.len() >= 32);
        assert!(bank.moderate.len() >= 24);
        assert!(bank.hard.len() >= 15);
    }

    #[test]
    fn test_counts_total() {
        let counts = DifficultyCounts::new(4, 3, 3);
        assert_eq!(counts.total(), 10);
        assert_eq!(counts.get(Difficulty::Moderate), 3);
    }
}
