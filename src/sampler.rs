//! Stratified, randomized allocation of the question bank into phases
//!
//! All randomness flows through one injected generator, so a session can be
//! reproduced from its recorded seed.

use crate::condition::ConditionId;
use crate::error::{EngineError, EngineResult};
use crate::question::{Difficulty, DifficultyCounts, Question, QuestionBank};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Phase index → ordered questions for that phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseAssignment {
    phases: BTreeMap<usize, Vec<Question>>,
}

impl PhaseAssignment {
    pub fn from_phases(phases: Vec<Vec<Question>>) -> Self {
        Self {
            phases: phases.into_iter().enumerate().collect(),
        }
    }

    pub fn phase(&self, index: usize) -> Option<&[Question]> {
        self.phases.get(&index).map(|q| q.as_slice())
    }

    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[Question])> {
        self.phases.iter().map(|(&i, q)| (i, q.as_slice()))
    }

    /// Total assigned questions over all phases
    pub fn question_count(&self) -> usize {
        self.phases.values().map(|q| q.len()).sum()
    }
}

pub struct QuestionSampler<R: Rng = StdRng> {
    rng: R,
    seed: Option<u64>,
}

impl QuestionSampler<StdRng> {
    /// Reproducible sampler
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed: Some(seed),
        }
    }

    /// Production sampler: draws a seed from OS entropy and records it
    pub fn from_entropy() -> Self {
        let seed: u64 = rand::thread_rng().gen();
        Self::seeded(seed)
    }
}

impl<R: Rng> QuestionSampler<R> {
    /// Use an arbitrary generator (no seed is recorded)
    pub fn with_rng(rng: R) -> Self {
        Self { rng, seed: None }
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Partition the bank into `phase_count` disjoint phases with exactly
    /// `counts` questions of each difficulty
    ///
    /// # Errors
    /// `InsufficientQuestions` if any difficulty bucket is too small
    pub fn allocate(
        &mut self,
        bank: &QuestionBank,
        phase_count: usize,
        counts: DifficultyCounts,
    ) -> EngineResult<PhaseAssignment> {
        for difficulty in Difficulty::ALL {
            let required = phase_count * counts.get(difficulty);
            let available = bank.bucket(difficulty).len();
            if available < required {
                return Err(EngineError::InsufficientQuestions {
                    difficulty,
                    required,
                    available,
                });
            }
        }

        let mut buckets: Vec<(Difficulty, Vec<Question>)> = Difficulty::ALL
            .iter()
            .map(|&d| {
                let mut bucket = bank.bucket(d).to_vec();
                bucket.shuffle(&mut self.rng);
                (d, bucket)
            })
            .collect();

        let mut phases = Vec::with_capacity(phase_count);
        for _ in 0..phase_count {
            let mut phase = Vec::with_capacity(counts.total());
            for (difficulty, bucket) in buckets.iter_mut() {
                // Consume from the front so no later phase reuses a question
                phase.extend(bucket.drain(..counts.get(*difficulty)));
            }
            phase.shuffle(&mut self.rng);
            phases.push(phase);
        }

        Ok(PhaseAssignment::from_phases(phases))
    }

    /// Uniform random permutation of the condition ids (Fisher–Yates)
    pub fn random_phase_order(&mut self, ids: &[ConditionId]) -> Vec<ConditionId> {
        let mut order = ids.to_vec();
        order.shuffle(&mut self.rng);
        order
    }

    /// Up to `count` practice questions in shuffled order
    pub fn practice_set(&mut self, bank: &QuestionBank, count: usize) -> Vec<Question> {
        let mut practice = bank.practice.clone();
        practice.shuffle(&mut self.rng);
        practice.truncate(count);
        practice
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::QuestionType;
    use std::collections::HashSet;

    fn bank(easy: usize, moderate: usize, hard: usize) -> QuestionBank {
        let make = |prefix: &str, n: usize, difficulty: Difficulty| {
            (0..n)
                .map(|i| Question {
                    id: format!("{}{}", prefix, i),
                    prompt: String::new(),
                    options: vec!["a".into(), "b".into()],
                    correct: "a".into(),
                    difficulty,
                    question_type: QuestionType::Logic,
                })
                .collect::<Vec<_>>()
        };
        QuestionBank {
            practice: make("p", 3, Difficulty::Easy),
            easy: make("e", easy, Difficulty::Easy),
            moderate: make("m", moderate, Difficulty::Moderate),
            hard: make("h", hard, Difficulty::Hard),
        }
    }

    #[test]
    fn test_allocate_is_disjoint_with_exact_counts() {
        let bank = bank(30, 20, 20);
        let counts = DifficultyCounts::new(4, 3, 3);
        let assignment = QuestionSampler::seeded(1).allocate(&bank, 5, counts).unwrap();

        assert_eq!(assignment.phase_count(), 5);
        let mut seen = HashSet::new();
        for (_, questions) in assignment.iter() {
            assert_eq!(questions.len(), 10);
            for d in Difficulty::ALL {
                let n = questions.iter().filter(|q| q.difficulty == d).count();
                assert_eq!(n, counts.get(d));
            }
            for q in questions {
                assert!(seen.insert(q.id.clone()), "{} assigned twice", q.id);
            }
        }
        assert_eq!(seen.len(), 50);
    }

    #[test]
    fn test_allocate_insufficient() {
        let bank = bank(30, 20, 9);
        let err = QuestionSampler::seeded(1)
            .allocate(&bank, 5, DifficultyCounts::new(4, 3, 2))
            .unwrap_err();
        match err {
            EngineError::InsufficientQuestions {
                difficulty,
                required,
                available,
            } => {
                assert_eq!(difficulty, Difficulty::Hard);
                assert_eq!(required, 10);
                assert_eq!(available, 9);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_exact_fit_uses_every_question() {
        let bank = bank(8, 4, 4);
        let assignment = QuestionSampler::seeded(9)
            .allocate(&bank, 4, DifficultyCounts::new(2, 1, 1))
            .unwrap();
        assert_eq!(assignment.question_count(), 16);
    }

    #[test]
    fn test_same_seed_same_allocation() {
        let bank = bank(30, 20, 20);
        let counts = DifficultyCounts::new(3, 2, 1);
        let a = QuestionSampler::seeded(42).allocate(&bank, 8, counts).unwrap();
        let b = QuestionSampler::seeded(42).allocate(&bank, 8, counts).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_phase_order_is_permutation() {
        let ids = vec![1, 2, 3, 4, 5, 6, 7, 8];
        let mut sampler = QuestionSampler::seeded(3);
        for _ in 0..20 {
            let mut order = sampler.random_phase_order(&ids);
            assert_eq!(order.len(), ids.len());
            order.sort_unstable();
            assert_eq!(order, ids);
        }
    }

    #[test]
    fn test_phase_order_varies() {
        let ids: Vec<ConditionId> = (1..=8).collect();
        let mut sampler = QuestionSampler::seeded(5);
        let orders: HashSet<Vec<ConditionId>> =
            (0..10).map(|_| sampler.random_phase_order(&ids)).collect();
        assert!(orders.len() > 1);
    }

    #[test]
    fn test_practice_set() {
        let bank = bank(1, 1, 1);
        let mut sampler = QuestionSampler::from_entropy();
        assert!(sampler.seed().is_some());
        assert_eq!(sampler.practice_set(&bank, 2).len(), 2);
        assert_eq!(sampler.practice_set(&bank, 10).len(), 3);
    }
}
