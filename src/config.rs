//! Experiment configuration
//!
//! One TOML file selects the protocol, tunes the stimulus engine and the
//! hypothesis thresholds, and says where sessions are stored. Every section
//! is optional; missing values fall back to the defaults below.

use crate::condition::{ConditionCatalog, ConditionId};
use crate::error::{EngineError, EngineResult};
use crate::hypothesis::HypothesisThresholds;
use crate::question::{DifficultyCounts, QuestionBank};
use crate::signal_chain::ChainSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A phase protocol: which conditions run and how each phase is stratified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    pub name: String,
    /// One phase per condition, in catalog terms; order is randomized per session
    pub condition_ids: Vec<ConditionId>,
    pub practice_questions: usize,
    /// Seconds of stimulus before the questions; 0 disables pre-exposure
    pub pre_exposure_seconds: u32,
    pub counts: DifficultyCounts,
}

impl Protocol {
    /// Five phases, 4 easy / 3 moderate / 3 hard, no pre-exposure
    pub fn original() -> Self {
        Self {
            name: "original".to_string(),
            condition_ids: vec![1, 2, 3, 4, 6],
            practice_questions: 3,
            pre_exposure_seconds: 0,
            counts: DifficultyCounts::new(4, 3, 3),
        }
    }

    /// Eight phases, 3 easy / 2 moderate / 1 hard, 180 s pre-exposure
    pub fn extended() -> Self {
        Self {
            name: "extended".to_string(),
            condition_ids: (1..=8).collect(),
            practice_questions: 3,
            pre_exposure_seconds: 180,
            counts: DifficultyCounts::new(3, 2, 1),
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "original" => Some(Self::original()),
            "extended" => Some(Self::extended()),
            _ => None,
        }
    }

    pub fn phase_count(&self) -> usize {
        self.condition_ids.len()
    }

    pub fn has_pre_exposure(&self) -> bool {
        self.pre_exposure_seconds > 0
    }

    /// Conditions exist and the bank can fill every phase
    pub fn validate(&self, catalog: &ConditionCatalog, bank: &QuestionBank) -> EngineResult<()> {
        if self.condition_ids.is_empty() {
            return Err(EngineError::Config(format!(
                "protocol {} has no conditions",
                self.name
            )));
        }
        let mut seen = std::collections::BTreeSet::new();
        for &id in &self.condition_ids {
            catalog.require(id)?;
            if !seen.insert(id) {
                return Err(EngineError::Config(format!(
                    "protocol {} lists condition {} twice",
                    self.name, id
                )));
            }
        }
        for difficulty in crate::question::Difficulty::ALL {
            let required = self.phase_count() * self.counts.get(difficulty);
            let available = bank.bucket(difficulty).len();
            if available < required {
                return Err(EngineError::InsufficientQuestions {
                    difficulty,
                    required,
                    available,
                });
            }
        }
        Ok(())
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::original()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Session store directory; defaults to the user data directory
    pub store_dir: Option<PathBuf>,
    /// Question bank file; defaults to the built-in bank
    pub question_bank: Option<PathBuf>,
    /// Condition catalog file; defaults to the built-in catalog
    pub catalog: Option<PathBuf>,
    pub protocol: Protocol,
    pub engine: ChainSettings,
    pub thresholds: HypothesisThresholds,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            store_dir: None,
            question_bank: None,
            catalog: None,
            protocol: Protocol::default(),
            engine: ChainSettings::default(),
            thresholds: HypothesisThresholds::default(),
        }
    }
}

impl ExperimentConfig {
    pub fn from_toml(content: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.engine.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    pub fn to_toml(&self) -> EngineResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load_catalog(&self) -> EngineResult<ConditionCatalog> {
        match &self.catalog {
            Some(path) => ConditionCatalog::load(path),
            None => Ok(ConditionCatalog::default()),
        }
    }

    pub fn load_question_bank(&self) -> EngineResult<QuestionBank> {
        match &self.question_bank {
            Some(path) => QuestionBank::load(path),
            None => QuestionBank::builtin(),
        }
    }
}
