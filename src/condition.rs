//! Condition catalog: the static, versioned table of auditory conditions
//!
//! Conditions are defined once and referenced by id everywhere else. The
//! default catalog is built in; alternatives load from JSON or TOML.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

pub type ConditionId = u32;

/// Version of the built-in catalog
pub const CATALOG_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Control,
    Target,
    NearMiss,
    Harmonic,
    Unrelated,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Control => "control",
            Category::Target => "target",
            Category::NearMiss => "near_miss",
            Category::Harmonic => "harmonic",
            Category::Unrelated => "unrelated",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a condition sounds like
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stimulus {
    Silence,
    PinkNoise {
        cutoff_hz: f32,
    },
    Tone {
        frequency_hz: f32,
    },
    /// Carrier swept sinusoidally by ±half_width_hz at rate_hz
    Sweep {
        center_hz: f32,
        half_width_hz: f32,
        rate_hz: f32,
    },
    /// base_frequency_hz left, base + beat right
    Binaural {
        base_frequency_hz: f32,
        beat_frequency_hz: f32,
    },
}

impl Stimulus {
    pub fn kind(&self) -> &'static str {
        match self {
            Stimulus::Silence => "silence",
            Stimulus::PinkNoise { .. } => "pink_noise",
            Stimulus::Tone { .. } => "tone",
            Stimulus::Sweep { .. } => "sweep",
            Stimulus::Binaural { .. } => "binaural",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub id: ConditionId,
    pub name: String,
    pub category: Category,
    /// Linear output level reached at the end of the fade-in
    pub gain: f32,
    pub stimulus: Stimulus,
}

impl Condition {
    pub fn new(
        id: ConditionId,
        name: impl Into<String>,
        category: Category,
        stimulus: Stimulus,
        gain: f32,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            category,
            gain,
            stimulus,
        }
    }

    /// Primary frequency: the tone, the sweep carrier or the binaural base
    pub fn frequency_hz(&self) -> Option<f32> {
        match self.stimulus {
            Stimulus::Tone { frequency_hz } => Some(frequency_hz),
            Stimulus::Sweep { center_hz, .. } => Some(center_hz),
            Stimulus::Silence | Stimulus::PinkNoise { .. } | Stimulus::Binaural { .. } => None,
        }
    }

    pub fn base_frequency_hz(&self) -> Option<f32> {
        match self.stimulus {
            Stimulus::Binaural {
                base_frequency_hz, ..
            } => Some(base_frequency_hz),
            _ => None,
        }
    }

    pub fn is_silent(&self) -> bool {
        matches!(self.stimulus, Stimulus::Silence) || self.gain == 0.0
    }

    fn validate(&self) -> EngineResult<()> {
        let invalid = |what: &str| {
            Err(EngineError::Config(format!(
                "condition {} ({}): {}",
                self.id, self.name, what
            )))
        };

        if !(0.0..=1.0).contains(&self.gain) {
            return invalid("gain must be within [0, 1]");
        }
        match self.stimulus {
            Stimulus::Silence => Ok(()),
            Stimulus::PinkNoise { cutoff_hz } if cutoff_hz <= 0.0 => {
                invalid("noise cutoff must be positive")
            }
            Stimulus::Tone { frequency_hz } if frequency_hz <= 0.0 => {
                invalid("tone frequency must be positive")
            }
            Stimulus::Sweep {
                center_hz,
                half_width_hz,
                rate_hz,
            } if center_hz <= 0.0 || half_width_hz < 0.0 || half_width_hz >= center_hz || rate_hz <= 0.0 => {
                invalid("sweep needs 0 <= half width < center and a positive rate")
            }
            Stimulus::Binaural {
                base_frequency_hz,
                beat_frequency_hz,
            } if base_frequency_hz <= 0.0 || beat_frequency_hz < 0.0 => {
                invalid("binaural base must be positive and beat non-negative")
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionCatalog {
    pub version: u32,
    pub conditions: Vec<Condition>,
}

impl Default for ConditionCatalog {
    fn default() -> Self {
        use Category::*;
        let conditions = vec![
            Condition::new(1, "Silence", Control, Stimulus::Silence, 0.0),
            Condition::new(2, "Pink noise", Control, Stimulus::PinkNoise { cutoff_hz: 2000.0 }, 0.3),
            Condition::new(3, "Matched tone", Target, Stimulus::Tone { frequency_hz: 4000.0 }, 0.15),
            Condition::new(4, "Near-miss tone", NearMiss, Stimulus::Tone { frequency_hz: 3600.0 }, 0.15),
            Condition::new(5, "Harmonic tone", Harmonic, Stimulus::Tone { frequency_hz: 2000.0 }, 0.15),
            Condition::new(6, "Unrelated tone", Unrelated, Stimulus::Tone { frequency_hz: 440.0 }, 0.15),
            Condition::new(
                7,
                "Swept tone",
                Target,
                Stimulus::Sweep {
                    center_hz: 4000.0,
                    half_width_hz: 200.0,
                    rate_hz: 0.5,
                },
                0.15,
            ),
            Condition::new(
                8,
                "Binaural beat",
                Unrelated,
                Stimulus::Binaural {
                    base_frequency_hz: 200.0,
                    beat_frequency_hz: 40.0,
                },
                0.2,
            ),
        ];
        Self {
            version: CATALOG_VERSION,
            conditions,
        }
    }
}

impl ConditionCatalog {
    pub fn new(version: u32, conditions: Vec<Condition>) -> EngineResult<Self> {
        let catalog = Self {
            version,
            conditions,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog from a `.json` or `.toml` file
    pub fn load(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content)?,
            _ => serde_json::from_str(&content)?,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Ids must be unique and every stimulus well-formed
    pub fn validate(&self) -> EngineResult<()> {
        let mut seen = BTreeSet::new();
        for condition in &self.conditions {
            if !seen.insert(condition.id) {
                return Err(EngineError::Config(format!(
                    "duplicate condition id {}",
                    condition.id
                )));
            }
            condition.validate()?;
        }
        Ok(())
    }

    pub fn get(&self, id: ConditionId) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.id == id)
    }

    /// Look up a condition that must exist
    pub fn require(&self, id: ConditionId) -> EngineResult<&Condition> {
        self.get(id)
            .ok_or_else(|| EngineError::Config(format!("unknown condition id {}", id)))
    }

    pub fn ids(&self) -> Vec<ConditionId> {
        self.conditions.iter().map(|c| c.id).collect()
    }

    pub fn category_of(&self, id: ConditionId) -> Option<Category> {
        self.get(id).map(|c| c.category)
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &Condition> {
        self.conditions.iter().filter(move |c| c.category == category)
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}
