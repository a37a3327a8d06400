//! Error taxonomy shared by the engine, the sequencer and the tooling.

use crate::question::Difficulty;
use std::fmt;

/// Errors produced by acouphene
#[derive(Debug)]
pub enum EngineError {
    /// Host audio subsystem missing, denied or failed while opening
    AudioUnavailable(String),
    /// Question bank too small for the requested stratification
    InsufficientQuestions {
        difficulty: Difficulty,
        required: usize,
        available: usize,
    },
    /// Operation on a disposed engine
    ResourceClosed,
    /// Event not accepted in the current experiment state
    InvalidTransition {
        state: String,
        event: &'static str,
    },
    /// Audio graph could not be built
    InvalidGraph(String),
    /// Malformed question or question bank
    InvalidQuestion(String),
    /// Invalid configuration, catalog or session plan
    Config(String),
    /// IO error
    Io(std::io::Error),
    /// Serialization error
    Serde(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::AudioUnavailable(msg) => write!(f, "Audio unavailable: {}", msg),
            EngineError::InsufficientQuestions {
                difficulty,
                required,
                available,
            } => write!(
                f,
                "Insufficient {} questions: {} required, {} available",
                difficulty, required, available
            ),
            EngineError::ResourceClosed => write!(f, "Audio engine has been disposed"),
            EngineError::InvalidTransition { state, event } => {
                write!(f, "Event '{}' is not valid in state {}", event, state)
            }
            EngineError::InvalidGraph(msg) => write!(f, "Invalid audio graph: {}", msg),
            EngineError::InvalidQuestion(msg) => write!(f, "Invalid question: {}", msg),
            EngineError::Config(msg) => write!(f, "Configuration error: {}", msg),
            EngineError::Io(e) => write!(f, "IO error: {}", e),
            EngineError::Serde(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serde(e.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(e: toml::de::Error) -> Self {
        EngineError::Serde(e.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(e: toml::ser::Error) -> Self {
        EngineError::Serde(e.to_string())
    }
}

impl From<hound::Error> for EngineError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => EngineError::Io(io),
            other => EngineError::Serde(other.to_string()),
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// True for faults the experiment recovers from by degrading to silence
    pub fn is_audio_fault(&self) -> bool {
        matches!(self, EngineError::AudioUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_questions_display() {
        let err = EngineError::InsufficientQuestions {
            difficulty: Difficulty::Hard,
            required: 15,
            available: 9,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient hard questions: 15 required, 9 available"
        );
    }

    #[test]
    fn test_only_audio_unavailable_is_audio_fault() {
        assert!(EngineError::AudioUnavailable("no device".into()).is_audio_fault());
        assert!(!EngineError::ResourceClosed.is_audio_fault());
        assert!(!EngineError::Config("x".into()).is_audio_fault());
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: EngineError = io.into();
        assert!(matches!(err, EngineError::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
