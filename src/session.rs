//! Session data: response records, frozen phase results and the finalized
//! session value
//!
//! Records are appended through a [`PhaseRecorder`] while a phase runs.
//! Freezing moves them into an `Arc<[ResponseRecord]>`, after which nothing
//! can change them. A [`SessionResultBuilder`] collects frozen phases and
//! produces the immutable [`SessionResult`] consumed by the statistics.

use crate::condition::ConditionId;
use crate::error::{EngineError, EngineResult};
use crate::question::{Difficulty, Question};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRecord {
    pub question_id: String,
    pub correct: bool,
    /// Seconds from question display to answer, never negative
    pub latency_seconds: f64,
    pub difficulty: Difficulty,
}

impl ResponseRecord {
    pub fn new(question: &Question, answer: &str, latency_seconds: f64) -> Self {
        Self {
            question_id: question.id.clone(),
            correct: question.is_correct(answer),
            latency_seconds: latency_seconds.max(0.0),
            difficulty: question.difficulty,
        }
    }
}

/// Frozen responses of one block of questions
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSet {
    records: Arc<[ResponseRecord]>,
    correct_count: usize,
}

impl ResponseSet {
    fn freeze(records: Vec<ResponseRecord>) -> Self {
        let correct_count = records.iter().filter(|r| r.correct).count();
        Self {
            records: records.into(),
            correct_count,
        }
    }

    pub fn records(&self) -> &[ResponseRecord] {
        &self.records
    }

    pub fn correct_count(&self) -> usize {
        self.correct_count
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn latencies(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.latency_seconds).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseResult {
    condition_id: ConditionId,
    responses: ResponseSet,
}

impl PhaseResult {
    pub fn condition_id(&self) -> ConditionId {
        self.condition_id
    }

    pub fn correct_count(&self) -> usize {
        self.responses.correct_count()
    }

    pub fn records(&self) -> &[ResponseRecord] {
        self.responses.records()
    }

    pub fn responses(&self) -> &ResponseSet {
        &self.responses
    }

    pub fn latencies(&self) -> Vec<f64> {
        self.responses.latencies()
    }
}

/// Append-only collector for the phase that is currently running
#[derive(Debug)]
pub struct PhaseRecorder {
    records: Vec<ResponseRecord>,
    expected: usize,
}

impl PhaseRecorder {
    pub fn new(expected: usize) -> Self {
        Self {
            records: Vec::with_capacity(expected),
            expected,
        }
    }

    pub fn record(&mut self, record: ResponseRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.records.len() >= self.expected
    }

    pub fn freeze(self) -> ResponseSet {
        ResponseSet::freeze(self.records)
    }

    pub fn freeze_phase(self, condition_id: ConditionId) -> PhaseResult {
        PhaseResult {
            condition_id,
            responses: self.freeze(),
        }
    }
}

/// A failed attempt to realize a condition; the phase ran in silence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFault {
    pub phase_index: usize,
    pub condition_id: ConditionId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub protocol: String,
    /// Sampler seed, when the session can be reproduced
    pub seed: Option<u64>,
    pub catalog_version: u32,
    #[serde(default)]
    pub audio_faults: Vec<AudioFault>,
    #[serde(default)]
    pub aborted: bool,
}

impl SessionMetadata {
    pub fn new(protocol: impl Into<String>, seed: Option<u64>, catalog_version: u32) -> Self {
        Self {
            protocol: protocol.into(),
            seed,
            catalog_version,
            audio_faults: Vec::new(),
            aborted: false,
        }
    }
}

/// Finalized, immutable session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionResult {
    session_id: String,
    timestamp: DateTime<Utc>,
    phase_order: Vec<ConditionId>,
    practice: Option<ResponseSet>,
    phases: BTreeMap<ConditionId, PhaseResult>,
    metadata: SessionMetadata,
}

impl SessionResult {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn phase_order(&self) -> &[ConditionId] {
        &self.phase_order
    }

    pub fn practice(&self) -> Option<&ResponseSet> {
        self.practice.as_ref()
    }

    pub fn phase(&self, condition_id: ConditionId) -> Option<&PhaseResult> {
        self.phases.get(&condition_id)
    }

    /// Completed phases in presentation order
    pub fn phases(&self) -> impl Iterator<Item = &PhaseResult> {
        self.phase_order.iter().filter_map(|id| self.phases.get(id))
    }

    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    pub fn metadata(&self) -> &SessionMetadata {
        &self.metadata
    }

    pub fn is_complete(&self) -> bool {
        !self.metadata.aborted && self.phases.len() == self.phase_order.len()
    }

    pub fn to_export(&self) -> SessionExport {
        SessionExport::from(self)
    }
}

pub struct SessionResultBuilder {
    session_id: String,
    timestamp: DateTime<Utc>,
    phase_order: Vec<ConditionId>,
    practice: Option<ResponseSet>,
    phases: BTreeMap<ConditionId, PhaseResult>,
    metadata: SessionMetadata,
}

impl SessionResultBuilder {
    /// New session with a fresh id, stamped now
    pub fn new(phase_order: Vec<ConditionId>, metadata: SessionMetadata) -> Self {
        Self::with_identity(Uuid::new_v4().to_string(), Utc::now(), phase_order, metadata)
    }

    pub fn with_identity(
        session_id: String,
        timestamp: DateTime<Utc>,
        phase_order: Vec<ConditionId>,
        metadata: SessionMetadata,
    ) -> Self {
        Self {
            session_id,
            timestamp,
            phase_order,
            practice: None,
            phases: BTreeMap::new(),
            metadata,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn set_practice(&mut self, practice: ResponseSet) {
        self.practice = Some(practice);
    }

    /// Add a frozen phase; each condition of the phase order exactly once
    pub fn push_phase(&mut self, phase: PhaseResult) -> EngineResult<()> {
        if !self.phase_order.contains(&phase.condition_id) {
            return Err(EngineError::Config(format!(
                "condition {} is not part of this session",
                phase.condition_id
            )));
        }
        if self.phases.contains_key(&phase.condition_id) {
            return Err(EngineError::Config(format!(
                "condition {} already has a result",
                phase.condition_id
            )));
        }
        self.phases.insert(phase.condition_id, phase);
        Ok(())
    }

    /// Keep the first fault of each phase; returns false for a repeat
    pub fn record_audio_fault(&mut self, fault: AudioFault) -> bool {
        let faults = &mut self.metadata.audio_faults;
        if faults.iter().any(|f| f.phase_index == fault.phase_index) {
            return false;
        }
        faults.push(fault);
        true
    }

    pub fn mark_aborted(&mut self) {
        self.metadata.aborted = true;
    }

    pub fn completed_phases(&self) -> usize {
        self.phases.len()
    }

    pub fn finish(self) -> SessionResult {
        SessionResult {
            session_id: self.session_id,
            timestamp: self.timestamp,
            phase_order: self.phase_order,
            practice: self.practice,
            phases: self.phases,
            metadata: self.metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionExport {
    pub id: String,
    pub correct: bool,
    pub time: f64,
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseExport {
    pub correct: usize,
    pub times: Vec<f64>,
    pub questions: Vec<QuestionExport>,
}

impl From<&ResponseSet> for PhaseExport {
    fn from(set: &ResponseSet) -> Self {
        Self {
            correct: set.correct_count(),
            times: set.latencies(),
            questions: set
                .records()
                .iter()
                .map(|r| QuestionExport {
                    id: r.question_id.clone(),
                    correct: r.correct,
                    time: r.latency_seconds,
                    difficulty: r.difficulty,
                })
                .collect(),
        }
    }
}

impl PhaseExport {
    fn into_responses(self) -> EngineResult<ResponseSet> {
        let records: Vec<ResponseRecord> = self
            .questions
            .into_iter()
            .map(|q| ResponseRecord {
                question_id: q.id,
                correct: q.correct,
                latency_seconds: q.time,
                difficulty: q.difficulty,
            })
            .collect();
        if records.iter().any(|r| r.latency_seconds < 0.0) {
            return Err(EngineError::Serde("negative latency in export".into()));
        }
        let set = ResponseSet::freeze(records);
        if set.correct_count() != self.correct {
            return Err(EngineError::Serde(format!(
                "export says {} correct but records have {}",
                self.correct,
                set.correct_count()
            )));
        }
        Ok(set)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedPhases {
    pub phases: BTreeMap<ConditionId, PhaseExport>,
}

/// On-disk JSON form of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExport {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub phase_order: Vec<ConditionId>,
    #[serde(default)]
    pub practice: Option<PhaseExport>,
    pub results: ExportedPhases,
    pub metadata: SessionMetadata,
}

impl From<&SessionResult> for SessionExport {
    fn from(session: &SessionResult) -> Self {
        Self {
            session_id: session.session_id.clone(),
            timestamp: session.timestamp,
            phase_order: session.phase_order.clone(),
            practice: session.practice.as_ref().map(PhaseExport::from),
            results: ExportedPhases {
                phases: session
                    .phases
                    .iter()
                    .map(|(&id, phase)| (id, PhaseExport::from(&phase.responses)))
                    .collect(),
            },
            metadata: session.metadata.clone(),
        }
    }
}

impl SessionExport {
    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Rebuild the immutable session, checking the export is consistent
    pub fn into_result(self) -> EngineResult<SessionResult> {
        let mut builder = SessionResultBuilder::with_identity(
            self.session_id,
            self.timestamp,
            self.phase_order,
            self.metadata,
        );
        if let Some(practice) = self.practice {
            builder.set_practice(practice.into_responses()?);
        }
        for (condition_id, phase) in self.results.phases {
            let responses = phase.into_responses()?;
            builder
                .push_phase(PhaseResult {
                    condition_id,
                    responses,
                })
                .map_err(|e| EngineError::Serde(e.to_string()))?;
        }
        Ok(builder.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::QuestionType;

    fn question(id: &str, difficulty: Difficulty) -> Question {
        Question {
            id: id.to_string(),
            prompt: "?".to_string(),
            options: vec!["yes".into(), "no".into()],
            correct: "yes".into(),
            difficulty,
            question_type: QuestionType::Logic,
        }
    }

    fn phase(condition_id: ConditionId, answers: &[(&str, f64)]) -> PhaseResult {
        let mut recorder = PhaseRecorder::new(answers.len());
        for (i, (answer, latency)) in answers.iter().enumerate() {
            let q = question(&format!("c{}q{}", condition_id, i), Difficulty::Easy);
            recorder.record(ResponseRecord::new(&q, answer, *latency));
        }
        assert!(recorder.is_complete());
        recorder.freeze_phase(condition_id)
    }

    #[test]
    fn test_record_clamps_latency() {
        let q = question("q", Difficulty::Hard);
        let record = ResponseRecord::new(&q, "no", -0.2);
        assert_eq!(record.latency_seconds, 0.0);
        assert!(!record.correct);
        assert_eq!(record.difficulty, Difficulty::Hard);
    }

    #[test]
    fn test_frozen_phase_counts_correct() {
        let result = phase(3, &[("yes", 1.0), ("no", 2.0), ("yes", 1.5)]);
        assert_eq!(result.correct_count(), 2);
        assert_eq!(result.records().len(), 3);
        assert_eq!(result.latencies(), vec![1.0, 2.0, 1.5]);
    }

    #[test]
    fn test_builder_rejects_unknown_and_duplicate_phases() {
        let metadata = SessionMetadata::new("original", Some(1), 2);
        let mut builder = SessionResultBuilder::new(vec![1, 2], metadata);
        builder.push_phase(phase(1, &[("yes", 1.0)])).unwrap();
        assert!(builder.push_phase(phase(1, &[("yes", 1.0)])).is_err());
        assert!(builder.push_phase(phase(9, &[("yes", 1.0)])).is_err());

        let session = builder.finish();
        assert!(!session.is_complete());
        assert_eq!(session.phase_count(), 1);
    }

    #[test]
    fn test_one_audio_fault_per_phase() {
        let metadata = SessionMetadata::new("extended", None, 2);
        let mut builder = SessionResultBuilder::new(vec![3, 4], metadata);
        let fault = |phase_index, message: &str| AudioFault {
            phase_index,
            condition_id: 3,
            message: message.to_string(),
        };

        assert!(builder.record_audio_fault(fault(0, "no device")));
        assert!(!builder.record_audio_fault(fault(0, "still no device")));
        assert!(builder.record_audio_fault(fault(1, "no device")));

        let session = builder.finish();
        let faults = &session.metadata().audio_faults;
        assert_eq!(faults.len(), 2);
        assert_eq!(faults[0].message, "no device");
    }

    #[test]
    fn test_phases_iterate_in_presentation_order() {
        let metadata = SessionMetadata::new("original", None, 2);
        let mut builder = SessionResultBuilder::new(vec![4, 2], metadata);
        builder.push_phase(phase(2, &[("yes", 1.0)])).unwrap();
        builder.push_phase(phase(4, &[("no", 1.0)])).unwrap();
        let session = builder.finish();

        let order: Vec<ConditionId> = session.phases().map(|p| p.condition_id()).collect();
        assert_eq!(order, vec![4, 2]);
        assert!(session.is_complete());
    }

    #[test]
    fn test_export_shape_and_roundtrip() {
        let mut metadata = SessionMetadata::new("extended", Some(42), 2);
        metadata.audio_faults.push(AudioFault {
            phase_index: 0,
            condition_id: 3,
            message: "no device".into(),
        });
        let mut builder = SessionResultBuilder::new(vec![3], metadata);
        let mut practice = PhaseRecorder::new(1);
        practice.record(ResponseRecord::new(&question("p1", Difficulty::Easy), "yes", 0.8));
        builder.set_practice(practice.freeze());
        builder.push_phase(phase(3, &[("yes", 1.25), ("no", 2.5)])).unwrap();
        let session = builder.finish();

        let json = session.to_export().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["sessionId"].is_string());
        assert_eq!(value["phaseOrder"], serde_json::json!([3]));
        assert_eq!(value["results"]["phases"]["3"]["correct"], 1);
        assert_eq!(value["results"]["phases"]["3"]["times"], serde_json::json!([1.25, 2.5]));
        assert_eq!(value["results"]["phases"]["3"]["questions"][1]["difficulty"], "easy");
        assert_eq!(value["metadata"]["audioFaults"][0]["conditionId"], 3);

        let restored = SessionExport::from_json(&json).unwrap().into_result().unwrap();
        assert_eq!(restored, session);
    }

    #[test]
    fn test_inconsistent_export_rejected() {
        let metadata = SessionMetadata::new("original", None, 2);
        let mut builder = SessionResultBuilder::new(vec![1], metadata);
        builder.push_phase(phase(1, &[("yes", 1.0)])).unwrap();
        let mut export = builder.finish().to_export();
        export.results.phases.get_mut(&1).unwrap().correct = 5;
        assert!(export.into_result().is_err());
    }
}
