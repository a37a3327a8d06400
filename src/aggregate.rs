//! Per-phase and per-category summaries of a finalized session

use crate::condition::{Category, ConditionCatalog, ConditionId};
use crate::question::Difficulty;
use crate::session::{ResponseRecord, SessionResult};
use crate::stats::Descriptive;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DifficultySummary {
    pub n: usize,
    pub correct: usize,
    /// Fraction correct
    pub accuracy: f64,
    pub mean_latency: f64,
}

/// Accuracy and latency statistics of one block of responses
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockSummary {
    pub n: usize,
    pub correct: usize,
    /// Fraction correct in 0..=1; 0 for an empty block
    pub accuracy: f64,
    pub latency: Descriptive,
    pub by_difficulty: BTreeMap<Difficulty, DifficultySummary>,
}

fn accuracy(correct: usize, n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        correct as f64 / n as f64
    }
}

impl BlockSummary {
    pub fn of(records: &[ResponseRecord]) -> Self {
        let latencies: Vec<f64> = records.iter().map(|r| r.latency_seconds).collect();
        let correct = records.iter().filter(|r| r.correct).count();

        let mut by_difficulty = BTreeMap::new();
        for difficulty in Difficulty::ALL {
            let subset: Vec<&ResponseRecord> =
                records.iter().filter(|r| r.difficulty == difficulty).collect();
            if subset.is_empty() {
                continue;
            }
            let n = subset.len();
            let correct = subset.iter().filter(|r| r.correct).count();
            let mean_latency = subset.iter().map(|r| r.latency_seconds).sum::<f64>() / n as f64;
            by_difficulty.insert(
                difficulty,
                DifficultySummary {
                    n,
                    correct,
                    accuracy: accuracy(correct, n),
                    mean_latency,
                },
            );
        }

        Self {
            n: records.len(),
            correct,
            accuracy: accuracy(correct, records.len()),
            latency: Descriptive::of(&latencies),
            by_difficulty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseSummary {
    pub position: usize,
    pub condition_id: ConditionId,
    pub condition_name: String,
    /// None when the condition is missing from the catalog
    pub category: Option<Category>,
    pub summary: BlockSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub category: Category,
    pub condition_ids: Vec<ConditionId>,
    pub summary: BlockSummary,
    /// Pooled latencies in presentation order
    pub latencies: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub practice: Option<BlockSummary>,
    pub phases: Vec<PhaseSummary>,
    pub categories: BTreeMap<Category, CategorySummary>,
}

impl SessionSummary {
    pub fn phase(&self, condition_id: ConditionId) -> Option<&PhaseSummary> {
        self.phases.iter().find(|p| p.condition_id == condition_id)
    }

    pub fn category(&self, category: Category) -> Option<&CategorySummary> {
        self.categories.get(&category)
    }
}

/// Summarize every test phase, pool phases by category and summarize the
/// practice block on its own
pub fn summarize(session: &SessionResult, catalog: &ConditionCatalog) -> SessionSummary {
    let mut phases = Vec::new();
    let mut pooled: BTreeMap<Category, (Vec<ConditionId>, Vec<ResponseRecord>)> = BTreeMap::new();

    for (position, phase) in session.phases().enumerate() {
        let condition = catalog.get(phase.condition_id());
        let category = condition.map(|c| c.category);
        phases.push(PhaseSummary {
            position,
            condition_id: phase.condition_id(),
            condition_name: condition
                .map(|c| c.name.clone())
                .unwrap_or_else(|| format!("condition {}", phase.condition_id())),
            category,
            summary: BlockSummary::of(phase.records()),
        });

        if let Some(category) = category {
            let (ids, records) = pooled.entry(category).or_default();
            ids.push(phase.condition_id());
            records.extend_from_slice(phase.records());
        }
    }

    let categories = pooled
        .into_iter()
        .map(|(category, (condition_ids, records))| {
            let summary = CategorySummary {
                category,
                condition_ids,
                summary: BlockSummary::of(&records),
                latencies: records.iter().map(|r| r.latency_seconds).collect(),
            };
            (category, summary)
        })
        .collect();

    SessionSummary {
        session_id: session.session_id().to_string(),
        practice: session.practice().map(|p| BlockSummary::of(p.records())),
        phases,
        categories,
    }
}
