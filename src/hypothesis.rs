//! Hypothesis evaluation: treatment category against baseline category
//!
//! Every decision threshold lives in [`HypothesisThresholds`], which is
//! loaded from the experiment configuration.

use crate::aggregate::{CategorySummary, SessionSummary};
use crate::condition::Category;
use crate::stats::{self, TTest};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Supported,
    Partial,
    Unsupported,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Supported => "supported",
            Verdict::Partial => "partial",
            Verdict::Unsupported => "unsupported",
        })
    }
}

impl Verdict {
    /// Supported at or past `full`, partial at or past `half`
    fn graded(value: f64, full: f64, half: f64) -> Self {
        if value >= full {
            Verdict::Supported
        } else if value >= half {
            Verdict::Partial
        } else {
            Verdict::Unsupported
        }
    }

    /// Supported when all are, unsupported when none is even partial
    pub fn combine(verdicts: &[Verdict]) -> Self {
        if !verdicts.is_empty() && verdicts.iter().all(|v| *v == Verdict::Supported) {
            Verdict::Supported
        } else if verdicts.iter().all(|v| *v == Verdict::Unsupported) {
            Verdict::Unsupported
        } else {
            Verdict::Partial
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HypothesisThresholds {
    /// Minimum |accuracy difference| in percentage points
    pub accuracy_delta_pp: f64,
    pub alpha: f64,
    /// Minimum |Cohen's d|
    pub min_effect_size: f64,
    /// Minimum treatment / baseline latency variance ratio
    pub variance_ratio: f64,
    /// Minimum |epoch entropy separation| in bits
    pub entropy_delta_bits: f64,
    /// Responses per entropy epoch
    pub epoch_length: usize,
    pub entropy_bins: usize,
    /// Upper edge of the latency histograms, seconds
    pub max_latency_seconds: f64,
    pub treatment: Category,
    pub baseline: Category,
}

impl Default for HypothesisThresholds {
    fn default() -> Self {
        Self {
            accuracy_delta_pp: 5.0,
            alpha: 0.05,
            min_effect_size: 0.5,
            variance_ratio: 1.3,
            entropy_delta_bits: 0.1,
            epoch_length: 3,
            entropy_bins: 5,
            max_latency_seconds: 30.0,
            treatment: Category::Target,
            baseline: Category::Control,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HypothesisResult {
    pub name: &'static str,
    /// The compared quantity (delta, ratio or separation)
    pub value: f64,
    pub verdict: Verdict,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionVerdict {
    pub treatment: Category,
    pub baseline: Category,
    pub results: Vec<HypothesisResult>,
    pub overall: Verdict,
}

/// Treatment accuracy differs from baseline by the configured margin
pub fn evaluate_accuracy(
    treatment: &CategorySummary,
    baseline: &CategorySummary,
    thresholds: &HypothesisThresholds,
) -> HypothesisResult {
    // Summaries hold fractions; thresholds are in percentage points
    let delta = (treatment.summary.accuracy - baseline.summary.accuracy) * 100.0;
    HypothesisResult {
        name: "accuracy_delta",
        value: delta,
        verdict: Verdict::graded(
            delta.abs(),
            thresholds.accuracy_delta_pp,
            thresholds.accuracy_delta_pp / 2.0,
        ),
        detail: format!(
            "{:.1}% vs {:.1}% ({:+.1} pp, threshold {:.1})",
            treatment.summary.accuracy * 100.0,
            baseline.summary.accuracy * 100.0,
            delta,
            thresholds.accuracy_delta_pp
        ),
    }
}

/// Latencies separate: significant and a large enough effect
pub fn evaluate_latency(
    treatment: &CategorySummary,
    baseline: &CategorySummary,
    thresholds: &HypothesisThresholds,
) -> HypothesisResult {
    let test: TTest = stats::t_test(&treatment.latencies, &baseline.latencies);
    let d = stats::cohens_d(&treatment.latencies, &baseline.latencies);
    let significant = test.is_significant(thresholds.alpha);
    let large = d.abs() >= thresholds.min_effect_size;
    let verdict = match (significant, large) {
        (true, true) => Verdict::Supported,
        (false, false) => Verdict::Unsupported,
        _ => Verdict::Partial,
    };
    HypothesisResult {
        name: "latency_separation",
        value: d,
        verdict,
        detail: format!(
            "t = {:.3}, p = {:.4}, df = {}, d = {:.3}",
            test.t, test.p, test.df, d
        ),
    }
}

/// Treatment latencies are more variable than baseline
///
/// A baseline without variance leaves the ratio undefined; the result is
/// then a neutral ratio of 1 and unsupported.
pub fn evaluate_variance(
    treatment: &CategorySummary,
    baseline: &CategorySummary,
    thresholds: &HypothesisThresholds,
) -> HypothesisResult {
    let (vt, vb) = (treatment.summary.latency.variance, baseline.summary.latency.variance);
    if vb <= 0.0 {
        return HypothesisResult {
            name: "variance_ratio",
            value: 1.0,
            verdict: Verdict::Unsupported,
            detail: format!(
                "variance {:.4} vs {:.4} (baseline has no variance, ratio undefined)",
                vt, vb
            ),
        };
    }
    let ratio = vt / vb;
    HypothesisResult {
        name: "variance_ratio",
        value: ratio,
        verdict: Verdict::graded(
            ratio,
            thresholds.variance_ratio,
            1.0 + (thresholds.variance_ratio - 1.0) / 2.0,
        ),
        detail: format!(
            "variance {:.4} vs {:.4} (ratio {:.3}, threshold {:.2})",
            vt, vb, ratio, thresholds.variance_ratio
        ),
    }
}

/// Epoch entropy of treatment latencies separates from baseline
pub fn evaluate_entropy(
    treatment: &CategorySummary,
    baseline: &CategorySummary,
    thresholds: &HypothesisThresholds,
) -> HypothesisResult {
    let histograms = |summary: &CategorySummary| {
        stats::latency_epoch_histograms(
            &summary.latencies,
            thresholds.epoch_length,
            thresholds.entropy_bins,
            thresholds.max_latency_seconds,
        )
    };
    let (th, bh) = (histograms(treatment), histograms(baseline));
    let separation = stats::entropy_separation(&th, &bh);
    let verdict = if th.is_empty() || bh.is_empty() {
        Verdict::Unsupported
    } else {
        Verdict::graded(
            separation.abs(),
            thresholds.entropy_delta_bits,
            thresholds.entropy_delta_bits / 2.0,
        )
    };
    HypothesisResult {
        name: "entropy_separation",
        value: separation,
        verdict,
        detail: format!(
            "{:+.3} bits over {} / {} epochs (threshold {:.2})",
            separation,
            th.len(),
            bh.len(),
            thresholds.entropy_delta_bits
        ),
    }
}

/// Run every hypothesis; `None` if either category is absent
pub fn evaluate_session(
    summary: &SessionSummary,
    thresholds: &HypothesisThresholds,
) -> Option<SessionVerdict> {
    let treatment = summary.category(thresholds.treatment)?;
    let baseline = summary.category(thresholds.baseline)?;

    let results = vec![
        evaluate_accuracy(treatment, baseline, thresholds),
        evaluate_latency(treatment, baseline, thresholds),
        evaluate_variance(treatment, baseline, thresholds),
        evaluate_entropy(treatment, baseline, thresholds),
    ];
    let verdicts: Vec<Verdict> = results.iter().map(|r| r.verdict).collect();

    Some(SessionVerdict {
        treatment: thresholds.treatment,
        baseline: thresholds.baseline,
        overall: Verdict::combine(&verdicts),
        results,
    })
}
