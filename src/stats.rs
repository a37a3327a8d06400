//! Descriptive and inferential statistics over latency samples
//!
//! Degenerate inputs are never errors. Too few samples or zero spread give
//! the neutral value of each statistic: variance 0, CV 0, t 0 with p 1,
//! d 0, entropy 0.

use serde::{Deserialize, Serialize};

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Unbiased (n − 1) variance; 0 below two samples
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    sample_variance(values).sqrt()
}

/// Standard deviation as a percentage of the mean; 0 when the mean is 0
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m == 0.0 {
        return 0.0;
    }
    std_dev(values) / m * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Descriptive {
    pub n: usize,
    pub mean: f64,
    pub variance: f64,
    pub std_dev: f64,
    /// Percent
    pub cv: f64,
}

impl Descriptive {
    pub fn of(values: &[f64]) -> Self {
        Self {
            n: values.len(),
            mean: mean(values),
            variance: sample_variance(values),
            std_dev: std_dev(values),
            cv: coefficient_of_variation(values),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TTest {
    pub t: f64,
    /// Two-sided, normal approximation
    pub p: f64,
    pub df: f64,
}

impl TTest {
    pub fn neutral(df: f64) -> Self {
        Self { t: 0.0, p: 1.0, df }
    }

    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p < alpha
    }
}

/// Pooled variance of two samples, `None` below two samples each
fn pooled_variance(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() < 2 || b.len() < 2 {
        return None;
    }
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let df = na + nb - 2.0;
    Some(((na - 1.0) * sample_variance(a) + (nb - 1.0) * sample_variance(b)) / df)
}

/// Student's two-sample t-test with pooled variance
///
/// The p-value uses the normal approximation of |t|, which is liberal for
/// small samples.
pub fn t_test(a: &[f64], b: &[f64]) -> TTest {
    let df = (a.len() + b.len()).saturating_sub(2) as f64;
    let Some(pooled) = pooled_variance(a, b) else {
        return TTest::neutral(df);
    };
    let se = (pooled * (1.0 / a.len() as f64 + 1.0 / b.len() as f64)).sqrt();
    if se == 0.0 || !se.is_finite() {
        return TTest::neutral(df);
    }
    let t = (mean(a) - mean(b)) / se;
    if t == 0.0 {
        return TTest::neutral(df);
    }
    TTest {
        t,
        p: two_sided_normal_p(t),
        df,
    }
}

/// (mean a − mean b) / pooled standard deviation
pub fn cohens_d(a: &[f64], b: &[f64]) -> f64 {
    match pooled_variance(a, b) {
        Some(pooled) if pooled > 0.0 => (mean(a) - mean(b)) / pooled.sqrt(),
        _ => 0.0,
    }
}

/// Error function, Abramowitz & Stegun 7.1.26 (|error| < 1.5e-7)
pub fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

/// P(|Z| ≥ |z|) for a standard normal Z
pub fn two_sided_normal_p(z: f64) -> f64 {
    (1.0 - erf(z.abs() / std::f64::consts::SQRT_2)).clamp(0.0, 1.0)
}

/// Shannon entropy of a histogram, in bits
pub fn shannon_entropy(histogram: &[f64]) -> f64 {
    let total: f64 = histogram.iter().filter(|c| **c > 0.0).sum();
    if total <= 0.0 {
        return 0.0;
    }
    histogram
        .iter()
        .filter(|c| **c > 0.0)
        .map(|c| {
            let p = c / total;
            -p * p.log2()
        })
        .sum()
}

/// Mean epoch entropy of the treatment minus that of the baseline
pub fn entropy_separation(treatment: &[Vec<f64>], baseline: &[Vec<f64>]) -> f64 {
    let entropies = |histograms: &[Vec<f64>]| -> Vec<f64> {
        histograms.iter().map(|h| shannon_entropy(h)).collect()
    };
    mean(&entropies(treatment)) - mean(&entropies(baseline))
}

/// Windows of `epoch_len` samples, consecutive windows sharing `overlap`
///
/// Only full windows are returned. An overlap of at least `epoch_len` is
/// treated as a step of one sample.
pub fn segment_epochs(series: &[f64], epoch_len: usize, overlap: usize) -> Vec<&[f64]> {
    if epoch_len == 0 || series.len() < epoch_len {
        return Vec::new();
    }
    let step = epoch_len.saturating_sub(overlap).max(1);
    (0..=series.len() - epoch_len)
        .step_by(step)
        .map(|start| &series[start..start + epoch_len])
        .collect()
}

/// Histogram of values over `bins` equal bins spanning `[0, max_value]`
///
/// Values at or above `max_value` land in the last bin.
pub fn histogram(values: &[f64], bins: usize, max_value: f64) -> Vec<f64> {
    let mut counts = vec![0.0; bins];
    if bins == 0 || max_value <= 0.0 {
        return counts;
    }
    for &v in values {
        let index = ((v.max(0.0) / max_value) * bins as f64) as usize;
        counts[index.min(bins - 1)] += 1.0;
    }
    counts
}

/// Per-epoch latency histograms of one phase or category
///
/// Latencies are taken in presentation order and split into consecutive,
/// non-overlapping epochs of `epoch_len` responses.
pub fn latency_epoch_histograms(
    latencies: &[f64],
    epoch_len: usize,
    bins: usize,
    max_latency: f64,
) -> Vec<Vec<f64>> {
    segment_epochs(latencies, epoch_len, 0)
        .into_iter()
        .map(|epoch| histogram(epoch, bins, max_latency))
        .collect()
}

/// Linear-interpolated percentile (`pct` in 0..=100); 0 for no data
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpochClass {
    Ordered,
    Disordered,
    Neutral,
}

/// Label epochs at or below the `low` percentile ordered and at or above the
/// `high` percentile disordered
pub fn classify_epochs(entropies: &[f64], low: f64, high: f64) -> Vec<EpochClass> {
    let low_threshold = percentile(entropies, low);
    let high_threshold = percentile(entropies, high);
    entropies
        .iter()
        .map(|&e| {
            if high_threshold > low_threshold && e >= high_threshold {
                EpochClass::Disordered
            } else if high_threshold > low_threshold && e <= low_threshold {
                EpochClass::Ordered
            } else {
                EpochClass::Neutral
            }
        })
        .collect()
}

/// Central moments m2 and m_k (population form)
fn central_moments(values: &[f64], k: i32) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let n = values.len() as f64;
    let m2 = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
    if m2 == 0.0 {
        return None;
    }
    let mk = values.iter().map(|v| (v - m).powi(k)).sum::<f64>() / n;
    Some((m2, mk))
}

pub fn skewness(values: &[f64]) -> f64 {
    central_moments(values, 3)
        .map(|(m2, m3)| m3 / m2.powf(1.5))
        .unwrap_or(0.0)
}

pub fn excess_kurtosis(values: &[f64]) -> f64 {
    central_moments(values, 4)
        .map(|(m2, m4)| m4 / (m2 * m2) - 3.0)
        .unwrap_or(0.0)
}

/// Fraction of `sample` strictly above the baseline's `pct` percentile
pub fn tail_fraction(baseline: &[f64], sample: &[f64], pct: f64) -> f64 {
    if sample.is_empty() || baseline.is_empty() {
        return 0.0;
    }
    let threshold = percentile(baseline, pct);
    sample.iter().filter(|&&v| v > threshold).count() as f64 / sample.len() as f64
}
