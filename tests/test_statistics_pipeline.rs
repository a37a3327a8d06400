use acouphene::aggregate::summarize;
use acouphene::condition::{Category, ConditionCatalog, ConditionId};
use acouphene::hypothesis::{evaluate_session, HypothesisThresholds, Verdict};
use acouphene::question::{Difficulty, Question, QuestionType};
use acouphene::session::{
    PhaseRecorder, ResponseRecord, SessionMetadata, SessionResult, SessionResultBuilder,
};
use acouphene::stats::{self, Descriptive};

fn question(id: String) -> Question {
    Question {
        id,
        prompt: "?".into(),
        options: vec!["a".into(), "b".into(), "c".into()],
        correct: "a".into(),
        difficulty: Difficulty::Moderate,
        question_type: QuestionType::Sequence,
    }
}

/// One phase per (condition, answers) with answers as (correct, latency)
fn session(phases: &[(ConditionId, Vec<(bool, f64)>)]) -> SessionResult {
    let order = phases.iter().map(|(id, _)| *id).collect();
    let mut builder = SessionResultBuilder::new(order, SessionMetadata::new("test", Some(1), 2));
    for (id, answers) in phases {
        let mut recorder = PhaseRecorder::new(answers.len());
        for (i, &(correct, latency)) in answers.iter().enumerate() {
            let q = question(format!("c{}-{}", id, i));
            recorder.record(ResponseRecord::new(&q, if correct { "a" } else { "b" }, latency));
        }
        builder.push_phase(recorder.freeze_phase(*id)).unwrap();
    }
    builder.finish()
}

#[test]
fn test_one_two_three() {
    let d = Descriptive::of(&[1.0, 2.0, 3.0]);
    assert_eq!(d.mean, 2.0);
    assert_eq!(d.variance, 1.0);
    assert_eq!(d.std_dev, 1.0);
    assert!((d.cv - 50.0).abs() < 1e-9);
}

#[test]
fn test_degenerate_statistics_are_neutral() {
    assert_eq!(stats::sample_variance(&[7.0]), 0.0);
    assert_eq!(stats::coefficient_of_variation(&[0.0, 0.0, 0.0]), 0.0);
    let t = stats::t_test(&[1.0], &[1.0]);
    assert_eq!((t.t, t.p), (0.0, 1.0));
    assert_eq!(stats::cohens_d(&[], &[]), 0.0);
}

#[test]
fn test_t_test_same_sample() {
    let a = [0.8, 1.9, 1.2, 2.4, 1.1, 0.7, 1.6];
    let result = stats::t_test(&a, &a);
    assert!(result.t.abs() < 1e-12);
    assert!((result.p - 1.0).abs() < 1e-6);
}

#[test]
fn test_t_test_separated_vs_identical() {
    let slow = [3.1, 2.9, 3.3, 3.0, 2.8, 3.2, 3.05, 2.95];
    let fast = [1.1, 0.9, 1.3, 1.0, 0.8, 1.2, 1.05, 0.95];
    assert!(stats::t_test(&slow, &fast).p < 0.05);

    let copy = fast;
    assert!(stats::t_test(&fast, &copy).p > 0.99);
}

#[test]
fn test_category_pooling_uses_raw_records() {
    // Controls: [1, 2] and [6]; pooled mean 3, not the mean of phase means (2.75)
    let s = session(&[
        (1, vec![(true, 1.0), (true, 2.0)]),
        (2, vec![(true, 6.0)]),
        (3, vec![(true, 1.0), (false, 1.0)]),
    ]);
    let summary = summarize(&s, &ConditionCatalog::default());
    let control = summary.category(Category::Control).unwrap();
    assert_eq!(control.summary.n, 3);
    assert_eq!(control.summary.latency.mean, 3.0);
    assert_eq!(summary.category(Category::Target).unwrap().summary.accuracy, 0.5);
}

#[test]
fn test_slow_erratic_target_supports_hypotheses() {
    let control: Vec<(bool, f64)> = (0..12).map(|i| (true, 1.0 + (i % 3) as f64 * 0.05)).collect();
    let target: Vec<(bool, f64)> = (0..12)
        .map(|i| (i % 2 == 0, [2.0, 9.0, 4.5, 14.0, 6.0, 21.0][i % 6]))
        .collect();
    let s = session(&[(1, control), (3, target)]);
    let summary = summarize(&s, &ConditionCatalog::default());
    let verdict = evaluate_session(&summary, &HypothesisThresholds::default()).unwrap();

    let by_name = |name: &str| {
        verdict
            .results
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.verdict)
            .unwrap()
    };
    assert_eq!(by_name("accuracy_delta"), Verdict::Supported);
    assert_eq!(by_name("latency_separation"), Verdict::Supported);
    assert_eq!(by_name("variance_ratio"), Verdict::Supported);
    assert_eq!(by_name("entropy_separation"), Verdict::Supported);
    assert_eq!(verdict.overall, Verdict::Supported);
}

#[test]
fn test_matching_categories_unsupported() {
    let answers: Vec<(bool, f64)> = (0..9).map(|i| (i % 4 != 0, 1.0 + i as f64 * 0.3)).collect();
    let s = session(&[(2, answers.clone()), (7, answers)]);
    let summary = summarize(&s, &ConditionCatalog::default());
    let verdict = evaluate_session(&summary, &HypothesisThresholds::default()).unwrap();
    assert_eq!(verdict.overall, Verdict::Unsupported);
}

#[test]
fn test_thresholds_are_configuration() {
    let control: Vec<(bool, f64)> = (0..10).map(|_| (true, 1.0)).collect();
    let target: Vec<(bool, f64)> = (0..10).map(|i| (i != 0, 1.0)).collect();
    let s = session(&[(1, control), (3, target)]);
    let summary = summarize(&s, &ConditionCatalog::default());

    // A 10 point accuracy drop
    let strict = HypothesisThresholds {
        accuracy_delta_pp: 25.0,
        ..HypothesisThresholds::default()
    };
    let lenient = HypothesisThresholds::default();
    let accuracy = |t: &HypothesisThresholds| evaluate_session(&summary, t).unwrap().results[0].verdict;
    assert_eq!(accuracy(&strict), Verdict::Unsupported);
    assert_eq!(accuracy(&lenient), Verdict::Supported);
}

#[test]
fn test_less_accurate_and_slower_target_through_pipeline() {
    // Control 10/10 near one second; target 8/10 with a wide spread
    let control: Vec<(bool, f64)> = [1.0, 1.1, 0.9, 1.05, 0.95, 1.0, 1.1, 0.9, 1.0, 1.0]
        .iter()
        .map(|&latency| (true, latency))
        .collect();
    let target: Vec<(bool, f64)> = [1.5, 6.0, 2.5, 9.0, 3.0, 12.0, 2.0, 7.5, 4.0, 10.0]
        .iter()
        .enumerate()
        .map(|(i, &latency)| (i != 3 && i != 7, latency))
        .collect();
    let s = session(&[(2, control), (3, target)]);
    let summary = summarize(&s, &ConditionCatalog::default());

    let treated = summary.category(Category::Target).unwrap();
    let baseline = summary.category(Category::Control).unwrap();
    assert!((treated.summary.accuracy - 0.8).abs() < 1e-12);
    assert_eq!(baseline.summary.accuracy, 1.0);

    let thresholds = HypothesisThresholds::default();
    let verdict = evaluate_session(&summary, &thresholds).unwrap();
    let result = |name: &str| verdict.results.iter().find(|r| r.name == name).unwrap();

    let accuracy = result("accuracy_delta");
    assert!((accuracy.value + 20.0).abs() < 1e-9, "delta {}", accuracy.value);
    assert_eq!(accuracy.verdict, Verdict::Supported);

    let latency = result("latency_separation");
    assert_eq!(latency.verdict, Verdict::Supported);
    assert!(latency.value > thresholds.min_effect_size);

    // Target is the slower group and the difference is significant
    let t = stats::t_test(&treated.latencies, &baseline.latencies);
    assert!(t.t > 0.0);
    assert!(t.p < thresholds.alpha, "p = {}", t.p);
}
