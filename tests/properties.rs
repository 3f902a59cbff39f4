use coverwatch::coverage::{
    evaluate_health, metric_score, parse_report_string, CoverageSnapshot, HealthReporting, Ratio, Thresholds,
    MAX_HEALTH_MESSAGES, RATIO_MARKER,
};
use coverwatch::dashboard::round_half_even;
use coverwatch::error::ReportError;
use proptest::prelude::*;

fn thresholds() -> impl Strategy<Value = Thresholds> {
    proptest::array::uniform8(-200i32..300).prop_map(|v| Thresholds {
        min_statement: v[0],
        max_statement: v[1],
        min_branch: v[2],
        max_branch: v[3],
        min_loop: v[4],
        max_loop: v[5],
        min_condition: v[6],
        max_condition: v[7],
    })
}

fn ratio() -> impl Strategy<Value = Option<Ratio>> {
    proptest::option::of((0u32..500, 0u32..500).prop_map(|(a, b)| {
        let (n, d) = if a <= b { (a, b) } else { (b, a) };
        Ratio::new(f64::from(n), f64::from(d))
    }))
}

proptest! {
    #[test]
    fn metric_score_stays_in_bounds(p in -50i32..150, min in 0i32..=100, max in 0i32..=100) {
        let score = metric_score(p, min, max);
        prop_assert!((0..=100).contains(&score));
    }

    #[test]
    fn metric_score_is_monotone(a in -50i32..150, b in -50i32..150, min in 0i32..100, span in 1i32..=100) {
        let max = (min + span).min(100);
        prop_assume!(min < max);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(metric_score(lo, min, max) <= metric_score(hi, min, max));
    }

    #[test]
    fn metric_score_hits_both_ends(min in 0i32..100, span in 1i32..=100) {
        let max = (min + span).min(100);
        prop_assume!(min < max);
        prop_assert_eq!(metric_score(max, min, max), 100);
        prop_assert_eq!(metric_score(min, min, max), 0);
    }

    #[test]
    fn normalize_is_idempotent(t in thresholds()) {
        let once = t.normalized();
        prop_assert_eq!(once.normalized(), once);
        prop_assert!((0..=100).contains(&once.max_branch));
        prop_assert!((0..=once.max_branch).contains(&once.min_branch));
    }

    #[test]
    fn health_score_is_bounded(
        t in thresholds(),
        slots in (ratio(), ratio(), ratio(), ratio()),
    ) {
        let snapshot = CoverageSnapshot::from_slots([slots.0, slots.1, slots.2, slots.3]);
        let health = evaluate_health(&HealthReporting::Enabled(t), &snapshot).unwrap();

        prop_assert!((0..=100).contains(&health.score));
        prop_assert!(!health.messages.is_empty());
        prop_assert!(health.messages.len() <= MAX_HEALTH_MESSAGES);
    }

    #[test]
    fn ratio_lines_parse_back(n in 0i32..100_000, d in 0i32..100_000, noise in "[a-z <>/]{0,30}") {
        let content = format!("{}\n  {}{}{}  \n{}\n", noise, n, RATIO_MARKER, d, noise);
        let snapshot = parse_report_string(&content).unwrap();
        prop_assert_eq!(snapshot.statement, Some(Ratio::new(f64::from(n), f64::from(d))));
        prop_assert_eq!(snapshot.present_count(), 1);
    }

    #[test]
    fn text_without_marker_has_no_data(content in "[a-z0-9 /;]{0,200}") {
        let result = parse_report_string(&content);
        prop_assert!(
            matches!(result, Err(ReportError::NoDataFound { inputs: 1 })),
            "unexpected result: {:?}",
            result
        );
    }

    #[test]
    fn rounding_is_stable(v in 0.0f64..100.0) {
        let once = round_half_even(v, 1);
        prop_assert_eq!(round_half_even(once, 1), once);
        prop_assert!((once - v).abs() <= 0.05 + 1e-9);
    }
}

#[test]
fn empty_ratio_is_zero_percent() {
    let empty = Ratio::new(0.0, 0.0);
    assert_eq!(empty.percentage(), 0);
    assert_eq!(empty.percentage_float(), 0.0);
}
