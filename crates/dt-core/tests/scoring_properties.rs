//! Property tests for the malscore formula.

use dt_common::MatchRecord;
use dt_core::signatures::{malscore, MAX_SCORE};
use proptest::prelude::*;

fn record() -> impl Strategy<Value = MatchRecord> {
    (1u32..=10, 0u32..=100, 0.0f64..=5.0).prop_map(|(severity, confidence, weight)| {
        MatchRecord::new("sig", severity, confidence, weight)
    })
}

proptest! {
    #[test]
    fn score_stays_within_bounds(matches in prop::collection::vec(record(), 0..40)) {
        let score = malscore(&matches);
        prop_assert!((0.0..=MAX_SCORE).contains(&score), "score {} out of range", score);
    }

    #[test]
    fn adding_a_match_never_lowers_the_score(
        matches in prop::collection::vec(record(), 0..20),
        extra in record(),
    ) {
        let before = malscore(&matches);
        let mut more = matches.clone();
        more.push(extra);
        prop_assert!(malscore(&more) >= before);
    }

    #[test]
    fn order_does_not_matter(matches in prop::collection::vec(record(), 0..20)) {
        let mut reversed = matches.clone();
        reversed.reverse();
        prop_assert!((malscore(&matches) - malscore(&reversed)).abs() < 1e-9);
    }
}

#[test]
fn low_severity_counts_half() {
    assert_eq!(malscore(&[MatchRecord::new("a", 1, 100, 2.0)]), 1.0);
}

#[test]
fn higher_severity_counts_severity_minus_one() {
    assert_eq!(malscore(&[MatchRecord::new("a", 3, 100, 1.0)]), 2.0);
}

#[test]
fn many_matches_saturate() {
    let matches: Vec<_> = (0..20).map(|_| MatchRecord::new("a", 5, 100, 1.0)).collect();
    assert_eq!(malscore(&matches), MAX_SCORE);
}

#[test]
fn no_matches_score_zero() {
    assert_eq!(malscore(&[]), 0.0);
}
