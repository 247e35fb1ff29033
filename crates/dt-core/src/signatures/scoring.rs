//! Aggregate threat score.

use dt_common::MatchRecord;

pub const MAX_SCORE: f64 = 10.0;

/// Score contribution of one match.
///
/// Severity 1 counts as half a point of weight; any other severity counts
/// `severity - 1` points. Both scale by confidence.
fn contribution(m: &MatchRecord) -> f64 {
    let confidence = f64::from(m.confidence) / 100.0;
    let severity_factor = if m.severity == 1 {
        0.5
    } else {
        f64::from(m.severity) - 1.0
    };
    m.weight * severity_factor * confidence
}

/// Sum of contributions, clamped to `[0, 10]`.
pub fn malscore(matches: &[MatchRecord]) -> f64 {
    let raw: f64 = matches.iter().map(contribution).sum();
    if raw.is_nan() {
        return 0.0;
    }
    raw.clamp(0.0, MAX_SCORE)
}
