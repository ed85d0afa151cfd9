use crate::models::evaluation::JudgeResult;

/// The discrete scale every stored score is snapped to.
pub const VALID_SCORES: [i32; 6] = [0, 20, 40, 60, 80, 100];

/// Confidence-weighted average of the judges' scores, rounded half away from zero.
///
/// Results with non-positive confidence or a score outside `[0, 100]` are
/// discarded, not clamped. Returns 0 when nothing valid remains.
pub fn calculate_consensus_score(results: &[JudgeResult]) -> i32 {
    let (weighted_sum, total_confidence) = results
        .iter()
        .filter(|r| r.confidence > 0.0 && (0.0..=100.0).contains(&r.score))
        .fold((0.0_f64, 0.0_f64), |(sum, weight), r| {
            (sum + r.score * r.confidence, weight + r.confidence)
        });

    if total_confidence == 0.0 {
        return 0;
    }

    (weighted_sum / total_confidence).round() as i32
}

/// Snap a score to the nearest member of [`VALID_SCORES`].
///
/// Ties go to the lower bucket. The best distance starts at 100, so an input
/// at least 100 away from every bucket resolves to 0.
pub fn round_to_valid_score(score: i32) -> i32 {
    let mut closest = VALID_SCORES[0];
    let mut min_diff: i64 = 100;

    for valid in VALID_SCORES {
        let diff = (i64::from(score) - i64::from(valid)).abs();
        if diff < min_diff {
            min_diff = diff;
            closest = valid;
        }
    }

    closest
}
