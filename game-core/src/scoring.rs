/// Extra window past the question time limit within which a submission is
/// still accepted, absorbing delivery latency. Late-but-in-grace answers
/// score zero.
pub const ANSWER_GRACE_MS: i64 = 1000;

/// Time-decayed score for a correct answer: 1000 at instant response,
/// falling linearly to 0 at the time limit.
pub fn time_decay_score(limit_ms: u64, time_ms: i64) -> u32 {
    if limit_ms == 0 {
        return 0;
    }
    let remaining = limit_ms as i64 - time_ms;
    if remaining <= 0 {
        return 0;
    }
    ((remaining as f64 / limit_ms as f64) * 1000.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decay_endpoints() {
        assert_eq!(time_decay_score(20_000, 0), 1000);
        assert_eq!(time_decay_score(20_000, 10_000), 500);
        assert_eq!(time_decay_score(20_000, 20_000), 0);
    }

    #[test]
    fn late_within_grace_scores_zero() {
        assert_eq!(time_decay_score(20_000, 20_500), 0);
    }

    #[test]
    fn rounds_to_nearest_point() {
        // 2/3 of the window left: 666.66… rounds to 667.
        assert_eq!(time_decay_score(3_000, 1_000), 667);
    }
}
