use rand::Rng;
use std::time::Duration;

/// Exponential backoff for bulk request retries: `2^attempt` seconds plus
/// up to a second of uniform jitter so retrying flushes don't align.
pub fn backoff_delay(attempt: u32) -> Duration {
    // Cap the exponent to keep the delay finite under pathological retries.
    let capped_attempt = attempt.min(10);
    let base_secs = 1u64 << capped_attempt;

    let jitter_ms = rand::thread_rng().gen_range(0..1000);

    Duration::from_secs(base_secs) + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_progression() {
        // 2^attempt seconds, plus [0, 1s) of jitter.
        let delay0 = backoff_delay(0);
        let delay1 = backoff_delay(1);
        let delay2 = backoff_delay(2);

        assert!(delay0 >= Duration::from_secs(1) && delay0 < Duration::from_secs(2));
        assert!(delay1 >= Duration::from_secs(2) && delay1 < Duration::from_secs(3));
        assert!(delay2 >= Duration::from_secs(4) && delay2 < Duration::from_secs(5));
    }

    #[test]
    fn test_backoff_cap() {
        // Very high attempt numbers are capped at attempt 10 (~17 minutes).
        let delay_high = backoff_delay(40);
        let delay_capped = backoff_delay(10);

        assert!(delay_high >= Duration::from_secs(1024));
        assert!(delay_high < Duration::from_secs(1026));
        assert!(delay_capped >= Duration::from_secs(1024));
        assert!(delay_capped < Duration::from_secs(1026));
    }
}
