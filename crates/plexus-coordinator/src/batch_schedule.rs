// Batch-size schedule: a pure ramp over cumulative processed tokens.
//
// Fully re-derivable from the data cursor alone, so it is recomputed at
// every round start instead of being carried as state.

use crate::config::BatchRamp;

/// Target batch size once the data stream has advanced to `data_cursor`
/// sequences. Linear ramp from `batch_size_start` to `batch_size_end`
/// over the first `warmup_tokens` processed tokens, flat afterwards.
pub fn target_batch_size(data_cursor: u64, ramp: &BatchRamp) -> u32 {
    let tokens_processed = data_cursor.saturating_mul(ramp.max_seq_len as u64);
    if tokens_processed >= ramp.warmup_tokens {
        return ramp.batch_size_end;
    }
    // warmup_tokens > tokens_processed >= 0 here, so the divisor is nonzero.
    let span = (ramp.batch_size_end - ramp.batch_size_start) as u128;
    let ramped = span * tokens_processed as u128 / ramp.warmup_tokens as u128;
    ramp.batch_size_start + ramped as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> BatchRamp {
        BatchRamp {
            batch_size_start: 8,
            batch_size_end: 64,
            warmup_tokens: 1_000_000,
            max_seq_len: 1000,
        }
    }

    #[test]
    fn test_starts_at_batch_size_start() {
        assert_eq!(target_batch_size(0, &ramp()), 8);
    }

    #[test]
    fn test_ends_at_batch_size_end_past_warmup() {
        let r = ramp();
        // 1000 sequences * 1000 tokens = exactly warmup_tokens
        assert_eq!(target_batch_size(1000, &r), 64);
        assert_eq!(target_batch_size(5000, &r), 64);
        assert_eq!(target_batch_size(u64::MAX, &r), 64);
    }

    #[test]
    fn test_midpoint_interpolates() {
        // Halfway through warmup: 8 + (64-8)/2 = 36
        assert_eq!(target_batch_size(500, &ramp()), 36);
    }

    #[test]
    fn test_monotonic_non_decreasing() {
        let r = ramp();
        let mut previous = 0;
        for cursor in 0..1200 {
            let size = target_batch_size(cursor, &r);
            assert!(size >= previous, "ramp decreased at cursor {}", cursor);
            previous = size;
        }
    }

    #[test]
    fn test_flat_ramp_when_start_equals_end() {
        let r = BatchRamp {
            batch_size_start: 32,
            batch_size_end: 32,
            warmup_tokens: 1_000_000,
            max_seq_len: 1000,
        };
        assert_eq!(target_batch_size(0, &r), 32);
        assert_eq!(target_batch_size(999, &r), 32);
        assert_eq!(target_batch_size(10_000, &r), 32);
    }

    #[test]
    fn test_zero_warmup_tokens_is_always_end() {
        let r = BatchRamp {
            batch_size_start: 8,
            batch_size_end: 64,
            warmup_tokens: 0,
            max_seq_len: 1000,
        };
        assert_eq!(target_batch_size(0, &r), 64);
    }
}
