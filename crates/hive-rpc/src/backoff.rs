//! Fibonacci backoff bounded to a small number of tries (spec §4.1: "apply
//! fibonacci backoff bounded by 3 tries within a single call").

use std::time::Duration;

/// Returns the fibonacci backoff delay (in whole seconds) for the given
/// zero-based attempt index, starting `1, 1, 2, 3, 5, 8, ...`.
#[must_use]
pub fn fibonacci_delay(attempt: usize) -> Duration {
    let (mut a, mut b) = (1u64, 1u64);
    for _ in 0..attempt {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    Duration::from_secs(a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_matches_fibonacci() {
        let expected = [1, 1, 2, 3, 5, 8];
        for (attempt, secs) in expected.iter().enumerate() {
            assert_eq!(fibonacci_delay(attempt), Duration::from_secs(*secs));
        }
    }
}
