//! Bounded exponential backoff with jitter for resubscription after
//! transient watch-stream errors (§4.1). `kube::runtime::watcher::Config`
//! already carries its own internal backoff for the underlying HTTP retry;
//! this helper governs the outer "restart the whole watch stream" retry so
//! its bound is independently testable without a live API server.

use std::time::Duration;

use rand::Rng;

const INITIAL: Duration = Duration::from_millis(250);
const MAX: Duration = Duration::from_secs(30);

/// Tracks the current retry delay for one per-kind watch task. Resets after
/// any successful, sustained connection (see [`Backoff::reset`]).
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
}

impl Backoff {
    pub fn new() -> Self {
        Self { current: INITIAL }
    }

    /// Doubles the delay (capped at [`MAX`]) and returns a jittered value to
    /// actually sleep for. Jitter is uniform in `[0.5x, 1.0x]` of the
    /// doubled delay, avoiding thundering-herd resubscription across many
    /// kinds after a shared API-server blip.
    pub fn next_delay(&mut self) -> Duration {
        let jittered = {
            let mut rng = rand::thread_rng();
            let factor = rng.gen_range(0.5..=1.0);
            self.current.mul_f64(factor)
        };
        self.current = (self.current * 2).min(MAX);
        jittered
    }

    pub fn reset(&mut self) {
        self.current = INITIAL;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_is_bounded_and_grows() {
        let mut backoff = Backoff::new();
        let mut previous_cap = INITIAL;
        for _ in 0..10 {
            let delay = backoff.next_delay();
            assert!(delay <= MAX);
            assert!(delay <= previous_cap.mul_f64(2.0) + Duration::from_millis(1));
            previous_cap = (previous_cap * 2).min(MAX);
        }
    }

    #[test]
    fn reset_returns_to_initial_delay() {
        let mut backoff = Backoff::new();
        for _ in 0..5 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.current, INITIAL);
    }
}
