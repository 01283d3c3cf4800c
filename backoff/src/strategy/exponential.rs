use std::time::Duration;

use rand::Rng;

/// Exponential backoff: the n-th retry cools off for
/// `base * factor^(n - 1)`, optionally randomized by a jitter factor and
/// always capped at `max_interval`.
///
/// With `jitter` set to 0.0 the delays are fully deterministic, which is what
/// the pipeline retry ladder relies on.
#[derive(Debug, Clone)]
pub struct Exponential {
    /// Delay emitted for the upcoming attempt, before jitter and cap.
    next_delay_ms: f64,
    /// Cap applied to every emitted delay.
    max_interval: Duration,
    /// Growth multiplier between consecutive delays.
    factor: f64,
    /// Randomization factor in `[0.0, 1.0]`; an emitted delay `d` becomes a
    /// uniform sample from `[d * (1 - jitter), d * (1 + jitter)]`.
    jitter: f64,
    /// Remaining retries; `None` retries indefinitely.
    remaining: Option<u16>,
}

impl Exponential {
    pub fn new(
        base_interval: Duration,
        max_interval: Duration,
        factor: f64,
        jitter: f64,
        max_attempts: Option<u16>,
    ) -> Self {
        Self {
            next_delay_ms: base_interval.as_millis() as f64,
            max_interval,
            factor,
            jitter,
            remaining: max_attempts,
        }
    }

    /// Doubling backoff without jitter, the ladder used for pipeline job
    /// retries: `base, 2*base, 4*base, ...`, `max_attempts` retries in total.
    pub fn doubling(base_interval: Duration, max_attempts: u16) -> Self {
        Self::new(
            base_interval,
            Duration::MAX,
            2.0,
            0.0,
            Some(max_attempts),
        )
    }

    fn emit(&self) -> Duration {
        let delay_ms = if self.jitter == 0.0 {
            self.next_delay_ms
        } else {
            let spread = rand::rng().random_range(1.0 - self.jitter..=1.0 + self.jitter);
            self.next_delay_ms * spread
        };
        Duration::from_millis(delay_ms as u64).min(self.max_interval)
    }
}

impl Iterator for Exponential {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        match self.remaining.as_mut() {
            Some(0) => return None,
            Some(remaining) => *remaining -= 1,
            None => {}
        }
        let delay = self.emit();
        self.next_delay_ms *= self.factor;
        Some(delay)
    }
}
