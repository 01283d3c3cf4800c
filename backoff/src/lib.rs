//! Retry with pluggable backoff.
//!
//! A backoff is any `Iterator<Item = Duration>`: each item is the cool-off
//! period before the next reattempt, and iterator exhaustion means the retry
//! budget is spent. [`strategy`] ships the two strategies we use, a capped
//! [`strategy::exponential::Exponential`] and a constant
//! [`strategy::fixed::Interval`].

pub mod strategy;

mod retry;
pub use retry::retry;
