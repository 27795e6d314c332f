//! DTM Metrics - invocation statistics for the smart function harness
//!
//! Provides zero-cost abstractions for metrics collection that completely
//! vanish in production builds via feature flags.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable metrics collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use dtm_metrics::{LatencyWindow, OutcomeCounter};
//!
//! let mut latency = LatencyWindow::new(64); // Track the last 64 calls
//! let mut outcomes = OutcomeCounter::new();
//! latency.record(elapsed);
//! outcomes.record("ok");
//! println!("avg: {:.2}ms", latency.average_ms());
//! ```
//!
//! Without the `metrics` feature every type below is an empty stub.

#[cfg(feature = "metrics")]
mod latency;
#[cfg(feature = "metrics")]
mod outcome;
#[cfg(feature = "metrics")]
mod phase;

#[cfg(feature = "metrics")]
pub use latency::LatencyWindow;
#[cfg(feature = "metrics")]
pub use outcome::OutcomeCounter;
#[cfg(feature = "metrics")]
pub use phase::PhaseTimer;

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct LatencyWindow;

#[cfg(not(feature = "metrics"))]
impl LatencyWindow {
    pub fn new(_capacity: usize) -> Self { Self }
    pub fn record(&mut self, _elapsed: std::time::Duration) {}
    pub fn len(&self) -> usize { 0 }
    pub fn is_empty(&self) -> bool { true }
    pub fn average_ms(&self) -> f64 { 0.0 }
    pub fn max_ms(&self) -> f64 { 0.0 }
    pub fn percentile_ms(&self, _p: f64) -> f64 { 0.0 }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct OutcomeCounter;

#[cfg(not(feature = "metrics"))]
impl OutcomeCounter {
    pub fn new() -> Self { Self }
    pub fn record(&mut self, _outcome: &str) {}
    pub fn get(&self, _outcome: &str) -> u64 { 0 }
    pub fn total(&self) -> u64 { 0 }
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> { std::iter::empty() }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct PhaseTimer;

#[cfg(not(feature = "metrics"))]
impl PhaseTimer {
    pub fn new() -> Self { Self }
    pub fn time<F, R>(&mut self, _phase: &str, f: F) -> R where F: FnOnce() -> R { f() }
    pub fn get(&self, _phase: &str) -> std::time::Duration { std::time::Duration::ZERO }
    pub fn iter(&self) -> impl Iterator<Item = (&str, std::time::Duration)> { std::iter::empty() }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_types_construct_with_or_without_metrics() {
        let mut latency = super::LatencyWindow::new(8);
        latency.record(std::time::Duration::from_millis(3));
        let mut outcomes = super::OutcomeCounter::new();
        outcomes.record("ok");
        let mut phases = super::PhaseTimer::new();
        assert_eq!(phases.time("prepare", || 7), 7);
    }
}
