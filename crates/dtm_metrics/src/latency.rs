//! Rolling window over recent invocation latencies

use std::time::Duration;

#[derive(Debug)]
pub struct LatencyWindow {
    samples: Vec<Duration>,
    capacity: usize,
    index: usize,
}

impl LatencyWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            index: 0,
        }
    }

    pub fn record(&mut self, elapsed: Duration) {
        if self.samples.len() < self.capacity {
            self.samples.push(elapsed);
        } else {
            self.samples[self.index] = elapsed;
        }
        self.index = (self.index + 1) % self.capacity;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn average_ms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: Duration = self.samples.iter().sum();
        (sum / self.samples.len() as u32).as_secs_f64() * 1000.0
    }

    pub fn max_ms(&self) -> f64 {
        self.samples
            .iter()
            .max()
            .map_or(0.0, |d| d.as_secs_f64() * 1000.0)
    }

    /// Nearest-rank percentile, `p` in `0.0..=100.0`.
    pub fn percentile_ms(&self, p: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_unstable();
        let rank = ((p.clamp(0.0, 100.0) / 100.0) * sorted.len() as f64).ceil() as usize;
        sorted[rank.saturating_sub(1).min(sorted.len() - 1)].as_secs_f64() * 1000.0
    }
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_wraps() {
        let mut window = LatencyWindow::new(3);

        window.record(Duration::from_millis(10));
        assert_eq!(window.average_ms(), 10.0);

        window.record(Duration::from_millis(20));
        window.record(Duration::from_millis(30));
        assert_eq!(window.average_ms(), 20.0);

        // Oldest sample is overwritten
        window.record(Duration::from_millis(40));
        assert_eq!(window.len(), 3);
        assert_eq!(window.average_ms(), 30.0);
        assert_eq!(window.max_ms(), 40.0);
    }

    #[test]
    fn test_percentile() {
        let mut window = LatencyWindow::new(10);
        for ms in 1..=10 {
            window.record(Duration::from_millis(ms));
        }
        assert_eq!(window.percentile_ms(50.0), 5.0);
        assert_eq!(window.percentile_ms(100.0), 10.0);
        assert_eq!(window.percentile_ms(0.0), 1.0);
    }
}
