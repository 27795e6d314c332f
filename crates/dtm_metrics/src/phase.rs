//! Timing of named setup phases

use std::time::{Duration, Instant};

/// Phase durations in the order the phases first ran.
#[derive(Debug, Default)]
pub struct PhaseTimer {
    phases: Vec<(String, Duration)>,
}

impl PhaseTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time<F, R>(&mut self, phase: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();

        match self.phases.iter_mut().find(|(name, _)| name == phase) {
            Some((_, total)) => *total += elapsed,
            None => self.phases.push((phase.to_string(), elapsed)),
        }
        result
    }

    pub fn get(&self, phase: &str) -> Duration {
        self.phases
            .iter()
            .find(|(name, _)| name == phase)
            .map_or(Duration::ZERO, |(_, d)| *d)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Duration)> {
        self.phases.iter().map(|(name, d)| (name.as_str(), *d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phases_keep_first_run_order() {
        let mut timer = PhaseTimer::new();
        timer.time("sandbox", || std::thread::sleep(Duration::from_millis(2)));
        timer.time("prepare", || ());
        timer.time("sandbox", || ());

        let names: Vec<_> = timer.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["sandbox", "prepare"]);
        assert!(timer.get("sandbox") >= Duration::from_millis(2));
        assert_eq!(timer.get("missing"), Duration::ZERO);
    }
}
