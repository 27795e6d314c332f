//! Counts of invocation outcomes ("ok", "timeout", ...)

use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct OutcomeCounter {
    counts: BTreeMap<String, u64>,
}

impl OutcomeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: &str) {
        *self.counts.entry(outcome.to_string()).or_insert(0) += 1;
    }

    pub fn get(&self, outcome: &str) -> u64 {
        self.counts.get(outcome).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Outcomes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(name, count)| (name.as_str(), *count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_accumulate() {
        let mut counter = OutcomeCounter::new();
        counter.record("ok");
        counter.record("ok");
        counter.record("timeout");

        assert_eq!(counter.get("ok"), 2);
        assert_eq!(counter.get("execution_error"), 0);
        assert_eq!(counter.total(), 3);
        let names: Vec<_> = counter.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["ok", "timeout"]);
    }
}
