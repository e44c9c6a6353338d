use serde::{Deserialize, Serialize};

/// Running counters for the browser pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMetrics {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub crash_count: u64,
    pub launch_failures: u64,
    pub active_instances: usize,
    pub available_instances: usize,
}

impl PoolMetrics {
    pub fn record_request(&mut self) {
        self.total_requests = self.total_requests.saturating_add(1);
    }

    pub fn record_failure(&mut self) {
        self.failed_requests = self.failed_requests.saturating_add(1);
    }

    pub fn record_crash(&mut self) {
        self.crash_count = self.crash_count.saturating_add(1);
    }

    pub fn record_launch_failure(&mut self) {
        self.launch_failures = self.launch_failures.saturating_add(1);
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            let succeeded = self.total_requests.saturating_sub(self.failed_requests);
            (succeeded as f64 / self.total_requests as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_counts_failures() {
        let mut metrics = PoolMetrics::default();
        assert_eq!(metrics.success_rate(), 0.0);
        for _ in 0..4 {
            metrics.record_request();
        }
        metrics.record_failure();
        assert_eq!(metrics.success_rate(), 75.0);
    }
}
