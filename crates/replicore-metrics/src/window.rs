//! Bounded per-target sample retention.

use std::collections::VecDeque;
use std::time::Duration;

use replicore_core::MetricSample;

/// A bounded window of recent metric samples for one target.
///
/// Samples are discarded once they fall outside the retention period
/// or the window exceeds its size cap. The policy engine sees exactly
/// this window, nothing older.
#[derive(Debug)]
pub struct SampleWindow {
    retention: Duration,
    max_samples: usize,
    samples: VecDeque<MetricSample>,
}

impl SampleWindow {
    pub fn new(retention: Duration, max_samples: usize) -> Self {
        Self {
            retention,
            max_samples,
            samples: VecDeque::new(),
        }
    }

    /// Append freshly fetched samples and prune expired ones.
    pub fn extend(&mut self, samples: Vec<MetricSample>, now: u64) {
        for s in samples {
            self.samples.push_back(s);
        }
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
        self.prune(now);
    }

    /// Drop samples older than the retention period.
    pub fn prune(&mut self, now: u64) {
        let cutoff = now.saturating_sub(self.retention.as_secs());
        while let Some(front) = self.samples.front() {
            if front.timestamp < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// The retained samples, oldest first.
    pub fn samples(&mut self) -> &[MetricSample] {
        self.samples.make_contiguous()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replicore_core::MetricKind;

    fn sample(value: f64, ts: u64) -> MetricSample {
        MetricSample {
            kind: MetricKind::Cpu,
            target_id: "default/api".to_string(),
            value,
            timestamp: ts,
        }
    }

    #[test]
    fn retains_recent_samples() {
        let mut w = SampleWindow::new(Duration::from_secs(60), 100);
        w.extend(vec![sample(50.0, 1000), sample(60.0, 1015)], 1015);
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn prunes_expired_samples() {
        let mut w = SampleWindow::new(Duration::from_secs(60), 100);
        w.extend(vec![sample(50.0, 1000)], 1000);
        w.extend(vec![sample(60.0, 1070)], 1070);
        // The 1000 sample is older than 60s at t=1070.
        assert_eq!(w.samples().len(), 1);
        assert_eq!(w.samples()[0].timestamp, 1070);
    }

    #[test]
    fn enforces_size_cap() {
        let mut w = SampleWindow::new(Duration::from_secs(3600), 4);
        for i in 0..10u64 {
            w.extend(vec![sample(i as f64, 1000 + i)], 1000 + i);
        }
        assert_eq!(w.len(), 4);
        // Oldest were evicted first.
        assert_eq!(w.samples()[0].value, 6.0);
    }

    #[test]
    fn empty_window_is_empty() {
        let mut w = SampleWindow::new(Duration::from_secs(60), 10);
        assert!(w.is_empty());
        assert!(w.samples().is_empty());
    }
}
