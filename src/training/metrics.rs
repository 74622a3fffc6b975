use std::collections::VecDeque;

/// Rolling window over a scalar training series (episode rewards, losses,
/// inertia), plus a lifetime count that is never capped.
#[derive(Debug, Clone)]
pub struct SeriesWindow {
    values: VecDeque<f64>,
    capacity: usize,
    total_recorded: usize,
}

impl SeriesWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        SeriesWindow {
            values: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            total_recorded: 0,
        }
    }

    /// Window sized for the reward and loss charts.
    pub fn new() -> Self {
        Self::with_capacity(50)
    }

    pub fn record(&mut self, value: f64) {
        self.total_recorded += 1;
        self.values.push_back(value);
        if self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    pub fn latest(&self) -> Option<f64> {
        self.values.back().copied()
    }

    /// Mean of the last N values.
    pub fn average(&self, last_n: usize) -> f64 {
        let n = self.values.len().min(last_n);
        if n == 0 {
            return 0.0;
        }
        let sum: f64 = self.values.iter().rev().take(n).sum();
        sum / n as f64
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn total_recorded(&self) -> usize {
        self.total_recorded
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.total_recorded = 0;
    }
}

impl Default for SeriesWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of a finished episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeSummary {
    pub episode: u64,
    pub total_reward: f64,
    pub steps: usize,
    pub reached_goal: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_evicts_oldest() {
        let mut w = SeriesWindow::with_capacity(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            w.record(v);
        }
        assert_eq!(w.len(), 3);
        assert_eq!(w.values().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
        assert_eq!(w.total_recorded(), 4);
    }

    #[test]
    fn test_average_last_n() {
        let mut w = SeriesWindow::new();
        for v in [1.0, 2.0, 3.0, 4.0] {
            w.record(v);
        }
        assert!((w.average(2) - 3.5).abs() < 1e-12);
        assert!((w.average(100) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_window() {
        let w = SeriesWindow::new();
        assert_eq!(w.average(10), 0.0);
        assert_eq!(w.latest(), None);
        assert!(w.is_empty());
    }

    #[test]
    fn test_huge_capacity_does_not_preallocate() {
        let mut w = SeriesWindow::with_capacity(usize::MAX);
        w.record(1.0);
        assert_eq!(w.latest(), Some(1.0));
    }
}
