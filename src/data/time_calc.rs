//! File/code adapted from https://github.com/jamjamjon/usls

use std::time::Duration;

/// Accumulates durations per slot (one slot per layer, or per pipeline stage)
/// across repeated runs.
#[derive(Debug, Default, Clone)]
pub struct TimeCalc {
    n: usize,
    duration: Vec<Duration>,
}

impl TimeCalc {
    pub fn total(&self) -> Duration {
        self.duration.iter().sum::<Duration>()
    }

    /// Number of complete rounds recorded.
    pub fn n(&self) -> usize {
        if self.duration.is_empty() {
            return 0;
        }
        self.n / self.duration.len()
    }

    /// Average duration of one round.
    pub fn avg(&self) -> Duration {
        match self.n() {
            0 => Duration::ZERO,
            n => self.total() / n as u32,
        }
    }

    /// Average duration of slot `i`, `None` when nothing was recorded for it.
    pub fn avg_i(&self, i: usize) -> Option<Duration> {
        let n = self.n().max(1);
        self.duration.get(i).map(|d| *d / n as u32)
    }

    pub fn ts(&self) -> &Vec<Duration> {
        &self.duration
    }

    pub fn add_or_push(&mut self, i: usize, x: Duration) {
        match self.duration.get_mut(i) {
            Some(elem) => *elem += x,
            None => self.duration.push(x),
        }
        self.n += 1;
    }

    pub fn clear(&mut self) {
        self.n = Default::default();
        self.duration = Default::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_over_rounds() {
        let mut t = TimeCalc::default();
        assert_eq!(t.avg(), Duration::ZERO);

        for _ in 0..2 {
            t.add_or_push(0, Duration::from_millis(10));
            t.add_or_push(1, Duration::from_millis(30));
        }
        assert_eq!(t.n(), 2);
        assert_eq!(t.total(), Duration::from_millis(80));
        assert_eq!(t.avg(), Duration::from_millis(40));
        assert_eq!(t.avg_i(1), Some(Duration::from_millis(30)));
        assert_eq!(t.avg_i(2), None);

        t.clear();
        assert!(t.ts().is_empty());
    }
}
