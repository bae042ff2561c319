//! Shared weight arrays with lock-free accumulation.
//!
//! Workers deposit concurrently with atomic `f64` adds, so summation order
//! between photons is unspecified and results agree only up to rounding.

use std::sync::atomic::Ordering;

use atomic_float::AtomicF64;

use crate::error::{ConfigError, ConfigResult};

/// `(gate, bin, pattern)` array of atomically added weights.
///
/// Layout is gate-major with patterns innermost:
/// `index = (gate * bins + bin) * patterns + pattern`.
#[derive(Debug)]
pub struct WeightAccumulator {
    gates: usize,
    bins: usize,
    patterns: usize,
    data: Vec<AtomicF64>,
}

impl WeightAccumulator {
    /// Allocate a zeroed array; fails if the size overflows `usize`.
    pub fn new(gates: usize, bins: usize, patterns: usize) -> ConfigResult<Self> {
        let len = gates
            .checked_mul(bins)
            .and_then(|n| n.checked_mul(patterns))
            .ok_or(ConfigError::AccumulatorOverflow { gates, bins, patterns })?;
        Ok(Self {
            gates,
            bins,
            patterns,
            data: (0..len).map(|_| AtomicF64::new(0.0)).collect(),
        })
    }

    pub fn gates(&self) -> usize {
        self.gates
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn patterns(&self) -> usize {
        self.patterns
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn index(&self, gate: usize, bin: usize, pattern: usize) -> usize {
        (gate * self.bins + bin) * self.patterns + pattern
    }

    /// Add `value` to one entry.
    #[inline]
    pub fn add(&self, gate: usize, bin: usize, pattern: usize, value: f64) {
        self.data[self.index(gate, bin, pattern)].fetch_add(value, Ordering::Relaxed);
    }

    /// Add `value × pattern_weights[p]` for every pattern.
    #[inline]
    pub fn add_patterns(&self, gate: usize, bin: usize, value: f64, pattern_weights: &[f64]) {
        let base = self.index(gate, bin, 0);
        for (slot, w) in self.data[base..base + self.patterns].iter().zip(pattern_weights) {
            slot.fetch_add(value * w, Ordering::Relaxed);
        }
    }

    /// Current value of one entry.
    pub fn get(&self, gate: usize, bin: usize, pattern: usize) -> f64 {
        self.data[self.index(gate, bin, pattern)].load(Ordering::Relaxed)
    }

    /// Sum over all gates and bins of one pattern.
    pub fn total(&self, pattern: usize) -> f64 {
        self.data
            .iter()
            .skip(pattern)
            .step_by(self.patterns.max(1))
            .map(|v| v.load(Ordering::Relaxed))
            .sum()
    }

    /// Snapshot the values once all workers have finished.
    pub fn into_vec(self) -> Vec<f64> {
        self.data.into_iter().map(AtomicF64::into_inner).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_overflow_is_rejected() {
        assert!(matches!(
            WeightAccumulator::new(usize::MAX, 2, 1),
            Err(ConfigError::AccumulatorOverflow { .. })
        ));
    }

    #[test]
    fn test_layout_and_totals() {
        let acc = WeightAccumulator::new(2, 3, 2).unwrap();
        acc.add(1, 2, 1, 4.0);
        acc.add_patterns(0, 0, 1.0, &[0.5, 2.0]);
        assert_eq!(acc.get(1, 2, 1), 4.0);
        assert_eq!(acc.total(0), 0.5);
        assert_eq!(acc.total(1), 6.0);
        let values = acc.into_vec();
        assert_eq!(values.len(), 12);
        assert_eq!(values[11], 4.0);
    }

    #[test]
    fn test_concurrent_adds_are_not_lost() {
        let acc = WeightAccumulator::new(1, 4, 1).unwrap();
        (0..10_000).into_par_iter().for_each(|i| acc.add(0, i % 4, 0, 1.0));
        for bin in 0..4 {
            assert_eq!(acc.get(0, bin, 0), 2500.0);
        }
    }
}
