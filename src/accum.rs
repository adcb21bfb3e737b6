//! Running log-mass accumulator.

use ndarray::Array1;

use crate::logspace::{log_add, LOG_0};

/// A fixed-size mapping from child index to running log-mass.
///
/// Slots start at the log-zero sentinel and only ever grow through
/// log-space addition. Sized once (when the owning node's child list is
/// final) and never resized afterwards.
#[derive(Debug, Clone)]
pub struct LogMassVector {
    inner: Array1<f64>,
}

impl Default for LogMassVector {
    fn default() -> Self {
        Self::log_zero(0)
    }
}

impl LogMassVector {
    /// Create `n` slots, all holding log-zero.
    pub fn log_zero(n: usize) -> Self {
        Self {
            inner: Array1::from_elem(n, LOG_0),
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the vector has no slots.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Current log-mass of slot `i`.
    #[inline]
    pub fn get(&self, i: usize) -> f64 {
        self.inner[i]
    }

    /// Add `log_delta` (a log-space mass) into slot `i`.
    #[inline]
    pub fn increment(&mut self, i: usize, log_delta: f64) {
        let v = log_add(self.inner[i], log_delta);
        debug_assert!(!v.is_nan(), "log-mass accumulator went NaN at slot {i}");
        self.inner[i] = v;
    }

    /// Read-only view of all slots.
    pub fn as_slice(&self) -> &[f64] {
        self.inner.as_slice().unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logspace::LOG_1;

    #[test]
    fn test_starts_at_log_zero() {
        let v = LogMassVector::log_zero(3);
        assert_eq!(v.len(), 3);
        for i in 0..3 {
            assert_eq!(v.get(i), LOG_0);
        }
    }

    #[test]
    fn test_increment_is_log_add() {
        let mut v = LogMassVector::log_zero(2);
        v.increment(0, LOG_1);
        assert_eq!(v.get(0), LOG_1);
        // 1 + 1 = 2
        v.increment(0, LOG_1);
        assert!((v.get(0) - 2.0f64.ln()).abs() < 1e-12);
        // Untouched slot stays log-zero.
        assert_eq!(v.get(1), LOG_0);
        assert_eq!(v.as_slice().len(), 2);
        assert_eq!(v.as_slice()[1], LOG_0);
    }

    #[test]
    fn test_default_is_empty() {
        let v = LogMassVector::default();
        assert!(v.is_empty());
        assert_eq!(v.len(), 0);
    }
}
