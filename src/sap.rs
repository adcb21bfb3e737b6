//! Per-observation arrays and range views over them.
//!
//! `SapData` owns one observation's worth of parallel arrays: the sorted
//! compact leaf ids it is compatible with, the per-position const
//! log-likelihoods, the E-step rho output slots, and cumulative
//! log-sum-exp prefixes that make any contiguous range's total likelihood
//! or assignment mass an O(1) prefix difference.
//!
//! `Sap` is a non-owning window onto a contiguous sub-range of one
//! `SapData`. Tree descent repeatedly splits a sap at a child's right
//! boundary ([`Sap::branch`]) instead of walking leaves one by one, so a
//! node touches only the O(log n) boundary positions that matter to it.

use std::cell::Cell;

use crate::logspace::{log_add, log_sub, LOG_0};

/// Owned per-observation arrays. One instance per processing cycle,
/// created and discarded per call.
#[derive(Debug)]
pub struct SapData {
    /// Compact leaf ids, strictly ascending, no duplicates.
    leaf_ids: Vec<usize>,
    /// Per-position const log-likelihood, aligned with `leaf_ids`.
    const_likelihoods: Vec<f64>,
    /// Cumulative log-sum-exp prefix over `const_likelihoods`; length
    /// `n + 1`, index 0 holds log-zero.
    accum_const_likelihoods: Vec<f64>,
    /// E-step output slots. Written through shared range views during
    /// descent, hence `Cell`: sibling saps cover disjoint positions.
    rhos: Vec<Cell<f64>>,
    /// Cumulative log-sum-exp prefix over the posterior assignments.
    accum_assignments: Vec<f64>,
    /// Index of the root tree all leaves in this observation belong to.
    tree_root: usize,
}

impl SapData {
    /// Allocate arrays for an observation with `n` compatible leaves.
    pub fn new(n: usize) -> Self {
        Self {
            leaf_ids: vec![0; n],
            const_likelihoods: vec![LOG_0; n],
            accum_const_likelihoods: vec![LOG_0; n + 1],
            rhos: vec![Cell::new(LOG_0); n],
            accum_assignments: vec![LOG_0; n + 1],
            tree_root: 0,
        }
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        self.leaf_ids.len()
    }

    /// Whether the observation has no positions.
    pub fn is_empty(&self) -> bool {
        self.leaf_ids.is_empty()
    }

    /// Record hit `i`: its leaf id and const log-likelihood, extending
    /// the likelihood prefix. Must be called in position order.
    pub fn set_hit(&mut self, i: usize, leaf_id: usize, log_likelihood: f64) {
        self.leaf_ids[i] = leaf_id;
        self.const_likelihoods[i] = log_likelihood;
        self.accum_const_likelihoods[i + 1] =
            log_add(self.accum_const_likelihoods[i], log_likelihood);
    }

    /// Record position `i` of a seeding pass: its leaf id and initial
    /// log abundance, extending the assignment prefix.
    pub fn set_seed(&mut self, i: usize, leaf_id: usize, log_alpha: f64) {
        self.leaf_ids[i] = leaf_id;
        self.rhos[i].set(log_alpha);
        self.accum_assignments[i + 1] = log_add(self.accum_assignments[i], log_alpha);
    }

    /// Record the posterior assignment of position `i`, extending the
    /// assignment prefix. Must be called in position order.
    pub fn set_assignment(&mut self, i: usize, log_frac: f64) {
        self.accum_assignments[i + 1] = log_add(self.accum_assignments[i], log_frac);
    }

    /// Set the owning root tree index.
    pub fn set_tree_root(&mut self, tree: usize) {
        self.tree_root = tree;
    }

    /// Rho slot of position `i` (absolute position).
    pub fn rho(&self, i: usize) -> f64 {
        self.rhos[i].get()
    }

    /// Const log-likelihood of position `i` (absolute position).
    pub fn const_likelihood(&self, i: usize) -> f64 {
        self.const_likelihoods[i]
    }

    /// View over the full range.
    pub fn sap(&self) -> Sap<'_> {
        Sap {
            data: self,
            l: 0,
            r: self.leaf_ids.len(),
        }
    }
}

/// Non-owning view of a contiguous half-open range `[l, r)` of one
/// [`SapData`]. Derived saps never outlive the backing storage.
#[derive(Debug)]
pub struct Sap<'a> {
    data: &'a SapData,
    l: usize,
    r: usize,
}

impl<'a> Sap<'a> {
    /// Range length.
    pub fn size(&self) -> usize {
        self.r - self.l
    }

    /// Whether the range is empty.
    pub fn is_empty(&self) -> bool {
        self.l == self.r
    }

    /// Root tree index of the backing observation.
    pub fn tree_root(&self) -> usize {
        self.data.tree_root
    }

    /// Split off the prefix whose leaf ids are `<= split`, advancing
    /// self to the remainder.
    ///
    /// Upper-bound binary search against the sorted `leaf_ids` slice:
    /// O(log n) per call. Callers descend children in ascending interval
    /// order and branch at each child's right boundary in turn; once the
    /// remainder is empty, further branches legally return empty saps.
    pub fn branch(&mut self, split: usize) -> Sap<'a> {
        let old_left = self.l;
        let offset = self.data.leaf_ids[self.l..self.r].partition_point(|&id| id <= split);
        self.l += offset;
        Sap {
            data: self.data,
            l: old_left,
            r: self.l,
        }
    }

    /// Log-sum-exp of the const likelihoods over this range, via the
    /// prefix accumulators.
    pub fn total_const_likelihood(&self) -> f64 {
        log_sub(
            self.data.accum_const_likelihoods[self.r],
            self.data.accum_const_likelihoods[self.l],
        )
    }

    /// This range's share of the observation's total assignment mass.
    pub fn fraction(&self) -> f64 {
        log_sub(
            self.data.accum_assignments[self.r],
            self.data.accum_assignments[self.l],
        )
    }

    /// Leaf id at range position `i`.
    pub fn leaf_id(&self, i: usize) -> usize {
        self.data.leaf_ids[self.l + i]
    }

    /// Const log-likelihood at range position `i`.
    pub fn const_likelihood(&self, i: usize) -> f64 {
        self.data.const_likelihoods[self.l + i]
    }

    /// Rho slot at range position `i`.
    pub fn rho(&self, i: usize) -> f64 {
        self.data.rhos[self.l + i].get()
    }

    /// Write the rho slot at range position `i`.
    pub fn set_rho(&self, i: usize, rho: f64) {
        self.data.rhos[self.l + i].set(rho);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logspace::{log_sum_exp, LOG_1};

    fn sample_data() -> SapData {
        // Leaf ids 2, 5, 7, 11 with likelihoods 0.1, 0.2, 0.3, 0.4.
        let mut data = SapData::new(4);
        let liks = [0.1f64, 0.2, 0.3, 0.4];
        for (i, (&leaf, &lik)) in [2usize, 5, 7, 11].iter().zip(liks.iter()).enumerate() {
            data.set_hit(i, leaf, lik.ln());
        }
        data
    }

    #[test]
    fn test_branch_partitions_by_split() {
        let data = sample_data();
        let mut sap = data.sap();

        let prefix = sap.branch(5);
        assert_eq!(prefix.size(), 2);
        assert_eq!(prefix.leaf_id(0), 2);
        assert_eq!(prefix.leaf_id(1), 5);
        assert_eq!(sap.size(), 2);
        assert_eq!(sap.leaf_id(0), 7);
    }

    #[test]
    fn test_branch_sizes_always_sum() {
        let data = sample_data();
        for split in 0..13 {
            let mut sap = data.sap();
            let total = sap.size();
            let prefix = sap.branch(split);
            assert_eq!(prefix.size() + sap.size(), total, "split={split}");
            for i in 0..prefix.size() {
                assert!(prefix.leaf_id(i) <= split);
            }
            for i in 0..sap.size() {
                assert!(sap.leaf_id(i) > split);
            }
        }
    }

    #[test]
    fn test_branch_exhausted_returns_empty() {
        let data = sample_data();
        let mut sap = data.sap();
        let _ = sap.branch(11);
        assert!(sap.is_empty());
        let tail = sap.branch(100);
        assert!(tail.is_empty());
        assert_eq!(tail.fraction(), LOG_0);
    }

    #[test]
    fn test_total_const_likelihood_matches_direct() {
        let data = sample_data();
        let mut sap = data.sap();
        let full = sap.total_const_likelihood();
        let direct = log_sum_exp(&[0.1f64.ln(), 0.2f64.ln(), 0.3f64.ln(), 0.4f64.ln()]);
        assert!((full - direct).abs() < 1e-9);

        let prefix = sap.branch(5);
        let expected = log_sum_exp(&[0.1f64.ln(), 0.2f64.ln()]);
        assert!((prefix.total_const_likelihood() - expected).abs() < 1e-9);
        let rest = log_sum_exp(&[0.3f64.ln(), 0.4f64.ln()]);
        assert!((sap.total_const_likelihood() - rest).abs() < 1e-9);
    }

    #[test]
    fn test_fraction_from_assignments() {
        let mut data = sample_data();
        // Posterior 0.25 each: the full range holds all the mass.
        for i in 0..4 {
            data.set_assignment(i, 0.25f64.ln());
        }
        let mut sap = data.sap();
        assert!((sap.fraction() - LOG_1).abs() < 1e-9);
        let prefix = sap.branch(5);
        assert!((prefix.fraction() - 0.5f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn test_rho_writes_through_view() {
        let data = sample_data();
        let mut sap = data.sap();
        let prefix = sap.branch(5);
        prefix.set_rho(0, -1.0);
        prefix.set_rho(1, -2.0);
        sap.set_rho(0, -3.0);
        assert_eq!(prefix.rho(0), -1.0);
        assert_eq!(data.rho(0), -1.0);
        assert_eq!(data.rho(1), -2.0);
        assert_eq!(data.rho(2), -3.0);
    }

    #[test]
    fn test_tree_root_passthrough() {
        let mut data = sample_data();
        data.set_tree_root(4);
        let mut sap = data.sap();
        assert_eq!(sap.tree_root(), 4);
        // Derived views keep pointing at the same observation.
        assert_eq!(sap.branch(5).tree_root(), 4);
    }
}
