//! Contiguous-range probability trees.
//!
//! A `RangeRhoTree` node covers a contiguous interval of compact leaf
//! ids; its children's intervals exactly partition the parent's interval,
//! gap-free and ascending. That invariant is what lets every descent
//! split an observation's sap by binary search at each child's right
//! boundary instead of visiting leaves one at a time.
//!
//! Each internal node carries a per-child running log-mass accumulator
//! (the learned redistribution weights) and its own online update-weight
//! schedule. The E-step ([`RangeRhoTree::get_rhos`]) reads masses down
//! the tree; the M-step ([`RangeRhoTree::update_rhos`]) pushes an
//! observation's posterior mass back up into them.

use crate::accum::LogMassVector;
use crate::error::{Error, Result};
use crate::logspace::{is_log_zero, LOG_0, LOG_1};
use crate::mass::MassSchedule;
use crate::sap::Sap;

/// One node of a contiguous-range probability tree, exclusive owner of
/// its subtree.
#[derive(Debug, Clone)]
pub struct RangeRhoTree {
    /// Inclusive left bound of the covered leaf interval.
    left: usize,
    /// Inclusive right bound of the covered leaf interval.
    right: usize,
    children: Vec<RangeRhoTree>,
    /// Running log-mass per child, aligned with `children`.
    child_rhos: LogMassVector,
    mass: MassSchedule,
}

impl RangeRhoTree {
    /// Create a node covering `[left, right]` with no children yet.
    ///
    /// A node constructed over a single index and never given children
    /// is a leaf.
    pub fn new(left: usize, right: usize, schedule: MassSchedule) -> Self {
        Self {
            left,
            right,
            children: Vec::new(),
            child_rhos: LogMassVector::default(),
            mass: schedule,
        }
    }

    /// Inclusive left bound of the covered leaf interval.
    pub fn left(&self) -> usize {
        self.left
    }

    /// Inclusive right bound of the covered leaf interval.
    pub fn right(&self) -> usize {
        self.right
    }

    /// Whether this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Child nodes, ascending by interval.
    pub fn children(&self) -> &[RangeRhoTree] {
        &self.children
    }

    /// Running log-mass of child `i`.
    pub fn child_log_mass(&self, i: usize) -> f64 {
        self.child_rhos.get(i)
    }

    /// Append a child, extending this node's interval.
    ///
    /// The first child defines the interval; every subsequent child's
    /// left bound must immediately follow the current right bound.
    pub fn add_child(&mut self, child: RangeRhoTree) -> Result<()> {
        if self.children.is_empty() {
            self.left = child.left;
            self.right = child.right;
        } else if child.left != self.right + 1 {
            return Err(Error::MalformedHierarchy {
                line: 0,
                message: format!(
                    "child interval [{}, {}] does not follow right boundary {}",
                    child.left, child.right, self.right
                ),
            });
        } else {
            self.right = child.right;
        }
        self.children.push(child);
        Ok(())
    }

    /// Size and zero every accumulator in the subtree. Called once after
    /// loading, when the structure is final.
    pub(crate) fn init_accumulators(&mut self) {
        self.child_rhos = LogMassVector::log_zero(self.children.len());
        for child in &mut self.children {
            child.init_accumulators();
        }
    }

    /// Entropy-based confidence discount for an observation at this
    /// node, in log space.
    ///
    /// An observation whose hits are nearly uniformly likely across many
    /// leaves carries no signal about how mass should split here, so its
    /// update is discounted toward zero; a sharply peaked observation
    /// keeps full weight. Ranges smaller than the branching factor are
    /// always fully trusted.
    pub fn similarity_scalar(&self, sap: &Sap<'_>) -> f64 {
        if sap.size() < self.children.len() {
            return LOG_1;
        }
        let total = sap.total_const_likelihood();
        if is_log_zero(total) {
            return LOG_0;
        }
        let mut c = (sap.size() as f64).ln();
        for i in 0..sap.size() {
            let p = sap.const_likelihood(i) - total;
            if is_log_zero(p) {
                // lim p->0 of p*log(p): contributes nothing.
                continue;
            }
            c += p.exp() * p;
            debug_assert!(!c.is_nan(), "confidence scalar went NaN");
        }
        if c < 0.0 {
            return LOG_0;
        }
        if c > 1.0 {
            return LOG_1;
        }
        c.ln()
    }

    /// One-time seeding pass: initialize the per-child accumulators from
    /// externally supplied initial abundances carried in `sap`'s
    /// assignment prefix.
    pub fn set_rhos(&mut self, mut sap: Sap<'_>) {
        self.child_rhos = LogMassVector::log_zero(self.children.len());
        for i in 0..self.children.len() {
            let branch_sap = sap.branch(self.children[i].right);
            if !branch_sap.is_empty() {
                let frac = branch_sap.fraction();
                debug_assert!(!frac.is_nan(), "seed fraction went NaN");
                self.children[i].set_rhos(branch_sap);
                self.child_rhos.increment(i, frac);
            }
            if sap.is_empty() {
                break;
            }
        }
    }

    /// E-step: write the accumulated log-mass along each leaf's path
    /// into the sap's rho slots.
    ///
    /// `rho` carries the sum of log-masses from the root down to this
    /// node. Descent is ascending by child interval and stops as soon as
    /// the sap is exhausted.
    pub fn get_rhos(&self, mut sap: Sap<'_>, rho: f64) {
        debug_assert!(!rho.is_nan(), "rho accumulator went NaN");
        if self.is_leaf() {
            for i in 0..sap.size() {
                sap.set_rho(i, rho);
            }
            return;
        }
        for (i, child) in self.children.iter().enumerate() {
            let branch_sap = sap.branch(child.right);
            if !branch_sap.is_empty() {
                child.get_rhos(branch_sap, rho + self.child_rhos.get(i));
            }
            if sap.is_empty() {
                break;
            }
        }
    }

    /// M-step: push this observation's posterior mass into the per-child
    /// accumulators.
    ///
    /// The node's update weight is its schedule's next mass discounted by
    /// [`similarity_scalar`](Self::similarity_scalar); a log-zero
    /// combined weight means the observation carries no information for
    /// this node and the whole subtree update is skipped.
    pub fn update_rhos(&mut self, mut sap: Sap<'_>) {
        if self.is_leaf() {
            return;
        }
        let mass = self.mass.next_mass() + self.similarity_scalar(&sap);
        if is_log_zero(mass) {
            return;
        }
        for i in 0..self.children.len() {
            let branch_sap = sap.branch(self.children[i].right);
            if !branch_sap.is_empty() {
                let frac = branch_sap.fraction();
                self.children[i].update_rhos(branch_sap);
                self.child_rhos.increment(i, mass + frac);
            }
            if sap.is_empty() {
                break;
            }
        }
    }
}
