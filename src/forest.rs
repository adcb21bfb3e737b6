//! Forest-level orchestration.
//!
//! `RangeRhoForest` owns the loaded target hierarchy — a sequence of
//! independent root trees over one contiguous compact-leaf-id space —
//! together with the target/leaf/tree id maps, the per-root mass
//! accumulator, and the per-root observation counters.
//!
//! # Hierarchy file format
//!
//! ```text
//! <num_leaves>,<num_nodes>
//! <parent_id>,<child_id>[;<parent_id>,<child_id>...]
//! ...one line per root tree...
//! ```
//!
//! Child ids below `num_leaves` reference raw targets and are assigned
//! compact leaf ids in first-seen order; ids at or above `num_leaves`
//! reference already-constructed internal nodes. The final edge's parent
//! on each line becomes the next root tree. Targets never referenced by
//! any edge are appended as standalone singleton trees. Blank lines are
//! ignored. Children of every node (and the roots themselves, in file
//! order) must cover contiguous, ascending leaf intervals; anything else
//! is a malformed hierarchy and fails the load.
//!
//! # Lifecycle
//!
//! Load once, seed once ([`RangeRhoForest::set_alphas`]), then stream
//! observations through [`RangeRhoForest::process_fragment`]. Structure
//! and id maps never change after load; every call mutates only the
//! mass accumulators and counters, so replaying the same observation
//! sequence reproduces identical state.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, info};

use crate::accum::LogMassVector;
use crate::error::{Error, Result};
use crate::fragment::Fragment;
use crate::logspace::{is_log_zero, log_add, LOG_0, LOG_1};
use crate::mass::MassSchedule;
use crate::sap::SapData;
use crate::tree::RangeRhoTree;

/// Configuration for building a [`RangeRhoForest`].
#[derive(Debug, Clone, Default)]
pub struct ForestConfig {
    /// Update-weight schedule template, cloned into the forest and every
    /// tree node.
    schedule: MassSchedule,
}

impl ForestConfig {
    /// Create a configuration with the default forgetting-factor
    /// schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the forgetting factor of the update-weight schedule.
    pub fn with_forgetting_factor(mut self, ff: f64) -> Result<Self> {
        self.schedule = MassSchedule::forgetting(ff)?;
        Ok(self)
    }

    /// Set the update-weight schedule directly (cloned as-is, so pass a
    /// fresh one).
    pub fn with_schedule(mut self, schedule: MassSchedule) -> Self {
        self.schedule = schedule;
        self
    }
}

/// A forest of contiguous-range probability trees driving the online
/// E-step/M-step cycle.
#[derive(Debug, Clone)]
pub struct RangeRhoForest {
    roots: Vec<RangeRhoTree>,
    /// Running log-mass per root tree.
    root_rhos: LogMassVector,
    /// Forest-level update-weight schedule.
    mass: MassSchedule,
    /// Raw target id -> compact leaf id; -1 until assigned.
    target_to_leaf: Vec<i32>,
    /// Compact leaf id -> index of its containing root tree.
    leaf_to_tree: Vec<i32>,
    /// Observations processed per root tree.
    tree_counts: Vec<u64>,
}

impl RangeRhoForest {
    /// Load a forest from a hierarchy specification file.
    pub fn from_file(path: impl AsRef<Path>, config: ForestConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::load(BufReader::new(file), &path.display().to_string(), config)
    }

    /// Load a forest from any buffered reader of the hierarchy format.
    pub fn from_reader(reader: impl BufRead, config: ForestConfig) -> Result<Self> {
        Self::load(reader, "<reader>", config)
    }

    fn load(reader: impl BufRead, label: &str, config: ForestConfig) -> Result<Self> {
        let read_err = |e: std::io::Error| Error::Io {
            path: label.to_string(),
            message: e.to_string(),
        };
        let mut lines = reader.lines();

        let header = match lines.next() {
            Some(line) => line.map_err(read_err)?,
            None => {
                return Err(Error::MalformedHierarchy {
                    line: 1,
                    message: "missing header line".into(),
                })
            }
        };
        let (num_leaves, num_nodes) = parse_pair(header.trim(), 1)?;
        if num_nodes < num_leaves {
            return Err(Error::MalformedHierarchy {
                line: 1,
                message: format!("declared {num_nodes} nodes for {num_leaves} leaves"),
            });
        }
        info!(num_leaves, num_nodes, "loading target hierarchy");

        let mut nodes: Vec<Option<RangeRhoTree>> = (0..num_nodes).map(|_| None).collect();
        let mut target_to_leaf = vec![-1i32; num_leaves];
        let mut leaf_to_tree = vec![-1i32; num_leaves];
        let mut next_leaf = 0usize;
        let mut roots: Vec<RangeRhoTree> = Vec::new();

        for (idx, line) in lines.enumerate() {
            let line_no = idx + 2;
            let line = line.map_err(read_err)?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let malformed = |message: String| Error::MalformedHierarchy {
                line: line_no,
                message,
            };

            let mut last_parent = None;
            for edge in line.split(';') {
                let edge = edge.trim();
                if edge.is_empty() {
                    continue;
                }
                let (parent, child) = parse_pair(edge, line_no)?;
                if parent < num_leaves || parent >= num_nodes {
                    return Err(malformed(format!(
                        "parent id {parent} is not an internal node id"
                    )));
                }
                if parent == child {
                    return Err(malformed(format!("node {parent} is its own child")));
                }

                // A raw target reference gets the next compact leaf id;
                // leaves occupy the node slots below num_leaves.
                let child_slot = if child < num_leaves {
                    if target_to_leaf[child] != -1 {
                        return Err(malformed(format!("target {child} referenced twice")));
                    }
                    let leaf_id = next_leaf;
                    nodes[leaf_id] = Some(RangeRhoTree::new(
                        leaf_id,
                        leaf_id,
                        config.schedule.clone(),
                    ));
                    target_to_leaf[child] = leaf_id as i32;
                    leaf_to_tree[leaf_id] = roots.len() as i32;
                    next_leaf += 1;
                    leaf_id
                } else {
                    if child >= num_nodes {
                        return Err(malformed(format!("child id {child} out of range")));
                    }
                    child
                };

                let child_node = nodes[child_slot].take().ok_or_else(|| {
                    malformed(format!("child node {child} is not available here"))
                })?;

                if nodes[parent].is_none() {
                    nodes[parent] = Some(RangeRhoTree::new(0, 0, config.schedule.clone()));
                }
                nodes[parent]
                    .as_mut()
                    .ok_or_else(|| malformed(format!("parent node {parent} unavailable")))?
                    .add_child(child_node)
                    .map_err(|e| at_line(e, line_no))?;
                last_parent = Some(parent);
            }

            if let Some(parent) = last_parent {
                let root = nodes[parent]
                    .take()
                    .ok_or_else(|| malformed(format!("root node {parent} unavailable")))?;
                let expected_left = roots.last().map_or(0, |t: &RangeRhoTree| t.right() + 1);
                if root.left() != expected_left {
                    return Err(malformed(format!(
                        "root tree starting at leaf {} is not adjacent to leaf {}",
                        root.left(),
                        expected_left
                    )));
                }
                roots.push(root);
            }
        }

        // Targets never referenced by any edge become singleton trees.
        for t in 0..num_leaves {
            if target_to_leaf[t] == -1 {
                let leaf_id = next_leaf;
                target_to_leaf[t] = leaf_id as i32;
                leaf_to_tree[leaf_id] = roots.len() as i32;
                roots.push(RangeRhoTree::new(leaf_id, leaf_id, config.schedule.clone()));
                next_leaf += 1;
            }
        }

        if next_leaf != num_leaves {
            return Err(Error::LeafCountMismatch {
                declared: num_leaves,
                assigned: next_leaf,
            });
        }
        if let Some(orphan) = nodes.iter().position(Option::is_some) {
            return Err(Error::MalformedHierarchy {
                line: 0,
                message: format!("node {orphan} was built but never attached to a root tree"),
            });
        }

        let root_rhos = LogMassVector::log_zero(roots.len());
        let tree_counts = vec![0u64; roots.len()];
        for root in &mut roots {
            root.init_accumulators();
        }
        debug!(num_trees = roots.len(), "hierarchy loaded");

        Ok(Self {
            roots,
            root_rhos,
            mass: config.schedule,
            target_to_leaf,
            leaf_to_tree,
            tree_counts,
        })
    }

    /// Seed every tree's per-child accumulators from initial log
    /// abundances, one per leaf.
    ///
    /// Must be called before processing fragments; every value must be a
    /// finite log probability (the log-zero sentinel is rejected).
    pub fn set_alphas(&mut self, log_alphas: &[f64]) -> Result<()> {
        if log_alphas.len() != self.num_leaves() {
            return Err(Error::DimensionMismatch {
                expected: self.num_leaves(),
                found: log_alphas.len(),
            });
        }
        let mut data = SapData::new(log_alphas.len());
        for (leaf, &alpha) in log_alphas.iter().enumerate() {
            if is_log_zero(alpha) || alpha.is_nan() {
                return Err(Error::NonPositiveAlpha { leaf });
            }
            data.set_seed(leaf, leaf, alpha);
        }

        self.root_rhos = LogMassVector::log_zero(self.roots.len());
        let mut sap = data.sap();
        for (i, root) in self.roots.iter_mut().enumerate() {
            let branch_sap = sap.branch(root.right());
            if !branch_sap.is_empty() {
                let frac = branch_sap.fraction();
                root.set_rhos(branch_sap);
                self.root_rhos.increment(i, frac);
            }
            if sap.is_empty() {
                break;
            }
        }
        Ok(())
    }

    /// Run one observation through the E-step/M-step cycle.
    ///
    /// Reads each hit's const log-likelihood from its `log_prob` field
    /// and overwrites it with the posterior log-assignment. Hits must be
    /// pre-sorted strictly ascending by compact leaf id and must all
    /// belong to one root tree.
    pub fn process_fragment(&mut self, frag: &mut Fragment) -> Result<()> {
        let n = frag.num_hits();
        if n == 0 {
            return Err(Error::DegenerateFragment {
                fragment: frag.name().into(),
                message: "fragment has no hits",
            });
        }

        // Unique mappings skip the descent machinery entirely.
        if n == 1 {
            let leaf = self.leaf_for_target(frag.hit(0).target, frag.name())?;
            let tree = self.leaf_to_tree[leaf] as usize;
            let mut data = SapData::new(1);
            data.set_hit(0, leaf, LOG_0);
            data.set_assignment(0, LOG_1);
            data.set_tree_root(tree);

            let mass = self.mass.next_mass();
            self.root_rhos.increment(tree, mass);
            self.roots[tree].update_rhos(data.sap());
            frag.hit_mut(0).log_prob = LOG_1;
            self.tree_counts[tree] += 1;
            return Ok(());
        }

        let mut data = SapData::new(n);
        let mut tree = 0usize;
        let mut prev_leaf = None;
        for i in 0..n {
            let hit = *frag.hit(i);
            let leaf = self.leaf_for_target(hit.target, frag.name())?;
            if prev_leaf.is_some_and(|p| leaf <= p) {
                return Err(Error::DegenerateFragment {
                    fragment: frag.name().into(),
                    message: "hits are not sorted ascending by leaf id",
                });
            }
            prev_leaf = Some(leaf);
            data.set_hit(i, leaf, hit.log_prob);

            let t = self.leaf_to_tree[leaf] as usize;
            if i == 0 {
                tree = t;
                data.set_tree_root(t);
            } else if t != tree {
                return Err(Error::CrossTreeFragment {
                    fragment: frag.name().into(),
                });
            }
        }

        // E-step: current per-leaf log abundance, rooted at this tree's
        // accumulated mass.
        self.roots[tree].get_rhos(data.sap(), self.root_rhos.get(tree));

        let mut total_likelihood = LOG_0;
        for i in 0..n {
            total_likelihood = log_add(total_likelihood, data.const_likelihood(i) + data.rho(i));
        }
        if is_log_zero(total_likelihood) || total_likelihood.is_nan() {
            return Err(Error::DegenerateFragment {
                fragment: frag.name().into(),
                message: "total likelihood is zero (was the forest seeded?)",
            });
        }

        // Posterior responsibilities, written back and accumulated for
        // the M-step's range-fraction queries.
        for i in 0..n {
            let frac = data.const_likelihood(i) + data.rho(i) - total_likelihood;
            frag.hit_mut(i).log_prob = frac;
            data.set_assignment(i, frac);
        }
        debug_assert!((data.sap().fraction() - LOG_1).abs() < 1e-6);

        // M-step.
        let mass = self.mass.next_mass();
        self.root_rhos.increment(tree, mass);
        self.roots[tree].update_rhos(data.sap());
        self.tree_counts[tree] += 1;
        Ok(())
    }

    /// Number of leaves (equivalently, targets) in the forest.
    pub fn num_leaves(&self) -> usize {
        self.target_to_leaf.len()
    }

    /// Number of root trees.
    pub fn num_trees(&self) -> usize {
        self.roots.len()
    }

    /// Observations processed per root tree.
    pub fn tree_counts(&self) -> &[u64] {
        &self.tree_counts
    }

    /// Compact leaf id assigned to a raw target id.
    pub fn target_to_leaf(&self, target: usize) -> Option<usize> {
        let mapped = *self.target_to_leaf.get(target)?;
        (mapped >= 0).then_some(mapped as usize)
    }

    /// Root-tree index containing a compact leaf id.
    pub fn leaf_to_tree(&self, leaf: usize) -> Option<usize> {
        let mapped = *self.leaf_to_tree.get(leaf)?;
        (mapped >= 0).then_some(mapped as usize)
    }

    /// The root trees, ascending by leaf interval.
    pub fn roots(&self) -> &[RangeRhoTree] {
        &self.roots
    }

    /// Accumulated log-mass of root tree `i`.
    pub fn root_log_mass(&self, i: usize) -> f64 {
        self.root_rhos.get(i)
    }

    /// Accumulated log-mass per leaf: each root's mass plus the sum of
    /// per-child masses along the leaf's path.
    pub fn leaf_log_masses(&self) -> Vec<f64> {
        fn collect(node: &RangeRhoTree, acc: f64, out: &mut [f64]) {
            if node.is_leaf() {
                out[node.left()] = acc;
                return;
            }
            for (i, child) in node.children().iter().enumerate() {
                collect(child, acc + node.child_log_mass(i), out);
            }
        }
        let mut out = vec![LOG_0; self.num_leaves()];
        for (i, root) in self.roots.iter().enumerate() {
            collect(root, self.root_rhos.get(i), &mut out);
        }
        out
    }

    fn leaf_for_target(&self, target: usize, frag_name: &str) -> Result<usize> {
        let mapped = self.target_to_leaf.get(target).copied().unwrap_or(-1);
        if mapped < 0 {
            return Err(Error::DegenerateFragment {
                fragment: frag_name.into(),
                message: "hit references an unknown target",
            });
        }
        Ok(mapped as usize)
    }
}

fn parse_pair(s: &str, line: usize) -> Result<(usize, usize)> {
    let malformed = || Error::MalformedHierarchy {
        line,
        message: format!("expected '<id>,<id>', got '{s}'"),
    };
    let (a, b) = s.split_once(',').ok_or_else(malformed)?;
    let a = a.trim().parse().map_err(|_| malformed())?;
    let b = b.trim().parse().map_err(|_| malformed())?;
    Ok((a, b))
}

fn at_line(err: Error, line: usize) -> Error {
    match err {
        Error::MalformedHierarchy { message, .. } => Error::MalformedHierarchy { line, message },
        other => other,
    }
}
