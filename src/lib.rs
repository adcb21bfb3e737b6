//! # canopy
//!
//! Streaming hierarchical abundance estimation: an online EM variant that
//! redistributes each observation's probability mass over the leaves of a
//! target hierarchy, entirely in log space.
//!
//! # The Model
//!
//! Leaves of a forest of trees are discrete target entities. Each
//! incoming observation ("fragment") is compatible with a subset of
//! leaves, each compatibility carrying a precomputed log-likelihood. The
//! forest maintains a running estimate of every leaf's relative abundance
//! ("rho") and uses it to assign each observation fractionally:
//!
//! ```text
//! E-step:  posteriorᵢ = likᵢ + rhoᵢ − log Σⱼ exp(likⱼ + rhoⱼ)
//! M-step:  each touched node's per-child mass grows by the update
//!          weight plus the child range's posterior fraction
//! ```
//!
//! Estimates are order-dependent (online, not a batch fixed point):
//! replaying the same observation sequence reproduces identical state.
//!
//! # Why Contiguous Ranges
//!
//! Every node covers a contiguous interval of compact leaf ids, so a
//! descent splits an observation's sorted hit range by binary search at
//! each child boundary ([`sap::Sap::branch`]) instead of walking leaves
//! one by one.
//!
//! # Example
//!
//! ```rust
//! use canopy::{ForestConfig, Fragment, Hit, RangeRhoForest};
//! use std::io::Cursor;
//!
//! // Two targets grouped under one internal node.
//! let spec = "2,3\n2,0;2,1\n";
//! let mut forest =
//!     RangeRhoForest::from_reader(Cursor::new(spec), ForestConfig::new()).unwrap();
//! forest.set_alphas(&[0.5f64.ln(), 0.5f64.ln()]).unwrap();
//!
//! let mut frag = Fragment::new(
//!     "read_0",
//!     vec![
//!         Hit { target: 0, log_prob: 0.7f64.ln() },
//!         Hit { target: 1, log_prob: 0.3f64.ln() },
//!     ],
//! );
//! forest.process_fragment(&mut frag).unwrap();
//! let total: f64 = frag.hits().iter().map(|h| h.log_prob.exp()).sum();
//! assert!((total - 1.0).abs() < 1e-9);
//! ```

pub mod accum;
/// Error types used across `canopy`.
pub mod error;
pub mod forest;
pub mod fragment;
pub mod logspace;
pub mod mass;
pub mod sap;
pub mod tree;


pub use accum::LogMassVector;
pub use error::{Error, Result};
pub use forest::{ForestConfig, RangeRhoForest};
pub use fragment::{Fragment, Hit};
pub use logspace::{log_add, log_sub, log_sum_exp, LOG_0, LOG_1};
pub use mass::MassSchedule;
pub use sap::{Sap, SapData};
pub use tree::RangeRhoTree;
