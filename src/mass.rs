//! Online update-weight schedules.
//!
//! A streaming EM estimate weighs each incoming observation against the
//! mass accumulated so far. Rather than renormalizing the accumulators on
//! every step, the schedule hands out *growing unnormalized* log masses:
//! the n-th observation's mass relative to the running total equals the
//! desired normalized step size, and the accumulators only ever add.
//!
//! The production schedule is the stochastic-approximation decay
//! `γ_n = n^(-ff)` with forgetting factor `ff ∈ (0.5, 1]`. At `ff = 1`
//! every unnormalized mass is equal (harmonic weights, plain running
//! average); smaller factors keep later observations relatively heavier,
//! tracking drift at the cost of variance. A constant-step variant exists
//! so tests and batch-like runs can swap the decay out.

use crate::error::{Error, Result};
use crate::logspace::{log_add, LOG_1};

/// Decay curve of an update-weight schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Decay {
    /// Normalized step size `n^(-ff)`.
    Forget(f64),
    /// Fixed normalized step size `γ`.
    Constant(f64),
}

/// Per-node state of the online update-weight scheme.
///
/// Each tree node (and the forest root level) owns one schedule; its
/// counter advances every time the node absorbs an observation.
#[derive(Debug, Clone, PartialEq)]
pub struct MassSchedule {
    decay: Decay,
    /// Observations absorbed so far.
    n: u64,
    /// Log of the total unnormalized mass handed out so far.
    log_total: f64,
}

impl Default for MassSchedule {
    /// Forgetting-factor schedule at the conventional 0.85 default.
    fn default() -> Self {
        Self {
            decay: Decay::Forget(0.85),
            n: 0,
            log_total: LOG_1,
        }
    }
}

impl MassSchedule {
    /// Forgetting-factor schedule with normalized step size `n^(-ff)`.
    ///
    /// Requires `0.5 < ff <= 1.0`, the range in which stochastic
    /// approximation converges.
    pub fn forgetting(ff: f64) -> Result<Self> {
        if !(ff > 0.5 && ff <= 1.0) {
            return Err(Error::InvalidParameter {
                name: "forgetting_factor",
                message: "must be in (0.5, 1.0]",
            });
        }
        Ok(Self {
            decay: Decay::Forget(ff),
            n: 0,
            log_total: LOG_1,
        })
    }

    /// Constant schedule with fixed normalized step size `gamma`.
    pub fn constant(gamma: f64) -> Result<Self> {
        if !(gamma > 0.0 && gamma < 1.0) {
            return Err(Error::InvalidParameter {
                name: "gamma",
                message: "must be in (0.0, 1.0)",
            });
        }
        Ok(Self {
            decay: Decay::Constant(gamma),
            n: 0,
            log_total: LOG_1,
        })
    }

    /// Log-space unnormalized weight of the next observation; advances
    /// the counter.
    ///
    /// The first observation always receives `LOG_1` and fully defines
    /// the running total; thereafter the weight is derived so that
    /// `exp(mass_n) / total_n` equals the schedule's normalized step.
    pub fn next_mass(&mut self) -> f64 {
        self.n += 1;
        if self.n == 1 {
            self.log_total = LOG_1;
            return LOG_1;
        }
        let mass = match self.decay {
            // exp(mass) = total / (n^ff - 1)  <=>  mass/total_n = n^-ff
            Decay::Forget(ff) => self.log_total - ((self.n as f64).powf(ff) - 1.0).ln(),
            // exp(mass) = total * γ / (1 - γ)
            Decay::Constant(gamma) => self.log_total + (gamma / (1.0 - gamma)).ln(),
        };
        debug_assert!(mass.is_finite(), "update weight went non-finite at n={}", self.n);
        self.log_total = log_add(self.log_total, mass);
        mass
    }

    /// Observations absorbed so far.
    pub fn count(&self) -> u64 {
        self.n
    }
}
