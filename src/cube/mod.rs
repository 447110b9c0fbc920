pub mod heuristic;
pub mod project;

use self::project::{is_fixed, CalibrationProjector};
use crate::calibration::CalibrationSystem;
use crate::config::Algorithm;
use crate::context::SearchContext;
use crate::error::CalResult;
use crate::instance::Instance;
use crate::milp::model::ModelLayout;
use crate::milp::MilpSolver;
use std::f64::consts::PI;
use std::sync::Arc;
use strum_macros::Display;
use tracing::debug;

/// |u_i| above this takes part in the step-length computation.
pub const MOVE_TOLERANCE: f64 = 1e-6;
/// A projected direction with every |u_i| at or below this is terminal.
pub const EXHAUSTED_TOLERANCE: f64 = 1e-5;
/// Seed values this close to 0 or 1 fix the matching indicator.
pub const SEED_FIX_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FlightStop {
    /// No feasible direction is left.
    Exhausted,
    /// The early-stop budget was used up.
    EarlyStop,
    /// Safety cap on the number of steps.
    StepCap,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlightOutcome {
    pub point: Vec<f64>,
    pub iterations: usize,
    pub stop: FlightStop,
}

impl FlightOutcome {
    pub fn fixed_count(&self) -> usize {
        self.point.iter().filter(|&&s| is_fixed(s)).count()
    }

    pub fn is_integral(&self) -> bool {
        self.fixed_count() == self.point.len()
    }
}

/// Draws a direction uniformly on the unit sphere by sequential angles.
pub fn sphere_direction(rng: &mut fastrand::Rng, out: &mut [f64]) {
    if out.is_empty() {
        return;
    }
    let mut cos_seq = 1.0;
    for i in (1..out.len()).rev() {
        let alpha = PI * (rng.f64() - 0.5);
        out[i] = cos_seq * alpha.sin();
        cos_seq *= alpha.cos();
    }
    out[0] = if rng.bool() { cos_seq } else { -cos_seq };
}

/// Starting point of a flight for the configured algorithm.
pub fn initial_point(instance: &Instance, rng: &mut fastrand::Rng) -> Vec<f64> {
    let big_n = instance.population;
    let n = instance.sample_size;
    match instance.settings.algorithm {
        Algorithm::Random => match &instance.initial {
            Some(init) => init.clone(),
            None => random_sample(big_n, n, rng),
        },
        Algorithm::Cube | Algorithm::Global => vec![instance.inclusion_probability(); big_n],
    }
}

/// Random 0/1 vector of length `big_n` with exactly `n` ones. Flips the
/// minority value so the expected number of draws stays small.
pub fn random_sample(big_n: usize, n: usize, rng: &mut fastrand::Rng) -> Vec<f64> {
    let majority_is_one = n > big_n / 2;
    let (fill, flips) = if majority_is_one {
        (1.0, big_n - n)
    } else {
        (0.0, n)
    };
    let mut s = vec![fill; big_n];
    let mut placed = 0;
    while placed < flips {
        let pos = rng.usize(..big_n);
        if s[pos] == fill {
            s[pos] = 1.0 - fill;
            placed += 1;
        }
    }
    s
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fixing {
    Zero,
    One,
}

/// Indicators whose seed value is already (almost) 0 or 1.
pub fn seed_fixings(seed: &[f64]) -> Vec<(usize, Fixing)> {
    seed.iter()
        .enumerate()
        .filter_map(|(i, &s)| {
            if s < SEED_FIX_TOLERANCE {
                Some((i, Fixing::Zero))
            } else if s > 1.0 - SEED_FIX_TOLERANCE {
                Some((i, Fixing::One))
            } else {
                None
            }
        })
        .collect()
}

/// Sets ub = 0 or lb = 1 on the indicator column of each fixed unit.
pub fn apply_fixings<S: MilpSolver + ?Sized>(
    solver: &mut S,
    layout: &ModelLayout,
    fixings: &[(usize, Fixing)],
) {
    for &(unit, fixing) in fixings {
        let col = layout.s(unit);
        let (lb, ub) = solver.column_bounds(col);
        match fixing {
            Fixing::Zero => solver.set_column_bounds(col, lb, 0.0),
            Fixing::One => solver.set_column_bounds(col, 1.0, ub),
        }
    }
}

/// The flight phase of the Cube method: random walk inside the
/// calibration subspace until the point reaches a vertex (or the budget
/// runs out).
pub struct FlightHeuristic {
    projector: CalibrationProjector,
    early_stop: Option<f64>,
    n_calibration: usize,
}

impl FlightHeuristic {
    pub fn new(system: Arc<CalibrationSystem>, early_stop: Option<f64>) -> CalResult<Self> {
        let n_calibration = system.n_rows() - 1;
        Ok(Self {
            projector: CalibrationProjector::new(system)?,
            early_stop: early_stop.filter(|f| *f >= 0.0),
            n_calibration,
        })
    }

    pub fn for_instance(instance: &Instance, system: Arc<CalibrationSystem>) -> CalResult<Self> {
        Self::new(system, instance.settings.early_stop)
    }

    fn budget(&self, n: usize) -> Option<f64> {
        self.early_stop
            .map(|f| f * n.saturating_sub(self.n_calibration) as f64)
    }

    pub fn run(
        &mut self,
        start: Vec<f64>,
        rng: &mut fastrand::Rng,
        ctx: &SearchContext,
    ) -> FlightOutcome {
        let n = start.len();
        let mut s = start;
        let mut v = vec![0.0; n];
        let mut u = vec![0.0; n];
        let budget = self.budget(n);
        let cap = 2 * n + 2;
        let mut iterations = 0;

        let stop = loop {
            if ctx.is_cancelled() {
                break FlightStop::Cancelled;
            }
            if iterations >= cap {
                break FlightStop::StepCap;
            }

            sphere_direction(rng, &mut v);
            self.projector.project_into(&v, &s, &mut u);

            if u.iter().all(|x| x.abs() <= EXHAUSTED_TOLERANCE) {
                break FlightStop::Exhausted;
            }
            if let Some(b) = budget {
                if iterations as f64 >= b {
                    break FlightStop::EarlyStop;
                }
            }

            let Some((plus, minus)) = step_lengths(&s, &u) else {
                break FlightStop::Exhausted;
            };

            if rng.f64() < minus / (minus + plus) {
                for (si, ui) in s.iter_mut().zip(&u) {
                    *si = (*si + plus * ui).clamp(0.0, 1.0);
                }
            } else {
                for (si, ui) in s.iter_mut().zip(&u) {
                    *si = (*si - minus * ui).clamp(0.0, 1.0);
                }
            }
            iterations += 1;
        };

        let outcome = FlightOutcome {
            point: s,
            iterations,
            stop,
        };
        debug!(
            "Flight stopped ({}) after {} steps, {}/{} coordinates fixed",
            outcome.stop,
            outcome.iterations,
            outcome.fixed_count(),
            n
        );
        outcome
    }
}

/// Largest steps along +u and -u that keep s inside [0,1]^N.
fn step_lengths(s: &[f64], u: &[f64]) -> Option<(f64, f64)> {
    let mut plus = f64::INFINITY;
    let mut minus = f64::INFINITY;
    for (&si, &ui) in s.iter().zip(u) {
        if ui.abs() <= MOVE_TOLERANCE {
            continue;
        }
        let (p, m) = if ui > 0.0 {
            ((1.0 - si) / ui, si / ui)
        } else {
            (-si / ui, (si - 1.0) / ui)
        };
        plus = plus.min(p);
        minus = minus.min(m);
    }
    (plus.is_finite() && minus.is_finite() && plus + minus > 0.0).then_some((plus, minus))
}
