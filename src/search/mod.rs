pub mod refix;

use crate::calibration::CalibrationSystem;
use crate::config::Algorithm;
use crate::context::SearchContext;
use crate::cube::{apply_fixings, initial_point, seed_fixings, FlightHeuristic, Fixing};
use crate::error::CalResult;
use crate::instance::Instance;
use crate::milp::model::ModelLayout;
use crate::milp::{MilpSolver, SolveStatus, SolverFactory, NO_SOLUTION};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strum_macros::Display;
use tracing::{debug, info, warn};

pub use refix::RefixSchedule;

/// Selection indicators above this count as picked.
pub const SELECTED_THRESHOLD: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SearchState {
    Init,
    Solve,
    Evaluate,
    Refix,
    Done,
}

/// Best column vector of a replication and its objective ‖δ‖.
#[derive(Debug, Clone, PartialEq)]
pub struct BestSolution {
    pub objective: f64,
    pub columns: Vec<f64>,
    pub round: usize,
}

impl BestSolution {
    pub fn objective_squared(&self) -> f64 {
        self.objective * self.objective
    }

    pub fn selected(&self, layout: &ModelLayout) -> Vec<bool> {
        layout
            .selection(&self.columns)
            .iter()
            .map(|s| s.abs() > SELECTED_THRESHOLD)
            .collect()
    }

    pub fn sample_size(&self, layout: &ModelLayout) -> usize {
        self.selected(layout).iter().filter(|&&b| b).count()
    }

    /// Final weights: w0 + δ_i for picked units, 0 for the others.
    pub fn weights(&self, instance: &Instance) -> Vec<f64> {
        let layout = ModelLayout::new(instance.population);
        let w0 = instance.base_weight();
        self.selected(&layout)
            .into_iter()
            .zip(layout.deltas(&self.columns))
            .map(|(picked, d)| if picked { w0 + d } else { 0.0 })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundRecord {
    pub round: usize,
    pub status: SolveStatus,
    /// `NO_SOLUTION` when the round found nothing.
    pub objective: f64,
    pub fixed: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplicationResult {
    pub replication: usize,
    pub best: Option<BestSolution>,
    pub rounds: Vec<RoundRecord>,
    /// Flight output the first round was seeded with (absent in GLOBAL).
    pub first_seed: Option<Vec<f64>>,
    pub interrupted: bool,
}

impl ReplicationResult {
    pub fn objective_squared(&self) -> Option<f64> {
        self.best.as_ref().map(BestSolution::objective_squared)
    }
}

/// Drives one replication through Init → Solve → Evaluate → Refix → …
/// → Done, one fresh solver per round.
pub struct SearchController<F: SolverFactory> {
    instance: Arc<Instance>,
    factory: F,
    layout: ModelLayout,
    flight: FlightHeuristic,
    refix: RefixSchedule,
    rng: fastrand::Rng,
}

impl<F: SolverFactory> SearchController<F> {
    pub fn new(
        instance: Arc<Instance>,
        system: Arc<CalibrationSystem>,
        factory: F,
        seed: u64,
    ) -> CalResult<Self> {
        let flight = FlightHeuristic::for_instance(&instance, system)?;
        let refining = instance.settings.algorithm == Algorithm::Random && instance.initial.is_some();
        Ok(Self {
            layout: ModelLayout::new(instance.population),
            refix: RefixSchedule::new(instance.population, instance.sample_size, refining),
            rng: fastrand::Rng::with_seed(seed),
            instance,
            factory,
            flight,
        })
    }

    pub fn layout(&self) -> ModelLayout {
        self.layout
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// min(per-round limit, remaining total time split over the
    /// replications still to run).
    fn round_time_limit(&self, replication: usize, ctx: &SearchContext) -> Option<Duration> {
        let settings = &self.instance.settings;
        let left = settings.replications.saturating_sub(replication).max(1) as f64;
        let share = settings
            .total_time_budget()
            .map(|t| t.saturating_sub(ctx.elapsed()).div_f64(left));
        match (settings.round_time_budget(), share) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn run_replication(
        &mut self,
        replication: usize,
        ctx: &SearchContext,
    ) -> CalResult<ReplicationResult> {
        let settings = &self.instance.settings;
        let budget = settings.round_budget();
        let epsilon = settings.effective_epsilon();
        let global = settings.algorithm == Algorithm::Global;

        let mut state = SearchState::Init;
        let mut round = 0;
        let mut fixings: Vec<(usize, Fixing)> = Vec::new();
        let mut seed: Option<Vec<f64>> = None;
        let mut first_seed: Option<Vec<f64>> = None;
        let mut best: Option<BestSolution> = None;
        let mut rounds = Vec::new();

        info!("-------------- Replication {}", replication + 1);
        loop {
            debug!("Replication {} round {}: {}", replication + 1, round, state);
            state = match state {
                SearchState::Init => {
                    if !global {
                        let start = initial_point(&self.instance, &mut self.rng);
                        let outcome = self.flight.run(start, &mut self.rng, ctx);
                        fixings = seed_fixings(&outcome.point);
                        seed = Some(outcome.point.clone());
                        first_seed = Some(outcome.point);
                    }
                    SearchState::Solve
                }
                SearchState::Solve => {
                    let started = Instant::now();
                    let mut solver = self.factory.build(self.rng.u64(..))?;
                    for i in 0..self.layout.units {
                        solver.set_column_bounds(self.layout.s(i), 0.0, 1.0);
                    }
                    apply_fixings(&mut solver, &self.layout, &fixings);
                    solver.set_time_limit(self.round_time_limit(replication, ctx));

                    let status = solver.solve(ctx)?;
                    round += 1;
                    let objective = solver.best_objective();
                    info!(
                        "BB iteration {} done ({:.2}s, {})",
                        round,
                        ctx.elapsed().as_secs_f64(),
                        status
                    );
                    if status.is_limit() {
                        debug!("Round {} hit a solver limit", round);
                    }
                    if objective < NO_SOLUTION {
                        info!("Best solution: value {:.4}", objective * objective);
                    } else {
                        info!("No solution found");
                    }

                    if let Some(sol) = solver.best_solution() {
                        if best.as_ref().map_or(true, |b| objective < b.objective) {
                            best = Some(BestSolution {
                                objective,
                                columns: sol.to_vec(),
                                round,
                            });
                        }
                        seed = Some(self.layout.selection(sol).to_vec());
                    }

                    rounds.push(RoundRecord {
                        round,
                        status,
                        objective,
                        fixed: fixings.len(),
                        elapsed: started.elapsed(),
                    });
                    SearchState::Evaluate
                }
                SearchState::Evaluate => {
                    let converged = best
                        .as_ref()
                        .is_some_and(|b| b.objective_squared() <= epsilon);
                    if ctx.is_cancelled() || round >= budget || converged {
                        SearchState::Done
                    } else {
                        SearchState::Refix
                    }
                }
                SearchState::Refix => {
                    fixings = match &seed {
                        Some(s) => self.refix.fixings(s, round, &mut self.rng),
                        None => Vec::new(),
                    };
                    SearchState::Solve
                }
                SearchState::Done => break,
            };
        }

        if best.is_none() {
            warn!("⚠️  No solution found at replication {}", replication + 1);
        }
        Ok(ReplicationResult {
            replication,
            best,
            rounds,
            first_seed,
            interrupted: ctx.is_cancelled(),
        })
    }

    /// Runs every replication, handing each result to `on_result` as soon
    /// as it is known. Stops early on cancellation.
    pub fn run<C>(&mut self, ctx: &SearchContext, mut on_result: C) -> CalResult<Vec<ReplicationResult>>
    where
        C: FnMut(&ReplicationResult) -> CalResult<()>,
    {
        let mut results = Vec::new();
        for replication in 0..self.instance.settings.replications {
            if ctx.is_cancelled() {
                warn!("Interrupted, skipping the remaining replications");
                break;
            }
            let result = self.run_replication(replication, ctx)?;
            on_result(&result)?;
            results.push(result);
        }
        Ok(results)
    }
}
