use super::{apply_fixings, initial_point, seed_fixings, FlightHeuristic};
use crate::context::SearchContext;
use crate::error::CalResult;
use crate::instance::Instance;
use crate::milp::factory::CalibrationSolverFactory;
use crate::milp::{Heuristic, MilpSolver, NodeView, SolverFactory};
use std::sync::Arc;
use tracing::{debug, warn};

/// Node budget of the sub-solve when the parent has none.
pub const SUB_SOLVE_NODE_LIMIT: u64 = 500;

/// Root heuristic: runs a Cube flight, fixes the indicators it settled
/// and hands the restricted problem to a fresh solver without heuristics.
pub struct CubeHeuristic {
    factory: CalibrationSolverFactory,
    instance: Arc<Instance>,
    flight: FlightHeuristic,
    rng: fastrand::Rng,
}

impl CubeHeuristic {
    /// `factory` must not register heuristics itself.
    pub fn new(factory: CalibrationSolverFactory, seed: u64) -> CalResult<Self> {
        let instance = factory.instance().clone();
        let flight = FlightHeuristic::for_instance(&instance, factory.system().clone())?;
        Ok(Self {
            factory,
            instance,
            flight,
            rng: fastrand::Rng::with_seed(seed),
        })
    }
}

impl Heuristic for CubeHeuristic {
    fn name(&self) -> &str {
        "cube"
    }

    fn propose(&mut self, node: &NodeView, ctx: &SearchContext) -> Option<Vec<f64>> {
        if ctx.is_cancelled() {
            return None;
        }

        let start = initial_point(&self.instance, &mut self.rng);
        let outcome = self.flight.run(start, &mut self.rng, ctx);
        let fixings = seed_fixings(&outcome.point);

        let mut solver = match self.factory.build(self.rng.u64(..)) {
            Ok(s) => s,
            Err(e) => {
                warn!("Cube heuristic could not build a solver: {}", e);
                return None;
            }
        };
        apply_fixings(&mut solver, &self.factory.layout(), &fixings);
        if node.time_left.is_some() {
            solver.set_time_limit(node.time_left);
        }

        if let Err(e) = solver.solve(ctx) {
            warn!("Cube heuristic sub-solve failed: {}", e);
            return None;
        }
        debug!(
            "Cube heuristic: {} of {} indicators fixed, objective {}",
            fixings.len(),
            self.instance.population,
            solver.best_objective()
        );
        solver.best_solution().map(<[f64]>::to_vec)
    }
}
