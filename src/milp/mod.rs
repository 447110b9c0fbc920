pub mod engine;
pub mod factory;
pub mod lp;
pub mod model;

use crate::context::SearchContext;
use crate::cuts::CutGenerator;
use crate::error::CalResult;
use std::sync::Arc;
use std::time::Duration;
use strum_macros::Display;

pub use engine::{BranchAndCut, EngineSettings, EngineStats};
pub use factory::CalibrationSolverFactory;
pub use model::{build_calibration_model, MilpModel, ModelLayout};

/// Objective reported when a run found nothing.
pub const NO_SOLUTION: f64 = 1e20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SolveStatus {
    /// The tree was exhausted.
    Optimal,
    /// The tree was exhausted without finding an incumbent.
    Infeasible,
    NodeLimit,
    IterationLimit,
    TimeLimit,
    Interrupted,
}

impl SolveStatus {
    pub fn is_limit(self) -> bool {
        matches!(
            self,
            SolveStatus::NodeLimit | SolveStatus::IterationLimit | SolveStatus::TimeLimit
        )
    }
}

/// What a cut generator or heuristic sees of the current node.
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    /// LP solution of the node relaxation.
    pub solution: &'a [f64],
    pub lower: &'a [f64],
    pub upper: &'a [f64],
    /// Objective of the incumbent, `f64::INFINITY` when there is none.
    pub cutoff: f64,
    pub depth: usize,
    pub time_left: Option<Duration>,
}

/// A primal heuristic called by the solver at the root node.
pub trait Heuristic: Send {
    fn name(&self) -> &str;

    /// A full column vector of the model, or `None`. The solver checks
    /// feasibility before accepting it.
    fn propose(&mut self, node: &NodeView, ctx: &SearchContext) -> Option<Vec<f64>>;
}

/// The mixed-integer solver surface the search controller drives.
pub trait MilpSolver {
    fn load_problem(&mut self, model: Arc<MilpModel>);
    fn model(&self) -> Option<&MilpModel>;
    fn register_cut_generator(&mut self, generator: Box<dyn CutGenerator>, priority: i32);
    fn register_heuristic(&mut self, heuristic: Box<dyn Heuristic>);
    fn set_node_limit(&mut self, limit: Option<u64>);
    fn set_time_limit(&mut self, limit: Option<Duration>);
    fn set_iteration_limit(&mut self, limit: Option<u64>);
    fn column_bounds(&self, column: usize) -> (f64, f64);
    fn set_column_bounds(&mut self, column: usize, lower: f64, upper: f64);
    fn solve(&mut self, ctx: &SearchContext) -> CalResult<SolveStatus>;
    /// `NO_SOLUTION` when nothing was found.
    fn best_objective(&self) -> f64;
    fn best_solution(&self) -> Option<&[f64]>;
}

/// Builds a fresh, fully configured solver for one round.
pub trait SolverFactory: Send + Sync {
    type Solver: MilpSolver;

    fn build(&self, seed: u64) -> CalResult<Self::Solver>;
}
