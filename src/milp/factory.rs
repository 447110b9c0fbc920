use super::engine::{BranchAndCut, EngineSettings};
use super::model::{build_calibration_model, MilpModel, ModelLayout};
use super::{MilpSolver, SolverFactory};
use crate::calibration::CalibrationSystem;
use crate::cube::heuristic::{CubeHeuristic, SUB_SOLVE_NODE_LIMIT};
use crate::cuts::{BoundTighteningCutGenerator, ConicOuterApproxCutGenerator};
use crate::error::CalResult;
use crate::instance::Instance;
use std::sync::Arc;

/// Builds branch-and-cut engines over one immutable calibration model,
/// with the conic and bound-tightening generators and, optionally, the
/// Cube heuristic registered.
#[derive(Clone)]
pub struct CalibrationSolverFactory {
    instance: Arc<Instance>,
    system: Arc<CalibrationSystem>,
    model: Arc<MilpModel>,
    layout: ModelLayout,
    settings: EngineSettings,
    cube_heuristic: bool,
}

impl CalibrationSolverFactory {
    pub fn new(instance: Arc<Instance>, system: Arc<CalibrationSystem>) -> CalResult<Self> {
        let model = Arc::new(build_calibration_model(&instance, &system)?);
        let settings = EngineSettings {
            node_limit: instance.settings.node_limit,
            time_limit: None,
            iteration_limit: instance.settings.lp_iterations,
            gap: instance.settings.effective_epsilon(),
        };
        Ok(Self {
            layout: ModelLayout::new(instance.population),
            cube_heuristic: !instance.settings.no_cube_heuristic,
            instance,
            system,
            model,
            settings,
        })
    }

    /// Copy used inside the Cube heuristic: no heuristics of its own and a
    /// bounded node count.
    pub fn for_sub_solve(&self, node_limit: Option<u64>) -> Self {
        let limit = node_limit
            .unwrap_or(SUB_SOLVE_NODE_LIMIT)
            .min(SUB_SOLVE_NODE_LIMIT);
        let mut sub = self.clone();
        sub.cube_heuristic = false;
        sub.settings.node_limit = Some(limit);
        sub
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn system(&self) -> &Arc<CalibrationSystem> {
        &self.system
    }

    pub fn model(&self) -> &Arc<MilpModel> {
        &self.model
    }

    pub fn layout(&self) -> ModelLayout {
        self.layout
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}

impl SolverFactory for CalibrationSolverFactory {
    type Solver = BranchAndCut;

    fn build(&self, seed: u64) -> CalResult<BranchAndCut> {
        let mut engine = BranchAndCut::new(self.settings.clone());
        engine.load_problem(self.model.clone());
        engine.register_cut_generator(
            Box::new(ConicOuterApproxCutGenerator::new(self.layout)),
            1,
        );
        engine.register_cut_generator(
            Box::new(BoundTighteningCutGenerator::new(self.layout)),
            1,
        );
        if self.cube_heuristic {
            let sub = self.for_sub_solve(self.settings.node_limit);
            engine.register_heuristic(Box::new(CubeHeuristic::new(sub, seed)?));
        }
        Ok(engine)
    }
}
