use super::lp::{solve_relaxation, LpOutcome};
use super::model::{LinearRow, MilpModel};
use super::{Heuristic, MilpSolver, NodeView, SolveStatus, NO_SOLUTION};
use crate::context::SearchContext;
use crate::cuts::{Cut, CutGenerator};
use crate::error::{CalError, CalResult};
use std::cmp::Reverse;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const INTEGRALITY_TOLERANCE: f64 = 1e-6;
const FEASIBILITY_TOLERANCE: f64 = 1e-6;
const MIN_VIOLATION: f64 = 1e-9;
const CUT_ROUNDS_FRACTIONAL: usize = 5;
const CUT_ROUNDS_INTEGRAL: usize = 50;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineSettings {
    pub node_limit: Option<u64>,
    pub time_limit: Option<Duration>,
    /// Maximum number of LP relaxations solved.
    pub iteration_limit: Option<u64>,
    /// Nodes whose bound is within this of the incumbent are pruned.
    pub gap: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub nodes: u64,
    pub lp_solves: u64,
    pub row_cuts: u64,
    pub bound_changes: u64,
    pub heuristic_calls: u64,
    pub incumbents: u64,
}

struct Node {
    lower: Vec<f64>,
    upper: Vec<f64>,
    depth: usize,
}

enum NodeResult {
    Pruned,
    Branch(Node, Node),
    IterationLimit,
}

/// Depth-first LP-based branch-and-cut over `microlp`.
///
/// Row cuts go into a pool shared by every later node, bound cuts tighten
/// the global column bounds. Integral LP points are lifted onto the model
/// cone before being offered as incumbents.
pub struct BranchAndCut {
    model: Option<Arc<MilpModel>>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    pool: Vec<LinearRow>,
    generators: Vec<(i32, Box<dyn CutGenerator>)>,
    heuristics: Vec<Box<dyn Heuristic>>,
    heuristics_done: bool,
    settings: EngineSettings,
    incumbent: Option<Vec<f64>>,
    best: f64,
    stats: EngineStats,
}

impl Default for BranchAndCut {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl BranchAndCut {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            model: None,
            lower: Vec::new(),
            upper: Vec::new(),
            pool: Vec::new(),
            generators: Vec::new(),
            heuristics: Vec::new(),
            heuristics_done: false,
            settings,
            incumbent: None,
            best: f64::INFINITY,
            stats: EngineStats::default(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn cut_pool(&self) -> &[LinearRow] {
        &self.pool
    }

    fn cutoff(&self) -> f64 {
        self.best
    }

    fn prunable(&self, bound: f64) -> bool {
        if self.incumbent.is_none() {
            return false;
        }
        let slack = self
            .settings
            .gap
            .max(1e-6 * self.best.abs().max(1.0));
        bound >= self.best - slack
    }

    fn time_left(&self, started: Instant) -> Option<Duration> {
        self.settings
            .time_limit
            .map(|t| t.saturating_sub(started.elapsed()))
    }

    fn out_of_time(&self, started: Instant) -> bool {
        matches!(self.time_left(started), Some(t) if t.is_zero())
    }

    fn out_of_iterations(&self) -> bool {
        matches!(self.settings.iteration_limit, Some(l) if self.stats.lp_solves >= l)
    }

    /// Lifts `x` onto the cone and keeps it if it is feasible and better
    /// than the incumbent.
    fn try_incumbent(&mut self, model: &MilpModel, mut x: Vec<f64>, source: &str) -> bool {
        if x.len() != model.n_columns() {
            return false;
        }
        for j in model.integer_columns() {
            x[j] = x[j].round();
        }
        if let Some(cone) = &model.cone {
            cone.lift(&mut x);
        }
        let lower: Vec<f64> = model.columns.iter().map(|c| c.lower).collect();
        let upper: Vec<f64> = model.columns.iter().map(|c| c.upper).collect();
        if !model.is_feasible(&x, &lower, &upper, FEASIBILITY_TOLERANCE) {
            debug!("Rejected infeasible candidate from {}", source);
            return false;
        }
        let obj = model.objective(&x);
        if obj < self.best - 1e-12 {
            debug!("New incumbent {:.6} from {}", obj, source);
            self.best = obj;
            self.incumbent = Some(x);
            self.stats.incumbents += 1;
            true
        } else {
            false
        }
    }

    fn run_heuristics(&mut self, model: &MilpModel, view: &NodeView, ctx: &SearchContext) {
        for k in 0..self.heuristics.len() {
            if ctx.is_cancelled() {
                return;
            }
            self.stats.heuristic_calls += 1;
            let proposal = self.heuristics[k].propose(view, ctx);
            if let Some(candidate) = proposal {
                let source = self.heuristics[k].name().to_string();
                self.try_incumbent(model, candidate, &source);
            }
        }
    }

    /// Applies the cuts. Returns how many of them change the relaxation
    /// at `x`.
    fn apply_cuts(&mut self, cuts: Vec<Cut>, x: &[f64], lower: &mut [f64], upper: &mut [f64]) -> usize {
        let mut progress = 0;
        for cut in cuts {
            match cut {
                Cut::Row(row) => {
                    if row.violation(x) > MIN_VIOLATION {
                        self.pool.push(row);
                        self.stats.row_cuts += 1;
                        progress += 1;
                    }
                }
                Cut::Bounds(changes) => {
                    for ch in changes {
                        let c = ch.column;
                        if ch.lower > self.lower[c] {
                            self.lower[c] = ch.lower;
                        }
                        if ch.upper < self.upper[c] {
                            self.upper[c] = ch.upper;
                        }
                        if self.lower[c] > lower[c] || self.upper[c] < upper[c] {
                            lower[c] = lower[c].max(self.lower[c]);
                            upper[c] = upper[c].min(self.upper[c]);
                            self.stats.bound_changes += 1;
                            if x[c] < lower[c] - MIN_VIOLATION || x[c] > upper[c] + MIN_VIOLATION {
                                progress += 1;
                            }
                        }
                    }
                }
            }
        }
        progress
    }

    fn process(
        &mut self,
        node: Node,
        model: &MilpModel,
        ctx: &SearchContext,
        started: Instant,
    ) -> NodeResult {
        let Node {
            mut lower,
            mut upper,
            depth,
        } = node;
        for j in 0..lower.len() {
            lower[j] = lower[j].max(self.lower[j]);
            upper[j] = upper[j].min(self.upper[j]);
            if lower[j] > upper[j] + FEASIBILITY_TOLERANCE {
                return NodeResult::Pruned;
            }
            if lower[j] > upper[j] {
                upper[j] = lower[j];
            }
        }

        let mut rounds = 0;
        let values = loop {
            if self.out_of_iterations() {
                return NodeResult::IterationLimit;
            }
            self.stats.lp_solves += 1;
            let (objective, values) = match solve_relaxation(model, &self.pool, &lower, &upper) {
                LpOutcome::Optimal { objective, values } => (objective, values),
                LpOutcome::Infeasible => return NodeResult::Pruned,
                LpOutcome::Unbounded => {
                    warn!("Unbounded relaxation at depth {}, node pruned", depth);
                    return NodeResult::Pruned;
                }
                LpOutcome::Failed(msg) => {
                    warn!("LP failed at depth {} ({}), node pruned", depth, msg);
                    return NodeResult::Pruned;
                }
            };
            if self.prunable(objective) {
                return NodeResult::Pruned;
            }

            if depth == 0 && !self.heuristics_done {
                self.heuristics_done = true;
                let view = NodeView {
                    solution: &values,
                    lower: &lower,
                    upper: &upper,
                    cutoff: self.cutoff(),
                    depth,
                    time_left: self.time_left(started),
                };
                self.run_heuristics(model, &view, ctx);
                if self.prunable(objective) {
                    return NodeResult::Pruned;
                }
            }

            let integral = is_integral(model, &values);
            if integral {
                self.try_incumbent(model, values.clone(), "relaxation");
                let converged = match &model.cone {
                    Some(cone) => {
                        let head = values[cone.head];
                        cone.body_norm(&values) <= head + FEASIBILITY_TOLERANCE * head.abs().max(1.0)
                    }
                    None => true,
                };
                if converged {
                    return NodeResult::Pruned;
                }
            }

            let cap = if integral {
                CUT_ROUNDS_INTEGRAL
            } else {
                CUT_ROUNDS_FRACTIONAL
            };
            if rounds >= cap || ctx.is_cancelled() || self.out_of_time(started) {
                break values;
            }
            rounds += 1;

            let view = NodeView {
                solution: &values,
                lower: &lower,
                upper: &upper,
                cutoff: self.cutoff(),
                depth,
                time_left: self.time_left(started),
            };
            let cuts: Vec<Cut> = self
                .generators
                .iter_mut()
                .flat_map(|(_, g)| g.generate(&view))
                .collect();
            if self.apply_cuts(cuts, &values, &mut lower, &mut upper) == 0 {
                break values;
            }
            if lower.iter().zip(&upper).any(|(l, u)| l > u) {
                return NodeResult::Pruned;
            }
        };

        let Some(j) = branching_column(model, &values, &lower, &upper) else {
            return NodeResult::Pruned;
        };
        let v = values[j].clamp(lower[j], upper[j]);
        let (floor, ceil) = if v.fract().abs() > INTEGRALITY_TOLERANCE {
            (v.floor(), v.ceil())
        } else {
            // integral but the cone is not converged: split a free column
            (lower[j].ceil(), lower[j].ceil() + 1.0)
        };

        let mut down = Node {
            lower: lower.clone(),
            upper: upper.clone(),
            depth: depth + 1,
        };
        down.upper[j] = floor;
        let mut up = Node {
            lower,
            upper,
            depth: depth + 1,
        };
        up.lower[j] = ceil;

        // the child nearer to the LP value is explored first (pushed last)
        if v - floor < ceil - v {
            NodeResult::Branch(up, down)
        } else {
            NodeResult::Branch(down, up)
        }
    }
}

fn is_integral(model: &MilpModel, x: &[f64]) -> bool {
    model
        .integer_columns()
        .all(|j| (x[j] - x[j].round()).abs() <= INTEGRALITY_TOLERANCE)
}

/// Most fractional integer column, or any unfixed one when `x` is integral.
fn branching_column(model: &MilpModel, x: &[f64], lower: &[f64], upper: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for j in model.integer_columns() {
        let f = x[j] - x[j].floor();
        let frac = f.min(1.0 - f);
        if frac > INTEGRALITY_TOLERANCE && best.map_or(true, |(_, b)| frac > b) {
            best = Some((j, frac));
        }
    }
    best.map(|(j, _)| j).or_else(|| {
        model
            .integer_columns()
            .find(|&j| upper[j] - lower[j] >= 1.0 - INTEGRALITY_TOLERANCE)
    })
}

impl MilpSolver for BranchAndCut {
    fn load_problem(&mut self, model: Arc<MilpModel>) {
        self.lower = model.columns.iter().map(|c| c.lower).collect();
        self.upper = model.columns.iter().map(|c| c.upper).collect();
        self.pool.clear();
        self.incumbent = None;
        self.best = f64::INFINITY;
        self.stats = EngineStats::default();
        self.model = Some(model);
    }

    fn model(&self) -> Option<&MilpModel> {
        self.model.as_deref()
    }

    fn register_cut_generator(&mut self, generator: Box<dyn CutGenerator>, priority: i32) {
        self.generators.push((priority, generator));
        self.generators.sort_by_key(|(p, _)| Reverse(*p));
    }

    fn register_heuristic(&mut self, heuristic: Box<dyn Heuristic>) {
        self.heuristics.push(heuristic);
    }

    fn set_node_limit(&mut self, limit: Option<u64>) {
        self.settings.node_limit = limit;
    }

    fn set_time_limit(&mut self, limit: Option<Duration>) {
        self.settings.time_limit = limit;
    }

    fn set_iteration_limit(&mut self, limit: Option<u64>) {
        self.settings.iteration_limit = limit;
    }

    fn column_bounds(&self, column: usize) -> (f64, f64) {
        (self.lower[column], self.upper[column])
    }

    fn set_column_bounds(&mut self, column: usize, lower: f64, upper: f64) {
        self.lower[column] = lower;
        self.upper[column] = upper;
    }

    fn solve(&mut self, ctx: &SearchContext) -> CalResult<SolveStatus> {
        let model = self
            .model
            .clone()
            .ok_or_else(|| CalError::Solver("solve called before load_problem".into()))?;
        let started = Instant::now();

        self.heuristics_done = false;

        let mut stack = vec![Node {
            lower: self.lower.clone(),
            upper: self.upper.clone(),
            depth: 0,
        }];

        let status = loop {
            if ctx.is_cancelled() {
                break SolveStatus::Interrupted;
            }
            if matches!(self.settings.node_limit, Some(l) if self.stats.nodes >= l) {
                break SolveStatus::NodeLimit;
            }
            if self.out_of_time(started) {
                break SolveStatus::TimeLimit;
            }
            let Some(node) = stack.pop() else {
                break if self.incumbent.is_some() {
                    SolveStatus::Optimal
                } else {
                    SolveStatus::Infeasible
                };
            };
            self.stats.nodes += 1;

            match self.process(node, &model, ctx, started) {
                NodeResult::Pruned => {}
                NodeResult::Branch(second, first) => {
                    stack.push(second);
                    stack.push(first);
                }
                NodeResult::IterationLimit => break SolveStatus::IterationLimit,
            }
        };

        debug!(
            "Branch-and-cut {}: {} nodes, {} LPs, {} cuts, best {}",
            status,
            self.stats.nodes,
            self.stats.lp_solves,
            self.stats.row_cuts,
            self.best_objective()
        );
        Ok(status)
    }

    fn best_objective(&self) -> f64 {
        if self.incumbent.is_some() {
            self.best
        } else {
            NO_SOLUTION
        }
    }

    fn best_solution(&self) -> Option<&[f64]> {
        self.incumbent.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationSystem;
    use crate::cuts::{BoundTighteningCutGenerator, ConicOuterApproxCutGenerator};
    use crate::instance::Instance;
    use crate::milp::model::{build_calibration_model, ModelLayout, RowSense};

    fn binary_pair() -> Arc<MilpModel> {
        let mut m = MilpModel::default();
        m.add_column("x", 0.0, 1.0, -1.0, true);
        m.add_column("y", 0.0, 1.0, -1.0, true);
        m.add_row(LinearRow::new([(0, 1.0), (1, 1.0)], RowSense::Le, 1.5));
        Arc::new(m)
    }

    fn calibration_engine(n: usize, x: Vec<f64>) -> BranchAndCut {
        let big_n = x.len();
        let inst = Instance::new("engine", big_n, n, 1, x).unwrap();
        let sys = CalibrationSystem::from_instance(&inst).unwrap();
        let model = build_calibration_model(&inst, &sys).unwrap();
        let layout = ModelLayout::new(big_n);
        let mut engine = BranchAndCut::default();
        engine.load_problem(Arc::new(model));
        engine.register_cut_generator(Box::new(ConicOuterApproxCutGenerator::new(layout)), 1);
        engine.register_cut_generator(Box::new(BoundTighteningCutGenerator::new(layout)), 1);
        engine
    }

    #[test]
    fn test_pure_integer_problem() {
        let mut engine = BranchAndCut::default();
        engine.load_problem(binary_pair());
        let status = engine.solve(&SearchContext::default()).unwrap();
        assert_eq!(status, SolveStatus::Optimal);
        assert!((engine.best_objective() + 1.0).abs() < 1e-9);
        let x = engine.best_solution().unwrap();
        assert!((x[0] + x[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_balanced_sample_has_zero_objective() {
        let mut engine = calibration_engine(2, vec![1.0, 2.0, 3.0, 4.0]);
        let status = engine.solve(&SearchContext::default()).unwrap();
        assert_eq!(status, SolveStatus::Optimal);
        assert!(engine.best_objective() < 1e-6);
        assert!(engine.stats().nodes >= 1);
        assert!(engine.stats().incumbents >= 1);

        let x = engine.best_solution().unwrap();
        let layout = ModelLayout::new(4);
        let picked: f64 = layout.selection(x).iter().sum();
        assert!((picked - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_fixed_bounds_are_respected() {
        // units 1 and 2 forced in: weights (1, 3) are the only calibrated choice
        let mut engine = calibration_engine(2, vec![1.0, 2.0, 3.0, 1.0]);
        let layout = ModelLayout::new(4);
        engine.set_column_bounds(layout.s(0), 1.0, 1.0);
        engine.set_column_bounds(layout.s(1), 1.0, 1.0);
        engine.solve(&SearchContext::default()).unwrap();

        let x = engine.best_solution().unwrap();
        assert_eq!(layout.selection(x), &[1.0, 1.0, 0.0, 0.0]);
        assert!((engine.best_objective() - 2f64.sqrt()).abs() < 1e-6);
        // the axis rows alone only bound z by 1
        assert!(!engine.cut_pool().is_empty());
    }

    #[test]
    fn test_node_limit_zero_does_nothing() {
        let mut engine = BranchAndCut::default();
        engine.load_problem(binary_pair());
        engine.set_node_limit(Some(0));
        let status = engine.solve(&SearchContext::default()).unwrap();
        assert_eq!(status, SolveStatus::NodeLimit);
        assert_eq!(engine.best_objective(), NO_SOLUTION);
        assert!(engine.best_solution().is_none());
    }

    #[test]
    fn test_cancelled_before_start() {
        let mut engine = BranchAndCut::default();
        engine.load_problem(binary_pair());
        let ctx = SearchContext::default();
        ctx.token().cancel();
        assert_eq!(engine.solve(&ctx).unwrap(), SolveStatus::Interrupted);
    }

    #[test]
    fn test_solve_without_model_is_an_error() {
        let mut engine = BranchAndCut::default();
        assert!(matches!(
            engine.solve(&SearchContext::default()),
            Err(CalError::Solver(_))
        ));
    }
}
