pub mod bounds;
pub mod conic;

use crate::milp::model::LinearRow;
use crate::milp::NodeView;

pub use bounds::BoundTighteningCutGenerator;
pub use conic::ConicOuterApproxCutGenerator;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundChange {
    pub column: usize,
    pub lower: f64,
    pub upper: f64,
}

/// A globally valid cut. Row cuts join the solver's row pool, bound cuts
/// tighten the global column bounds.
#[derive(Debug, Clone, PartialEq)]
pub enum Cut {
    Row(LinearRow),
    Bounds(Vec<BoundChange>),
}

pub trait CutGenerator: Send {
    fn name(&self) -> &str;
    fn generate(&mut self, node: &NodeView) -> Vec<Cut>;
}
