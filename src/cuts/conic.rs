use super::{Cut, CutGenerator};
use crate::milp::model::{LinearRow, ModelLayout, RowSense};
use crate::milp::NodeView;

/// Outer approximation of `‖δ‖ ≤ z` by supporting hyperplanes.
pub struct ConicOuterApproxCutGenerator {
    layout: ModelLayout,
}

impl ConicOuterApproxCutGenerator {
    pub fn new(layout: ModelLayout) -> Self {
        Self { layout }
    }

    /// The tangent plane at the candidate's δ, or `None` when the candidate is
    /// inside the cone.
    pub fn separate(&self, x: &[f64]) -> Option<LinearRow> {
        let z = x[self.layout.z()];
        let delta = self.layout.deltas(x);
        let sq: f64 = delta.iter().map(|d| d * d).sum();
        if sq <= z * z {
            return None;
        }
        let norm = sq.sqrt();
        let terms = delta
            .iter()
            .enumerate()
            .map(|(i, &d)| (self.layout.delta(i), d))
            .chain(std::iter::once((self.layout.z(), -norm)));
        Some(LinearRow::new(terms, RowSense::Le, 0.0))
    }
}

impl CutGenerator for ConicOuterApproxCutGenerator {
    fn name(&self) -> &str {
        "conic"
    }

    fn generate(&mut self, node: &NodeView) -> Vec<Cut> {
        self.separate(node.solution)
            .map(Cut::Row)
            .into_iter()
            .collect()
    }
}
