use super::{BoundChange, Cut, CutGenerator};
use crate::milp::model::ModelLayout;
use crate::milp::NodeView;

/// Every |δ_i| is at most ‖δ‖, so once an incumbent of value c exists the
/// weight changes can be boxed into [-c, c].
pub struct BoundTighteningCutGenerator {
    layout: ModelLayout,
}

impl BoundTighteningCutGenerator {
    pub fn new(layout: ModelLayout) -> Self {
        Self { layout }
    }

    pub fn tighten(&self, cutoff: f64, lower: &[f64], upper: &[f64]) -> Vec<BoundChange> {
        if !cutoff.is_finite() || cutoff < 0.0 {
            return Vec::new();
        }
        (0..self.layout.units)
            .map(|i| self.layout.delta(i))
            .filter_map(|c| {
                let (lb, ub) = (lower[c], upper[c]);
                let new_lb = lb.max(-cutoff);
                let new_ub = ub.min(cutoff);
                (new_lb > lb || new_ub < ub).then_some(BoundChange {
                    column: c,
                    lower: new_lb,
                    upper: new_ub,
                })
            })
            .collect()
    }
}

impl CutGenerator for BoundTighteningCutGenerator {
    fn name(&self) -> &str {
        "bound-tightening"
    }

    fn generate(&mut self, node: &NodeView) -> Vec<Cut> {
        let changes = self.tighten(node.cutoff, node.lower, node.upper);
        if changes.is_empty() {
            Vec::new()
        } else {
            vec![Cut::Bounds(changes)]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_incumbent_no_cut() {
        let gen = BoundTighteningCutGenerator::new(ModelLayout::new(2));
        let lower = [0.0, -5.0, -5.0, 0.0, 0.0];
        let upper = [f64::INFINITY, 5.0, 5.0, 1.0, 1.0];
        assert!(gen.tighten(f64::INFINITY, &lower, &upper).is_empty());
    }

    #[test]
    fn test_only_loose_bounds_change() {
        let gen = BoundTighteningCutGenerator::new(ModelLayout::new(3));
        let lower = [0.0, -5.0, -1.0, -5.0, 0.0, 0.0, 0.0];
        let upper = [f64::INFINITY, 5.0, 1.5, 0.5, 1.0, 1.0, 1.0];
        let changes = gen.tighten(2.0, &lower, &upper);
        assert_eq!(
            changes,
            vec![
                BoundChange {
                    column: 1,
                    lower: -2.0,
                    upper: 2.0
                },
                BoundChange {
                    column: 3,
                    lower: -2.0,
                    upper: 0.5
                },
            ]
        );
    }
}
