use super::model::{LinearRow, MilpModel, RowSense};
use microlp::{ComparisonOp, OptimizationDirection, Problem};

#[derive(Debug, Clone, PartialEq)]
pub enum LpOutcome {
    Optimal { objective: f64, values: Vec<f64> },
    Infeasible,
    Unbounded,
    Failed(String),
}

fn comparison(sense: RowSense) -> ComparisonOp {
    match sense {
        RowSense::Le => ComparisonOp::Le,
        RowSense::Ge => ComparisonOp::Ge,
        RowSense::Eq => ComparisonOp::Eq,
    }
}

/// Solves the continuous relaxation of `model` under the given column
/// bounds, with `extra` rows appended to the model rows.
pub fn solve_relaxation(
    model: &MilpModel,
    extra: &[LinearRow],
    lower: &[f64],
    upper: &[f64],
) -> LpOutcome {
    let mut problem = Problem::new(OptimizationDirection::Minimize);
    let vars: Vec<_> = model
        .columns
        .iter()
        .enumerate()
        .map(|(j, col)| problem.add_var(col.objective, (lower[j], upper[j])))
        .collect();

    for row in model.rows.iter().chain(extra) {
        if row.terms.is_empty() {
            continue;
        }
        problem.add_constraint(
            row.terms.iter().map(|&(c, a)| (vars[c], a)),
            comparison(row.sense),
            row.rhs,
        );
    }

    match problem.solve() {
        Ok(solution) => LpOutcome::Optimal {
            objective: solution.objective(),
            values: vars.iter().map(|&v| *solution.var_value(v)).collect(),
        },
        Err(microlp::Error::Infeasible) => LpOutcome::Infeasible,
        Err(microlp::Error::Unbounded) => LpOutcome::Unbounded,
        Err(other) => LpOutcome::Failed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn knapsack() -> MilpModel {
        let mut m = MilpModel::default();
        m.add_column("x", 0.0, 4.0, -1.0, false);
        m.add_column("y", 0.0, 4.0, -2.0, false);
        m.add_row(LinearRow::new([(0, 1.0), (1, 1.0)], RowSense::Le, 3.0));
        m
    }

    #[test]
    fn test_relaxation_optimum() {
        let m = knapsack();
        match solve_relaxation(&m, &[], &[0.0, 0.0], &[4.0, 4.0]) {
            LpOutcome::Optimal { objective, values } => {
                assert!((objective + 6.0).abs() < 1e-9);
                assert!((values[1] - 3.0).abs() < 1e-9);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_extra_rows_are_honoured() {
        let m = knapsack();
        let cut = LinearRow::new([(1, 1.0)], RowSense::Le, 1.0);
        match solve_relaxation(&m, &[cut], &[0.0, 0.0], &[4.0, 4.0]) {
            LpOutcome::Optimal { objective, .. } => assert!((objective + 4.0).abs() < 1e-9),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_infeasible_bounds() {
        let m = knapsack();
        let cut = LinearRow::new([(0, 1.0)], RowSense::Ge, 3.5);
        assert_eq!(
            solve_relaxation(&m, &[cut], &[0.0, 1.0], &[4.0, 4.0]),
            LpOutcome::Infeasible
        );
    }
}
