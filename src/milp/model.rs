use crate::calibration::CalibrationSystem;
use crate::error::{CalError, CalResult};
use crate::instance::Instance;
use std::collections::BTreeMap;

/// Lower bound offset keeping every weight strictly positive.
pub const WEIGHT_FLOOR: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSense {
    Le,
    Ge,
    Eq,
}

/// A sparse linear row `Σ a_k x_k (sense) rhs`. Duplicate columns are
/// merged on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRow {
    pub terms: Vec<(usize, f64)>,
    pub sense: RowSense,
    pub rhs: f64,
}

impl LinearRow {
    pub fn new(terms: impl IntoIterator<Item = (usize, f64)>, sense: RowSense, rhs: f64) -> Self {
        let mut merged: BTreeMap<usize, f64> = BTreeMap::new();
        for (c, a) in terms {
            *merged.entry(c).or_insert(0.0) += a;
        }
        let terms = merged.into_iter().filter(|&(_, a)| a != 0.0).collect();
        Self { terms, sense, rhs }
    }

    pub fn activity(&self, x: &[f64]) -> f64 {
        self.terms.iter().map(|&(c, a)| a * x[c]).sum()
    }

    /// Positive amount by which `x` breaks the row, zero when satisfied.
    pub fn violation(&self, x: &[f64]) -> f64 {
        let lhs = self.activity(x);
        match self.sense {
            RowSense::Le => (lhs - self.rhs).max(0.0),
            RowSense::Ge => (self.rhs - lhs).max(0.0),
            RowSense::Eq => (lhs - self.rhs).abs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
    pub objective: f64,
    pub integer: bool,
}

/// Second-order cone `‖body‖ ≤ head` over model columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Cone {
    pub head: usize,
    pub body: Vec<usize>,
}

impl Cone {
    pub fn body_norm(&self, x: &[f64]) -> f64 {
        self.body.iter().map(|&c| x[c] * x[c]).sum::<f64>().sqrt()
    }

    /// Sets the head to the norm of the body.
    pub fn lift(&self, x: &mut [f64]) {
        x[self.head] = self.body_norm(x);
    }
}

/// A minimisation problem with linear rows, integer columns and an
/// optional cone the engine enforces on integral points.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MilpModel {
    pub columns: Vec<Column>,
    pub rows: Vec<LinearRow>,
    pub cone: Option<Cone>,
}

impl MilpModel {
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn add_column(
        &mut self,
        name: impl Into<String>,
        lower: f64,
        upper: f64,
        objective: f64,
        integer: bool,
    ) -> usize {
        self.columns.push(Column {
            name: name.into(),
            lower,
            upper,
            objective,
            integer,
        });
        self.columns.len() - 1
    }

    pub fn add_row(&mut self, row: LinearRow) {
        self.rows.push(row);
    }

    pub fn objective(&self, x: &[f64]) -> f64 {
        self.columns
            .iter()
            .zip(x)
            .map(|(c, v)| c.objective * v)
            .sum()
    }

    pub fn integer_columns(&self) -> impl Iterator<Item = usize> + '_ {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.integer)
            .map(|(i, _)| i)
    }

    /// Checks bounds, rows, integrality and the cone against `x`.
    pub fn is_feasible(&self, x: &[f64], lower: &[f64], upper: &[f64], tol: f64) -> bool {
        if x.len() != self.columns.len() {
            return false;
        }
        for (j, col) in self.columns.iter().enumerate() {
            let v = x[j];
            if !v.is_finite() || v < lower[j] - tol || v > upper[j] + tol {
                return false;
            }
            if col.integer && (v - v.round()).abs() > tol {
                return false;
            }
        }
        if self
            .rows
            .iter()
            .any(|r| r.violation(x) > tol * r.rhs.abs().max(1.0))
        {
            return false;
        }
        match &self.cone {
            Some(cone) => cone.body_norm(x) <= x[cone.head] + tol,
            None => true,
        }
    }
}

/// Column indices of the calibration model: z, then the weight changes,
/// then the selection indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelLayout {
    pub units: usize,
}

impl ModelLayout {
    pub fn new(units: usize) -> Self {
        Self { units }
    }

    #[inline]
    pub fn z(&self) -> usize {
        0
    }

    #[inline]
    pub fn delta(&self, unit: usize) -> usize {
        1 + unit
    }

    #[inline]
    pub fn s(&self, unit: usize) -> usize {
        1 + self.units + unit
    }

    pub fn n_columns(&self) -> usize {
        1 + 2 * self.units
    }

    pub fn deltas<'a>(&self, x: &'a [f64]) -> &'a [f64] {
        &x[self.delta(0)..self.delta(0) + self.units]
    }

    pub fn selection<'a>(&self, x: &'a [f64]) -> &'a [f64] {
        &x[self.s(0)..self.s(0) + self.units]
    }
}

/// The mixed-integer formulation of the calibrated sampling problem.
///
/// ```text
/// min z
///   ‖δ‖ ≤ z                           (cone, cut lazily)
///   -z ± δ_i ≤ 0                      (axis cuts)
///   Σ s_i = n,  Σ δ_i = 0
///   Σ_i x_ji δ_i + w0 Σ_i x_ji s_i = Σ_i x_ji
///   δ_i + w0 s_i ≥ 0,  δ_i + (w0 - U) s_i ≤ 0
/// ```
pub fn build_calibration_model(
    instance: &Instance,
    system: &CalibrationSystem,
) -> CalResult<MilpModel> {
    let big_n = instance.population;
    if system.n_columns() != big_n {
        return Err(CalError::Instance(format!(
            "calibration system has {} columns, instance has {} units",
            system.n_columns(),
            big_n
        )));
    }
    let w0 = instance.base_weight();
    let u_max = instance.max_weight();
    let layout = ModelLayout::new(big_n);

    let mut model = MilpModel::default();
    model.add_column("z", 0.0, f64::INFINITY, 1.0, false);
    for i in 0..big_n {
        model.add_column(
            format!("delta_{}", i + 1),
            -w0 + WEIGHT_FLOOR,
            u_max - w0,
            0.0,
            false,
        );
    }
    for i in 0..big_n {
        model.add_column(format!("s_{}", i + 1), 0.0, 1.0, 0.0, true);
    }

    for i in 0..big_n {
        model.add_row(LinearRow::new(
            [(layout.z(), -1.0), (layout.delta(i), 1.0)],
            RowSense::Le,
            0.0,
        ));
        model.add_row(LinearRow::new(
            [(layout.z(), -1.0), (layout.delta(i), -1.0)],
            RowSense::Le,
            0.0,
        ));
    }

    model.add_row(LinearRow::new(
        (0..big_n).map(|i| (layout.s(i), 1.0)),
        RowSense::Eq,
        instance.sample_size as f64,
    ));
    model.add_row(LinearRow::new(
        (0..big_n).map(|i| (layout.delta(i), 1.0)),
        RowSense::Eq,
        0.0,
    ));

    for row in system.auxiliary() {
        let terms = row
            .iter()
            .flat_map(|(i, x)| [(layout.delta(i), x), (layout.s(i), w0 * x)]);
        model.add_row(LinearRow::new(terms, RowSense::Eq, row.sum()));
    }

    for i in 0..big_n {
        model.add_row(LinearRow::new(
            [(layout.delta(i), 1.0), (layout.s(i), w0)],
            RowSense::Ge,
            0.0,
        ));
        model.add_row(LinearRow::new(
            [(layout.delta(i), 1.0), (layout.s(i), w0 - u_max)],
            RowSense::Le,
            0.0,
        ));
    }

    model.cone = Some(Cone {
        head: layout.z(),
        body: (0..big_n).map(|i| layout.delta(i)).collect(),
    });
    Ok(model)
}
