use crate::calibration::CalibrationSystem;
use crate::error::{CalError, CalResult};
use nalgebra::{DMatrix, DVector, SVD};
use std::sync::Arc;
use tracing::debug;

/// Distance from {0, 1} under which a coordinate counts as fixed.
pub const FIXED_TOLERANCE: f64 = 1e-5;
/// Singular values at or below this (relative to max(1, σ_max)) are dropped.
pub const SINGULAR_TOLERANCE: f64 = 1e-10;

const NOT_FREE: usize = usize::MAX;

#[inline]
pub fn is_fixed(pi: f64) -> bool {
    (pi - 0.5).abs() >= 0.5 - FIXED_TOLERANCE
}

/// Projects directions onto the null space of the calibration rows
/// restricted to the free coordinates.
///
/// With A the (p+1)×F restriction, A = L·Q is obtained from the QR
/// factorisation of Aᵀ, L is decomposed as U·S·Vᵀ and the projection is
///
/// ```text
/// u = v - Qᵀ · V · S⁻¹ · Uᵀ · (A·v)
/// ```
///
/// Fixed coordinates of `u` are zero.
pub struct CalibrationProjector {
    system: Arc<CalibrationSystem>,
    free: Vec<usize>,
    position: Vec<usize>,
}

impl CalibrationProjector {
    pub fn new(system: Arc<CalibrationSystem>) -> CalResult<Self> {
        let n = system.n_columns();
        let mut free = Vec::new();
        let mut position = Vec::new();
        free.try_reserve_exact(n)
            .and_then(|_| position.try_reserve_exact(n))
            .map_err(|e| {
                CalError::Allocation(format!("projector buffers for {} columns: {}", n, e))
            })?;
        position.resize(n, NOT_FREE);
        Ok(Self {
            system,
            free,
            position,
        })
    }

    pub fn system(&self) -> &CalibrationSystem {
        &self.system
    }

    /// Number of free coordinates seen by the last projection.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn project(&mut self, v: &[f64], pi: &[f64]) -> Vec<f64> {
        let mut u = vec![0.0; v.len()];
        self.project_into(v, pi, &mut u);
        u
    }

    pub fn project_into(&mut self, v: &[f64], pi: &[f64], u: &mut [f64]) {
        let n = self.system.n_columns();
        debug_assert_eq!(v.len(), n);
        debug_assert_eq!(pi.len(), n);
        debug_assert_eq!(u.len(), n);

        self.free.clear();
        for (i, &p) in pi.iter().enumerate() {
            if is_fixed(p) {
                self.position[i] = NOT_FREE;
            } else {
                self.position[i] = self.free.len();
                self.free.push(i);
            }
        }
        u.fill(0.0);

        let f = self.free.len();
        if f == 0 {
            return;
        }
        let m = self.system.n_rows();

        // Aᵀ restricted to the free columns, F × (p+1)
        let mut at = DMatrix::<f64>::zeros(f, m);
        for (r, row) in self.system.rows().iter().enumerate() {
            for (c, x) in row.iter() {
                let k = self.position[c];
                if k != NOT_FREE {
                    at[(k, r)] = x;
                }
            }
        }

        let vf = DVector::from_iterator(f, self.free.iter().map(|&i| v[i]));
        let av = at.tr_mul(&vf);

        let qr = at.qr();
        let q = qr.q();
        let l = qr.r().transpose();

        let Some(svd) = SVD::try_new(l, true, true, f64::EPSILON, 0) else {
            debug!("SVD of L did not converge ({} free columns)", f);
            return;
        };
        let (Some(left), Some(right_t)) = (svd.u.as_ref(), svd.v_t.as_ref()) else {
            return;
        };

        let sigma_max = svd.singular_values.max();
        let cutoff = SINGULAR_TOLERANCE * sigma_max.max(1.0);

        let mut y = left.tr_mul(&av);
        for (yj, &s) in y.iter_mut().zip(svd.singular_values.iter()) {
            *yj = if s > cutoff { *yj / s } else { 0.0 };
        }
        let correction = &q * right_t.tr_mul(&y);

        for (k, &i) in self.free.iter().enumerate() {
            u[i] = vf[k] - correction[k];
        }
    }
}
