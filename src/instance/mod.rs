pub mod loader;

use crate::config::{Algorithm, RunSettings};
use crate::error::{CalError, CalResult};
use tracing::warn;

pub use loader::{load_instance, parse_instance};

/// A calibrated sampling problem: population, sample size, auxiliary
/// vectors and the settings of the run. Frozen once the run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub name: String,
    pub population: usize,
    pub sample_size: usize,
    pub n_calibration: usize,
    /// Row-major N x p matrix of auxiliary values.
    pub calibration: Vec<f64>,
    pub initial: Option<Vec<f64>>,
    pub ids: Option<Vec<String>>,
    pub settings: RunSettings,
}

impl Instance {
    pub fn new(
        name: impl Into<String>,
        population: usize,
        sample_size: usize,
        n_calibration: usize,
        calibration: Vec<f64>,
    ) -> CalResult<Self> {
        let inst = Self {
            name: name.into(),
            population,
            sample_size,
            n_calibration,
            calibration,
            initial: None,
            ids: None,
            settings: RunSettings::default(),
        };
        inst.validate()?;
        Ok(inst)
    }

    pub fn validate(&self) -> CalResult<()> {
        if self.population == 0 {
            return Err(CalError::Instance("population size N must be positive".into()));
        }
        if self.sample_size == 0 || self.sample_size >= self.population {
            return Err(CalError::Instance(format!(
                "sample size n={} must satisfy 0 < n < N={}",
                self.sample_size, self.population
            )));
        }
        let expected = self.population * self.n_calibration;
        if self.calibration.len() != expected {
            return Err(CalError::Instance(format!(
                "calibration data holds {} values, expected N*p = {}",
                self.calibration.len(),
                expected
            )));
        }
        if self.calibration.iter().any(|x| !x.is_finite()) {
            return Err(CalError::Instance("calibration data must be finite".into()));
        }
        if let Some(init) = &self.initial {
            if init.len() != self.population {
                return Err(CalError::Instance(format!(
                    "initial point has {} values, expected {}",
                    init.len(),
                    self.population
                )));
            }
            if init.iter().any(|v| !(0.0..=1.0).contains(v)) {
                return Err(CalError::Instance(
                    "initial point values must lie in [0, 1]".into(),
                ));
            }
        }
        if let Some(ids) = &self.ids {
            if ids.len() != self.population {
                return Err(CalError::Instance(format!(
                    "{} ids given, expected {}",
                    ids.len(),
                    self.population
                )));
            }
        }
        Ok(())
    }

    pub fn with_initial(mut self, initial: Vec<f64>) -> CalResult<Self> {
        self.initial = Some(initial);
        self.validate()?;
        Ok(self)
    }

    pub fn set_sample_size(&mut self, n: usize) -> CalResult<()> {
        self.sample_size = n;
        self.validate()
    }

    /// Value of auxiliary vector `j` on unit `i`.
    #[inline]
    pub fn x(&self, unit: usize, vector: usize) -> f64 {
        self.calibration[unit * self.n_calibration + vector]
    }

    /// Design weight N/n.
    pub fn base_weight(&self) -> f64 {
        self.population as f64 / self.sample_size as f64
    }

    /// Largest admissible weight N^2/n.
    pub fn max_weight(&self) -> f64 {
        let n = self.population as f64;
        n * n / self.sample_size as f64
    }

    pub fn inclusion_probability(&self) -> f64 {
        self.sample_size as f64 / self.population as f64
    }

    pub fn unit_id(&self, unit: usize) -> String {
        match &self.ids {
            Some(ids) => ids[unit].clone(),
            None => (unit + 1).to_string(),
        }
    }

    /// Applies the run-level consistency rules. Returns false when the
    /// run has nothing to do.
    pub fn prepare_run(&mut self) -> bool {
        if self.initial.is_some()
            && (self.settings.algorithm != Algorithm::Random || self.settings.replications > 1)
        {
            warn!(
                "⚠️  Initial solution ignored for this type of algorithm. \
                 Use algorithm \"rand\" with a single replication to start from it."
            );
            self.initial = None;
        }

        if self.settings.replications < 1 {
            return false;
        }

        if self.settings.algorithm == Algorithm::Global && self.settings.replications > 1 {
            warn!("⚠️  Global solution requested, one replication will be run");
            self.settings.replications = 1;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> Instance {
        Instance::new("tiny", 4, 2, 1, vec![1.0, 2.0, 3.0, 4.0]).unwrap()
    }

    #[test]
    fn test_weights() {
        let inst = tiny();
        assert_eq!(inst.base_weight(), 2.0);
        assert_eq!(inst.max_weight(), 8.0);
        assert_eq!(inst.inclusion_probability(), 0.5);
        assert_eq!(inst.x(2, 0), 3.0);
        assert_eq!(inst.unit_id(0), "1");
    }

    #[test]
    fn test_bad_sample_size() {
        assert!(Instance::new("bad", 4, 4, 1, vec![0.0; 4]).is_err());
        assert!(Instance::new("bad", 4, 0, 1, vec![0.0; 4]).is_err());
    }

    #[test]
    fn test_global_forces_single_replication_and_drops_initial() {
        let mut inst = tiny().with_initial(vec![1.0, 1.0, 0.0, 0.0]).unwrap();
        inst.settings.algorithm = Algorithm::Global;
        inst.settings.replications = 4;
        assert!(inst.prepare_run());
        assert_eq!(inst.settings.replications, 1);
        assert!(inst.initial.is_none());
    }

    #[test]
    fn test_random_keeps_initial_for_single_replication() {
        let mut inst = tiny().with_initial(vec![1.0, 1.0, 0.0, 0.0]).unwrap();
        inst.settings.algorithm = Algorithm::Random;
        assert!(inst.prepare_run());
        assert!(inst.initial.is_some());

        inst.settings.replications = 2;
        assert!(inst.prepare_run());
        assert!(inst.initial.is_none());
    }

    #[test]
    fn test_zero_replications_means_nothing_to_do() {
        let mut inst = tiny();
        inst.settings.replications = 0;
        assert!(!inst.prepare_run());
    }
}
