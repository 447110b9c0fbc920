use crate::cube::Fixing;

/// Rounds between two restarts of the mobility schedule.
pub const RESTART_PERIOD: usize = 20;
/// Largest share of the settled indicators released in one round.
pub const FRACTION: f64 = 0.2;
/// Mobility factor when a user-supplied start is refined in RANDOM mode.
pub const RANDOM_MOBILITY: f64 = 1.0;
pub const MAX_ATTEMPTS: usize = 20;
pub const SETTLED_TOLERANCE: f64 = 1e-5;

/// Decides which indicators of the previous solution stay fixed in the
/// next round. Most of them do; a shrinking random share is released so
/// the next solve explores a neighbourhood of the seed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefixSchedule {
    population: usize,
    sample_size: usize,
    fraction: f64,
}

impl RefixSchedule {
    pub fn new(population: usize, sample_size: usize, refining_initial: bool) -> Self {
        let mobility = if refining_initial { RANDOM_MOBILITY } else { 1.0 };
        Self {
            population,
            sample_size,
            fraction: FRACTION * mobility,
        }
    }

    /// Release probabilities (zeros, ones) for round `round`.
    pub fn thresholds(&self, round: usize) -> (f64, f64) {
        let left = (RESTART_PERIOD - round % RESTART_PERIOD) as f64;
        let multiplier = self.fraction * left / RESTART_PERIOD as f64;
        let big_n = self.population as f64;
        let n = self.sample_size as f64;
        (multiplier * (big_n - n) / big_n, multiplier * n / big_n)
    }

    /// Fixings for the next round. Every attempt starts from scratch; the
    /// first one that leaves a settled indicator free wins, otherwise the
    /// last attempt is used.
    pub fn fixings(&self, seed: &[f64], round: usize, rng: &mut fastrand::Rng) -> Vec<(usize, Fixing)> {
        let (th0, th1) = self.thresholds(round);
        let mut fixes = Vec::with_capacity(seed.len());
        for _ in 0..MAX_ATTEMPTS {
            fixes.clear();
            let mut released = false;
            for (i, &s) in seed.iter().enumerate() {
                if s < SETTLED_TOLERANCE {
                    if rng.f64() > th0 {
                        fixes.push((i, Fixing::Zero));
                    } else {
                        released = true;
                    }
                } else if s > 1.0 - SETTLED_TOLERANCE {
                    if rng.f64() > th1 {
                        fixes.push((i, Fixing::One));
                    } else {
                        released = true;
                    }
                }
            }
            if released {
                break;
            }
        }
        fixes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 0.19)]
    #[case(10, 0.1)]
    #[case(19, 0.01)]
    #[case(20, 0.2)]
    fn test_multiplier_restarts(#[case] round: usize, #[case] multiplier: f64) {
        let sched = RefixSchedule::new(10, 4, false);
        let (th0, th1) = sched.thresholds(round);
        assert!((th0 - multiplier * 0.6).abs() < 1e-12);
        assert!((th1 - multiplier * 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_fractional_entries_are_never_fixed() {
        let sched = RefixSchedule::new(4, 2, false);
        let mut rng = fastrand::Rng::with_seed(4);
        let fixes = sched.fixings(&[0.5, 0.5, 0.5, 0.5], 1, &mut rng);
        assert!(fixes.is_empty());
    }

    #[test]
    fn test_at_least_one_release_with_enough_attempts() {
        let sched = RefixSchedule::new(50, 10, false);
        let mut seed = vec![0.0; 50];
        seed[..10].fill(1.0);
        let mut rng = fastrand::Rng::with_seed(8);
        for round in 1..16 {
            let fixes = sched.fixings(&seed, round, &mut rng);
            assert!(fixes.len() < 50, "round {} fixed everything", round);
            for (i, f) in fixes {
                let expected = if i < 10 { Fixing::One } else { Fixing::Zero };
                assert_eq!(f, expected);
            }
        }
    }
}
