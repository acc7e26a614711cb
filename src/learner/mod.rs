//! The decision-making side of the controller.
//!
//! The controller treats a learner as a black box: it hands over an [`Observation`], receives an
//! action index, and later reports how much the reward changed.

pub mod dqn;
mod net;

use super::{error::LearnerError, Observation, NUM_ACTIONS};
use rand::{rngs::StdRng, Rng};
use serde::{Deserialize, Serialize};

pub use dqn::DeepQLearner;

/// Provides decisions and online updates for the controller.
pub trait Learner {
    /// Chooses an action index in `0..NUM_ACTIONS` for an observation.
    fn decide(&mut self, observation: &Observation) -> usize;
    /// Feeds back the reward change caused by the most recent decision.
    ///
    /// Called exactly once after every [`decide`](Learner::decide).
    fn update(&mut self, training_error: f64);
    /// Serializes the learned parameters.
    fn snapshot(&self) -> Result<String, LearnerError>;
    /// Loads parameters produced by [`snapshot`](Learner::snapshot).
    fn restore(&mut self, blob: &str) -> Result<(), LearnerError>;
}

impl<L: Learner + ?Sized> Learner for Box<L> {
    fn decide(&mut self, observation: &Observation) -> usize {
        (**self).decide(observation)
    }

    fn update(&mut self, training_error: f64) {
        (**self).update(training_error)
    }

    fn snapshot(&self) -> Result<String, LearnerError> {
        (**self).snapshot()
    }

    fn restore(&mut self, blob: &str) -> Result<(), LearnerError> {
        (**self).restore(blob)
    }
}

/// A learner that acts uniformly at random and learns nothing.
///
/// Keeps a running total of the training error it was given, which is also what it persists.
pub struct RandomLearner {
    rng: StdRng,
    stats: RandomStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
struct RandomStats {
    updates: u64,
    total_error: f64,
}

impl RandomLearner {
    pub fn new(rng: StdRng) -> Self {
        RandomLearner {
            rng,
            stats: RandomStats::default(),
        }
    }

    /// Number of updates received.
    pub fn updates(&self) -> u64 {
        self.stats.updates
    }

    /// Sum of all training errors received.
    pub fn total_error(&self) -> f64 {
        self.stats.total_error
    }
}

impl Learner for RandomLearner {
    fn decide(&mut self, _observation: &Observation) -> usize {
        self.rng.gen_range(0..NUM_ACTIONS)
    }

    fn update(&mut self, training_error: f64) {
        self.stats.updates += 1;
        self.stats.total_error += training_error;
    }

    fn snapshot(&self) -> Result<String, LearnerError> {
        Ok(serde_json::to_string(&self.stats)?)
    }

    fn restore(&mut self, blob: &str) -> Result<(), LearnerError> {
        self.stats = serde_json::from_str(blob)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn random_learner_stays_in_action_space() {
        let mut learner = RandomLearner::new(StdRng::seed_from_u64(1));
        let obs = Observation::zeros();
        assert!((0..1000).all(|_| learner.decide(&obs) < NUM_ACTIONS));
    }

    #[test]
    fn random_learner_round_trips_stats() {
        let mut learner = RandomLearner::new(StdRng::seed_from_u64(1));
        learner.update(0.5);
        learner.update(-0.25);
        let blob = learner.snapshot().unwrap();

        let mut other = RandomLearner::new(StdRng::seed_from_u64(2));
        other.restore(&blob).unwrap();
        assert_eq!(other.updates(), 2);
        assert_eq!(other.total_error(), 0.25);
        assert!(other.restore("not json").is_err());
    }
}
