//! Configuration of the controller and its collaborators.
//!
//! Every section falls back to its [`Default`] when missing from a JSON document, so a config file
//! only needs to name the values it changes.

use super::{error::ConfigError, Point, Vector};
use serde::{Deserialize, Serialize};
use std::{f64::consts::PI, fs, path::Path};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub quad: QuadConfig,
    pub estimator: EstimatorConfig,
    pub reward: RewardWeights,
    pub episode: EpisodeConfig,
    pub world: WorldConfig,
    pub timestep: TimestepConfig,
    pub learner: DeepQConfig,
    pub divergence: DivergencePolicy,
    /// Seeds every random source when set; otherwise seeds come from entropy.
    pub seed: Option<u64>,
}

impl ControllerConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: ControllerConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Rejects values the controller cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.estimator.window == 0 {
            return Err(ConfigError::invalid("estimator.window", "must be at least 1"));
        }
        if !(self.quad.mass > 0.0) {
            return Err(ConfigError::invalid("quad.mass", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.quad.hover_bias) {
            return Err(ConfigError::invalid("quad.hover_bias", "must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.episode.respawn_probability) {
            return Err(ConfigError::invalid(
                "episode.respawn_probability",
                "must be in [0, 1]",
            ));
        }
        let (min, max) = (self.episode.spawn_min, self.episode.spawn_max);
        if min.iter().zip(max.iter()).any(|(lo, hi)| lo > hi) {
            return Err(ConfigError::invalid(
                "episode.spawn_min",
                format!("{:?} is not below spawn_max {:?}", min, max),
            ));
        }
        if !(self.timestep.min_fps > 0.0) {
            return Err(ConfigError::invalid("timestep.min_fps", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.learner.gamma) {
            return Err(ConfigError::invalid("learner.gamma", "must be in [0, 1]"));
        }
        if self.learner.hidden_layers.iter().any(|&n| n == 0) {
            return Err(ConfigError::invalid(
                "learner.hidden_layers",
                "layer widths must be non-zero",
            ));
        }
        if self.learner.batch_size == 0 || self.learner.experience_size == 0 {
            return Err(ConfigError::invalid(
                "learner.batch_size",
                "batch and experience sizes must be non-zero",
            ));
        }
        Ok(())
    }
}

/// Physical layout and actuator limits of the vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadConfig {
    pub mass: f64,
    /// Half-extents of the box used to approximate the inertia tensor.
    pub half_extents: [f64; 3],
    /// Distance of each engine from the body center along local x and z.
    pub engine_offset: f64,
    /// Force produced by an engine at full thrust.
    pub max_thrust: f64,
    /// Thrust change applied by a single action.
    pub engine_increment: f64,
    /// Thrust level every engine is set to on respawn.
    pub hover_bias: f64,
    /// Radius used for contact with the ground.
    pub collision_radius: f64,
}

impl Default for QuadConfig {
    fn default() -> Self {
        let engine_offset = 0.8 + f64::sqrt(6.0 * 0.1 * 0.1);
        let engine_radius = 0.25;
        QuadConfig {
            mass: 10.0,
            half_extents: [
                engine_offset + engine_radius,
                engine_radius,
                engine_offset + engine_radius,
            ],
            engine_offset,
            max_thrust: 8000.0 / 60.0,
            engine_increment: 0.005,
            hover_bias: 0.37,
            collision_radius: engine_radius,
        }
    }
}

impl QuadConfig {
    pub fn half_extents(&self) -> Vector {
        Vector::from(self.half_extents)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Number of raw samples averaged per axis.
    pub window: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig { window: 5 }
    }
}

/// Weights of the reward subscores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardWeights {
    pub rotation_match: f64,
    pub rotate_speed: f64,
    pub angle: f64,
    pub speed: f64,
    pub height: f64,
    /// Penalty subtracted on a terminal tick.
    pub terminal: f64,
    /// Offset subtracted from the rotate-speed and angle sigmoids.
    pub bias: f64,
    pub target_height: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        RewardWeights {
            rotation_match: 1.5,
            rotate_speed: 3.0,
            angle: 1.5,
            speed: 1.0,
            height: 0.2,
            terminal: 8.0,
            bias: 0.2,
            target_height: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeConfig {
    /// Absolute pitch or roll, in radians, past which a tick is terminal.
    pub tilt_limit: f64,
    /// Consecutive terminal ticks tolerated before a forced respawn.
    pub max_dwell_ticks: u32,
    /// Per-tick chance of a respawn regardless of state.
    pub respawn_probability: f64,
    pub spawn_min: [f64; 3],
    pub spawn_max: [f64; 3],
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        EpisodeConfig {
            tilt_limit: PI / 3.0,
            max_dwell_ticks: 15,
            respawn_probability: 0.003,
            spawn_min: [-2.0, 2.0, -2.0],
            spawn_max: [2.0, 6.0, 2.0],
        }
    }
}

impl EpisodeConfig {
    pub fn spawn_bounds(&self) -> (Point, Point) {
        (Point::from(self.spawn_min), Point::from(self.spawn_max))
    }
}

/// Settings of the reference rigid-body world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub gravity: [f64; 3],
    /// Height of the ground plane; `None` removes it.
    pub ground_height: Option<f64>,
    pub restitution: f64,
    /// Fraction of horizontal velocity kept per ground contact.
    pub ground_friction: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            gravity: [0.0, -20.0, 0.0],
            ground_height: Some(-1.0),
            restitution: 0.3,
            ground_friction: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimestepConfig {
    /// Lower bound on the frame rate used to derive the timestep.
    pub min_fps: f64,
}

impl Default for TimestepConfig {
    fn default() -> Self {
        TimestepConfig { min_fps: 30.0 }
    }
}

impl TimestepConfig {
    /// Timestep for one tick at the measured frame rate.
    pub fn timestep(&self, measured_fps: f64) -> f64 {
        1.0 / self.min_fps.max(measured_fps)
    }
}

/// How the controller treats NaN or infinite values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DivergencePolicy {
    /// Let them flow into the learner.
    #[default]
    Tolerate,
    /// Abort the tick with [`ControlError::NonFinite`](crate::error::ControlError::NonFinite).
    FailFast,
}

/// Construction options of the [deep-Q learner](crate::learner::dqn::DeepQLearner).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeepQConfig {
    /// Number of past observations and actions appended to the network input.
    pub temporal_window: usize,
    /// Capacity of the experience replay buffer.
    pub experience_size: usize,
    /// Experiences required before training begins.
    pub start_learn_threshold: usize,
    /// Discount factor.
    pub gamma: f64,
    /// Age at which epsilon reaches its minimum.
    pub learning_steps_total: u64,
    /// Age before which every action is random.
    pub learning_steps_burnin: u64,
    pub epsilon_min: f64,
    pub epsilon_test_time: f64,
    /// Widths of the hidden ReLU layers.
    pub hidden_layers: Vec<usize>,
    pub learning_rate: f64,
    pub momentum: f64,
    pub batch_size: usize,
    pub l2_decay: f64,
}

impl Default for DeepQConfig {
    fn default() -> Self {
        DeepQConfig {
            temporal_window: 4,
            experience_size: 30_000,
            start_learn_threshold: 1000,
            gamma: 0.7,
            learning_steps_total: 200_000,
            learning_steps_burnin: 3000,
            epsilon_min: 0.05,
            epsilon_test_time: 0.05,
            hidden_layers: vec![40, 40],
            learning_rate: 0.001,
            momentum: 0.0,
            batch_size: 12,
            l2_decay: 0.01,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            ControllerConfig::from_json_str(r#"{ "episode": { "max_dwell_ticks": 3 }, "seed": 7 }"#)
                .unwrap();
        assert_eq!(config.episode.max_dwell_ticks, 3);
        assert_eq!(config.episode.respawn_probability, 0.003);
        assert_eq!(config.quad.hover_bias, 0.37);
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn rejects_empty_window() {
        let err = ControllerConfig::from_json_str(r#"{ "estimator": { "window": 0 } }"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "estimator.window",
                ..
            }
        ));
    }

    #[test]
    fn rejects_inverted_spawn_box() {
        let mut config = ControllerConfig::default();
        config.episode.spawn_min = [0.0, 7.0, 0.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn timestep_floors_frame_rate() {
        let timestep = TimestepConfig::default();
        assert_eq!(timestep.timestep(10.0), 1.0 / 30.0);
        assert_eq!(timestep.timestep(60.0), 1.0 / 60.0);
    }
}
