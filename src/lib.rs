//! Online reinforcement-learning controller for a simulated quadcopter.
//!
//! A [controller](control::Controller) ties together a [state estimator](estimator), a
//! [reward shaper](rewards), the [action mapping](quad), the [episode manager](episode) and two
//! external collaborators: a [physics world](physics::Physics) and a [learner](learner::Learner).

use nalgebra as na;

pub mod config;
pub mod control;
pub mod episode;
pub mod error;
pub mod estimator;
pub mod learner;
pub mod physics;
pub mod quad;
pub mod rewards;

/// Number of engines on the vehicle.
pub const NUM_ENGINES: usize = 4;
/// Number of discrete actions; an increase and a decrease per engine.
pub const NUM_ACTIONS: usize = NUM_ENGINES * 2;
/// Length of an [`Observation`].
pub const OBS_DIM: usize = 7 + NUM_ENGINES;

pub type Point = na::Point3<f64>;
pub type Vector = na::Vector3<f64>;
pub type Orientation = na::UnitQuaternion<f64>;
/// Flat input handed to the learner each tick.
///
/// Ordered as velocity x and y, pitch rate, roll rate, pitch, roll, height, then the thrust level
/// of each engine.
pub type Observation = na::SVector<f64, OBS_DIM>;

pub use config::ControllerConfig;
pub use control::{Controller, TickReport};
pub use error::{ConfigError, ControlError, LearnerError};
pub use learner::Learner;
