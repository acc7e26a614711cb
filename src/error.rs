//! Error types for configuration, learners and the control loop.

use thiserror::Error;

/// Failures while loading or validating a [configuration](crate::config::ControllerConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds a value the controller cannot run with.
    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Failures at the persistence boundary of a [learner](crate::learner::Learner).
#[derive(Error, Debug)]
pub enum LearnerError {
    #[error("malformed learner blob: {0}")]
    Blob(#[from] serde_json::Error),

    /// The blob was produced by a learner with a different network layout.
    #[error("learner blob does not fit this network: expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },
}

/// Failures raised while ticking the [controller](crate::control::Controller).
#[derive(Error, Debug)]
pub enum ControlError {
    /// The learner returned an index outside the action space.
    #[error("learner chose action {action}, but only 0..{} exist", crate::NUM_ACTIONS)]
    ActionOutOfRange { action: usize },

    /// A non-finite value was seen while running with `DivergencePolicy::FailFast`.
    #[error("non-finite value in {stage}")]
    NonFinite { stage: &'static str },

    #[error("controller has been stopped")]
    Stopped,

    #[error(transparent)]
    Learner(#[from] LearnerError),
}
