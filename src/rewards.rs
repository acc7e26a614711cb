//! Reward shaping for hovering flight.

use super::{config::RewardWeights, estimator::SmoothedState};

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Subscores making up a reward, plus the combined value in both of its forms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardBreakdown {
    /// Rewards low pitch and roll rates.
    pub rotate_speed: f64,
    /// Rewards a level attitude.
    pub angle: f64,
    /// Rewards angular velocity that already opposes the tilt.
    pub rotation_match: f64,
    pub speed: f64,
    pub height: f64,
    pub terminal: bool,
    /// Weighted sum fed to training. Unbounded.
    pub training: f64,
    /// `tanh` of the training value, for display only.
    pub diagnostic: f64,
}

impl RewardBreakdown {
    /// The terminal flag as it appears on a diagnostic display.
    pub fn terminal_signal(&self) -> f64 {
        if self.terminal {
            -1.0
        } else {
            0.0
        }
    }

    /// Named values for a diagnostic display, combined score first.
    pub fn diagnostics(&self) -> [(&'static str, f64); 7] {
        [
            ("overall", self.diagnostic),
            ("rotate_speed", self.rotate_speed),
            ("rotation_match", self.rotation_match),
            ("angle", self.angle),
            ("speed", self.speed),
            ("height", self.height),
            ("terminal", self.terminal_signal()),
        ]
    }
}

/// Scores a smoothed state.
#[derive(Debug, Clone)]
pub struct RewardShaper {
    weights: RewardWeights,
}

impl RewardShaper {
    pub fn new(weights: RewardWeights) -> Self {
        RewardShaper { weights }
    }

    /// Computes every subscore and both forms of the combined reward.
    pub fn score(&self, state: &SmoothedState, terminal: bool) -> RewardBreakdown {
        let w = &self.weights;
        let sq = |x: f64| x * x;

        let rotate_speed = -w.bias + sigmoid(-sq(state.roll_rate) - sq(state.pitch_rate));
        let angle = -w.bias + sigmoid(-sq(state.roll) - sq(state.pitch));
        let rotation_match =
            (-state.roll * state.roll_rate).tanh() + (-state.pitch * state.pitch_rate).tanh();
        let speed = sigmoid(-state.velocity.norm_squared());
        let height = sigmoid(-sq(state.height - w.target_height));
        let dead = if terminal { 1.0 } else { 0.0 };

        let training = w.rotation_match * rotation_match
            + w.rotate_speed * rotate_speed
            + w.angle * angle
            + w.speed * speed
            + w.height * height
            - w.terminal * dead;

        RewardBreakdown {
            rotate_speed,
            angle,
            rotation_match,
            speed,
            height,
            terminal,
            training,
            diagnostic: training.tanh(),
        }
    }
}

impl Default for RewardShaper {
    fn default() -> Self {
        Self::new(RewardWeights::default())
    }
}
