//! Episode termination and respawn.

use super::{
    config::EpisodeConfig,
    estimator::SmoothedState,
    physics::{BodyHandle, Physics, RawKinematics},
    quad::Actuators,
    Point,
};
use rand::{rngs::StdRng, Rng};

/// Why a respawn happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetCause {
    /// The vehicle stayed past the tilt limit for too many ticks.
    Dwell,
    /// The per-tick random respawn fired.
    Random,
}

/// Outcome of [`EpisodeManager::update`] for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeStatus {
    pub terminal: bool,
    /// Consecutive terminal ticks, including this one.
    pub dwell: u32,
    pub reset: Option<ResetCause>,
}

/// Tracks terminal ticks and decides when to respawn the vehicle.
pub struct EpisodeManager<S: SpawnPolicy> {
    spawn: S,
    tilt_limit: f64,
    max_dwell: u32,
    respawn_probability: f64,
    hover_bias: f64,
    terminal: bool,
    dwell: u32,
    rng: StdRng,
}

impl<S: SpawnPolicy> EpisodeManager<S> {
    pub fn new(config: &EpisodeConfig, hover_bias: f64, spawn: S, rng: StdRng) -> Self {
        EpisodeManager {
            spawn,
            tilt_limit: config.tilt_limit,
            max_dwell: config.max_dwell_ticks,
            respawn_probability: config.respawn_probability,
            hover_bias,
            terminal: false,
            dwell: 0,
            rng,
        }
    }

    /// Whether the current tick is terminal.
    pub fn terminal(&self) -> bool {
        self.terminal
    }

    pub fn dwell(&self) -> u32 {
        self.dwell
    }

    /// Whether a state is past the tilt limit on pitch or roll.
    pub fn is_terminal(&self, state: &SmoothedState) -> bool {
        state.roll.abs() > self.tilt_limit || state.pitch.abs() > self.tilt_limit
    }

    /// Records the terminal flag for a tick and decides whether to respawn.
    ///
    /// The random respawn is only drawn when the dwell limit has not already forced one.
    pub fn update(&mut self, state: &SmoothedState) -> EpisodeStatus {
        self.terminal = self.is_terminal(state);
        if self.terminal {
            self.dwell += 1;
        } else {
            self.dwell = 0;
        }

        let reset = if self.dwell > self.max_dwell {
            Some(ResetCause::Dwell)
        } else if self.rng.gen::<f64>() < self.respawn_probability {
            Some(ResetCause::Random)
        } else {
            None
        };

        EpisodeStatus {
            terminal: self.terminal,
            dwell: self.dwell,
            reset,
        }
    }

    /// Puts the vehicle back upright and at rest at a new spawn point, with engines at hover bias.
    ///
    /// The terminal flag is cleared to match the level vehicle. The dwell counter is left alone;
    /// the next non-terminal tick clears it.
    pub fn respawn<P: Physics>(
        &mut self,
        physics: &mut P,
        body: BodyHandle,
        actuators: &mut Actuators,
    ) -> RawKinematics {
        let kinematics = RawKinematics::at_rest(self.spawn.spawn_point(&mut self.rng));
        physics.set_kinematics(body, kinematics);
        actuators.fill(self.hover_bias);
        self.terminal = false;
        kinematics
    }
}

/// Provides spawn points for respawning vehicles.
pub trait SpawnPolicy {
    fn spawn_point(&self, rng: &mut StdRng) -> Point;
}

/// Spawns uniformly inside an axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnBox {
    pub min: Point,
    pub max: Point,
}

impl SpawnBox {
    pub fn from_config(config: &EpisodeConfig) -> Self {
        let (min, max) = config.spawn_bounds();
        SpawnBox { min, max }
    }

    pub fn contains(&self, point: &Point) -> bool {
        (0..3).all(|i| self.min[i] <= point[i] && point[i] <= self.max[i])
    }
}

impl SpawnPolicy for SpawnBox {
    fn spawn_point(&self, rng: &mut StdRng) -> Point {
        let mut sample = |lo: f64, hi: f64| lo + rng.gen::<f64>() * (hi - lo);
        Point::new(
            sample(self.min.x, self.max.x),
            sample(self.min.y, self.max.y),
            sample(self.min.z, self.max.z),
        )
    }
}

/// Always spawns at the same point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnFixed(pub Point);

impl SpawnPolicy for SpawnFixed {
    fn spawn_point(&self, _rng: &mut StdRng) -> Point {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::WorldConfig,
        physics::{RigidBody, World},
        Orientation, Vector, NUM_ENGINES,
    };
    use rand::SeedableRng;
    use std::f64::consts::PI;

    fn manager(probability: f64) -> EpisodeManager<SpawnBox> {
        let config = EpisodeConfig {
            respawn_probability: probability,
            ..EpisodeConfig::default()
        };
        EpisodeManager::new(
            &config,
            0.37,
            SpawnBox::from_config(&config),
            StdRng::seed_from_u64(5),
        )
    }

    fn tilted(roll: f64, pitch: f64) -> SmoothedState {
        SmoothedState {
            roll,
            pitch,
            ..SmoothedState::default()
        }
    }

    #[test]
    fn terminal_iff_tilt_exceeds_limit() {
        let m = manager(0.0);
        assert!(!m.is_terminal(&tilted(PI / 3.0, 0.0)));
        assert!(m.is_terminal(&tilted(PI / 3.0 + 1e-6, 0.0)));
        assert!(m.is_terminal(&tilted(0.0, -PI / 2.0)));
        assert!(!m.is_terminal(&tilted(-0.5, 0.5)));
    }

    #[test]
    fn dwell_counts_and_clears() {
        let mut m = manager(0.0);
        for expected in 1..=5 {
            let status = m.update(&tilted(1.2, 0.0));
            assert!(status.terminal);
            assert_eq!(status.dwell, expected);
            assert_eq!(status.reset, None);
        }
        let status = m.update(&tilted(0.1, 0.0));
        assert!(!status.terminal);
        assert_eq!(status.dwell, 0);
    }

    #[test]
    fn sixteen_terminal_ticks_force_reset() {
        let mut m = manager(0.0);
        for _ in 0..15 {
            assert_eq!(m.update(&tilted(0.0, 1.2)).reset, None);
        }
        let status = m.update(&tilted(0.0, 1.2));
        assert_eq!(status.dwell, 16);
        assert_eq!(status.reset, Some(ResetCause::Dwell));
    }

    #[test]
    fn random_reset_fires_from_healthy_state() {
        let mut m = manager(1.0);
        let status = m.update(&SmoothedState::default());
        assert!(!status.terminal);
        assert_eq!(status.reset, Some(ResetCause::Random));
    }

    #[test]
    fn respawn_levels_vehicle_inside_box() {
        let mut m = manager(0.0);
        let mut world = World::new(&WorldConfig::default());
        let body = world.add_body(RigidBody::new(10.0, Vector::new(1.0, 0.25, 1.0), 0.25));
        let mut actuators = Actuators::uniform(0.9);
        let bounds = SpawnBox::from_config(&EpisodeConfig::default());

        for _ in 0..100 {
            let mut raw = world.kinematics(body);
            raw.orientation = Orientation::from_axis_angle(&Vector::x_axis(), 1.0);
            raw.angular_velocity = Vector::new(1.0, 2.0, 3.0);
            raw.linear_velocity = Vector::new(-4.0, 0.0, 1.0);
            world.set_kinematics(body, raw);

            let kin = m.respawn(&mut world, body, &mut actuators);
            assert_eq!(world.kinematics(body), kin);
            assert!(bounds.contains(&kin.position));
            assert_eq!(kin.orientation, Orientation::identity());
            assert_eq!(kin.linear_velocity, Vector::zeros());
            assert_eq!(kin.angular_velocity, Vector::zeros());
            assert_eq!(actuators.levels(), &[0.37; NUM_ENGINES]);
        }
    }

    #[test]
    fn respawn_keeps_dwell() {
        let mut m = manager(0.0);
        let mut world = World::new(&WorldConfig::default());
        let body = world.add_body(RigidBody::new(10.0, Vector::new(1.0, 0.25, 1.0), 0.25));
        let mut actuators = Actuators::default();
        for _ in 0..16 {
            m.update(&tilted(1.5, 0.0));
        }
        assert!(m.terminal());
        m.respawn(&mut world, body, &mut actuators);
        assert!(!m.terminal());
        assert_eq!(m.dwell(), 16);
        assert_eq!(m.update(&SmoothedState::default()).dwell, 0);
    }
}
