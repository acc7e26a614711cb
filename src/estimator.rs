//! Turns raw per-tick kinematics into smoothed observations of the [vehicle](crate::quad).

use super::{physics::RawKinematics, Orientation, Vector};
use nalgebra as na;
use std::{collections::VecDeque, f64::consts::PI};

/// Folds an angle towards `[-π, π]` in steps of π.
///
/// Note the step is π, not 2π: an angle just past π lands near 0 rather than near -π.
/// Non-finite inputs are returned unchanged.
pub fn wrap_angle(x: f64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let mut x = x;
    if x < -PI {
        x += PI * ((-PI - x) / PI).ceil();
    }
    if x > PI {
        x -= PI * ((x - PI) / PI).ceil();
    }
    // Rounding in the bulk shift may leave one step to go.
    while x < -PI {
        x += PI;
    }
    while x > PI {
        x -= PI;
    }
    x
}

/// Builds a rotation from intrinsic Euler angles applied in y, z, x order.
///
/// `angles.x` is pitch, `angles.y` is yaw and `angles.z` is roll.
pub fn from_euler_yzx(angles: &Vector) -> Orientation {
    Orientation::from_axis_angle(&Vector::y_axis(), angles.y)
        * Orientation::from_axis_angle(&Vector::z_axis(), angles.z)
        * Orientation::from_axis_angle(&Vector::x_axis(), angles.x)
}

/// Decomposes a rotation into intrinsic Euler angles in y, z, x order.
///
/// Returns (pitch, yaw, roll) as (x, y, z). At the ±90° roll singularity, pitch is reported as 0.
pub fn euler_yzx(rotation: &Orientation) -> Vector {
    let m = rotation.to_rotation_matrix().into_inner();
    let m21 = m[(1, 0)];
    let roll = m21.max(-1.0).min(1.0).asin();
    if m21.abs() < 0.999_999_9 {
        let pitch = (-m[(1, 2)]).atan2(m[(1, 1)]);
        let yaw = (-m[(2, 0)]).atan2(m[(0, 0)]);
        Vector::new(pitch, yaw, roll)
    } else {
        let yaw = m[(0, 2)].atan2(m[(2, 2)]);
        Vector::new(0.0, yaw, roll)
    }
}

/// A bounded window of samples, most recent first.
#[derive(Debug, Clone)]
pub struct SmoothingWindow {
    samples: VecDeque<Vector>,
    capacity: usize,
}

impl SmoothingWindow {
    pub fn new(capacity: usize) -> Self {
        SmoothingWindow {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Pushes a sample to the front, dropping the oldest past capacity.
    pub fn push(&mut self, sample: Vector) {
        self.samples.push_front(sample);
        self.samples.truncate(self.capacity);
    }

    /// Arithmetic mean of the samples present; zero when empty.
    pub fn mean(&self) -> Vector {
        if self.samples.is_empty() {
            return Vector::zeros();
        }
        let n = self.samples.len() as f64;
        self.samples.iter().fold(Vector::zeros(), |acc, s| acc + s / n)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Filtered view of the vehicle for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SmoothedState {
    pub velocity: Vector,
    pub pitch_rate: f64,
    pub yaw_rate: f64,
    pub roll_rate: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
    pub height: f64,
}

impl SmoothedState {
    pub fn is_finite(&self) -> bool {
        self.velocity.iter().all(|v| v.is_finite())
            && [
                self.pitch_rate,
                self.yaw_rate,
                self.roll_rate,
                self.pitch,
                self.yaw,
                self.roll,
                self.height,
            ]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Moving-average estimator over linear and body-frame angular velocity.
#[derive(Debug, Clone)]
pub struct StateEstimator {
    velocities: SmoothingWindow,
    angular: SmoothingWindow,
    state: SmoothedState,
}

impl StateEstimator {
    /// Constructs an estimator averaging over `window` samples per axis.
    pub fn new(window: usize) -> Self {
        StateEstimator {
            velocities: SmoothingWindow::new(window),
            angular: SmoothingWindow::new(window),
            state: SmoothedState::default(),
        }
    }

    /// Folds one raw sample into the windows and returns the refreshed estimate.
    pub fn observe(&mut self, raw: &RawKinematics) -> SmoothedState {
        self.velocities.push(raw.linear_velocity);
        self.angular.push(Self::local_rates(raw));

        let rates = self.angular.mean().map(wrap_angle);
        let angles = euler_yzx(&raw.orientation).map(wrap_angle);
        self.state = SmoothedState {
            velocity: self.velocities.mean(),
            pitch_rate: rates.x,
            yaw_rate: rates.y,
            roll_rate: rates.z,
            pitch: angles.x,
            yaw: angles.y,
            roll: angles.z,
            height: raw.position.y,
        };
        self.state
    }

    /// The most recent estimate.
    pub fn current(&self) -> &SmoothedState {
        &self.state
    }

    /// Forgets all samples, so the next episode ramps up from scratch.
    pub fn reset(&mut self) {
        self.velocities.clear();
        self.angular.clear();
    }

    /// Expresses the raw angular velocity in the vehicle's frame as (pitch, yaw, roll) rates.
    ///
    /// The angular velocity is treated as Euler angles, composed with the current orientation and
    /// decomposed again in the same order.
    fn local_rates(raw: &RawKinematics) -> Vector {
        let spin: na::UnitQuaternion<f64> = from_euler_yzx(&raw.angular_velocity);
        euler_yzx(&(spin * raw.orientation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn wrap_stays_in_range_and_is_idempotent() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..10_000 {
            let x = rng.gen_range(-10.0 * PI..=10.0 * PI);
            let wrapped = wrap_angle(x);
            assert!((-PI..=PI).contains(&wrapped), "{} -> {}", x, wrapped);
            assert_eq!(wrap_angle(wrapped), wrapped);
        }
    }

    #[test]
    fn wrap_steps_by_half_turns() {
        assert_eq!(wrap_angle(1.0), 1.0);
        assert!((wrap_angle(PI + 0.5) - 0.5).abs() < 1e-12);
        assert!((wrap_angle(-PI - 0.5) + 0.5).abs() < 1e-12);
        assert!(wrap_angle(f64::NAN).is_nan());
        assert_eq!(wrap_angle(f64::INFINITY), f64::INFINITY);
    }

    #[test]
    fn window_ramps_up_then_converges() {
        let mut window = SmoothingWindow::new(5);
        let sample = Vector::new(1.0, -2.0, 3.0);
        for _ in 0..3 {
            window.push(Vector::zeros());
        }
        for tick in 0..10 {
            window.push(sample);
            assert!(window.len() <= 5);
            if tick >= 4 {
                assert_eq!(window.mean(), sample);
            }
        }
    }

    #[test]
    fn window_averages_partial_fill() {
        let mut window = SmoothingWindow::new(5);
        window.push(Vector::new(2.0, 0.0, 0.0));
        window.push(Vector::new(4.0, 0.0, 0.0));
        assert_eq!(window.mean().x, 3.0);
    }

    #[test]
    fn euler_round_trips() {
        let angles = Vector::new(0.3, -0.7, 0.4);
        let back = euler_yzx(&from_euler_yzx(&angles));
        assert!((back - angles).norm() < 1e-9);
    }

    #[test]
    fn level_body_reads_level() {
        let mut estimator = StateEstimator::new(5);
        let mut raw = RawKinematics::at_rest(Point::new(0.0, 1.5, 0.0));
        raw.linear_velocity = Vector::new(1.0, 0.0, 0.0);
        let state = estimator.observe(&raw);
        assert_eq!(state.velocity, raw.linear_velocity);
        assert_eq!(state.height, 1.5);
        assert_eq!((state.pitch, state.yaw, state.roll), (0.0, 0.0, 0.0));
        assert_eq!((state.pitch_rate, state.roll_rate), (0.0, 0.0));
    }

    #[test]
    fn rolled_body_reports_roll() {
        let mut estimator = StateEstimator::new(5);
        let mut raw = RawKinematics::at_rest(Point::origin());
        raw.orientation = Orientation::from_axis_angle(&Vector::z_axis(), 0.5);
        let state = estimator.observe(&raw);
        assert!((state.roll - 0.5).abs() < 1e-9);
        assert!(state.pitch.abs() < 1e-9);
    }

    #[test]
    fn reset_restarts_ramp_up() {
        let mut estimator = StateEstimator::new(5);
        let mut raw = RawKinematics::at_rest(Point::origin());
        raw.linear_velocity = Vector::new(5.0, 0.0, 0.0);
        estimator.observe(&raw);
        estimator.reset();
        raw.linear_velocity = Vector::zeros();
        assert_eq!(estimator.observe(&raw).velocity, Vector::zeros());
    }
}
