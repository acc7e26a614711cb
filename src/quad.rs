//! The vehicle's actuators and the discrete actions that drive them.

use super::{
    config::QuadConfig,
    error::ControlError,
    physics::{BodyHandle, Physics},
    Vector, NUM_ACTIONS, NUM_ENGINES,
};

/// Thrust levels of the four engines, each kept in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Actuators {
    levels: [f64; NUM_ENGINES],
}

impl Actuators {
    /// Constructs actuators with every engine at `level`.
    pub fn uniform(level: f64) -> Self {
        Actuators {
            levels: [level.max(0.0).min(1.0); NUM_ENGINES],
        }
    }

    pub fn levels(&self) -> &[f64; NUM_ENGINES] {
        &self.levels
    }

    /// Thrust level of one engine.
    ///
    /// # Panics
    ///
    /// Panics if `engine` is not below [`NUM_ENGINES`].
    pub fn level(&self, engine: usize) -> f64 {
        self.levels[engine]
    }

    /// Sets an engine's level, clamped to `[0, 1]`.
    ///
    /// # Panics
    ///
    /// Panics if `engine` is not below [`NUM_ENGINES`].
    pub fn set(&mut self, engine: usize, level: f64) {
        self.levels[engine] = level.max(0.0).min(1.0);
    }

    /// Sets every engine to `level`, clamped to `[0, 1]`.
    pub fn fill(&mut self, level: f64) {
        for engine in 0..NUM_ENGINES {
            self.set(engine, level);
        }
    }

    /// Raises an engine's level by `step`; panics like [`set`](Actuators::set).
    pub fn increase(&mut self, engine: usize, step: f64) {
        self.set(engine, self.levels[engine] + step);
    }

    /// Lowers an engine's level by `step`; panics like [`set`](Actuators::set).
    pub fn decrease(&mut self, engine: usize, step: f64) {
        self.set(engine, self.levels[engine] - step);
    }
}

impl Default for Actuators {
    fn default() -> Self {
        Self::uniform(0.0)
    }
}

/// Which way an action moves an engine's thrust.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Increase,
    Decrease,
}

/// One of the eight discrete actions: even indices raise an engine, odd ones lower it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action(usize);

impl Action {
    pub fn index(&self) -> usize {
        self.0
    }

    /// The engine this action adjusts.
    pub fn engine(&self) -> usize {
        self.0 / 2
    }

    pub fn direction(&self) -> Direction {
        if self.0 % 2 == 0 {
            Direction::Increase
        } else {
            Direction::Decrease
        }
    }

    /// Adjusts the actuators by `step`.
    pub fn apply(&self, actuators: &mut Actuators, step: f64) {
        match self.direction() {
            Direction::Increase => actuators.increase(self.engine(), step),
            Direction::Decrease => actuators.decrease(self.engine(), step),
        }
    }
}

impl TryFrom<usize> for Action {
    type Error = ControlError;

    fn try_from(action: usize) -> Result<Self, Self::Error> {
        if action < NUM_ACTIONS {
            Ok(Action(action))
        } else {
            Err(ControlError::ActionOutOfRange { action })
        }
    }
}

/// Engine placement and strength; converts thrust levels into forces on a body.
#[derive(Debug, Clone)]
pub struct QuadFrame {
    engines: [Vector; NUM_ENGINES],
    max_thrust: f64,
    increment: f64,
}

impl QuadFrame {
    pub fn new(config: &QuadConfig) -> Self {
        let o = config.engine_offset;
        QuadFrame {
            engines: [
                Vector::new(o, 0.0, o),
                Vector::new(o, 0.0, -o),
                Vector::new(-o, 0.0, -o),
                Vector::new(-o, 0.0, o),
            ],
            max_thrust: config.max_thrust,
            increment: config.engine_increment,
        }
    }

    /// Local position of an engine relative to the body center.
    pub fn engine_offset(&self, engine: usize) -> Vector {
        self.engines[engine]
    }

    /// Thrust change of a single action.
    pub fn increment(&self) -> f64 {
        self.increment
    }

    /// Pushes each engine's upward thrust onto the body.
    pub fn apply_thrust<P: Physics>(
        &self,
        physics: &mut P,
        body: BodyHandle,
        actuators: &Actuators,
    ) {
        for (point, level) in self.engines.iter().zip(actuators.levels().iter()) {
            let force = Vector::new(0.0, self.max_thrust * level, 0.0);
            physics.apply_local_force(body, force, *point);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn actions_map_to_engines() {
        let mut actuators = Actuators::uniform(0.5);
        Action::try_from(0).unwrap().apply(&mut actuators, 0.005);
        assert!((actuators.level(0) - 0.505).abs() < 1e-12);
        Action::try_from(1).unwrap().apply(&mut actuators, 0.005);
        assert!((actuators.level(0) - 0.5).abs() < 1e-12);

        let last = Action::try_from(7).unwrap();
        assert_eq!(last.engine(), 3);
        assert_eq!(last.direction(), Direction::Decrease);
        last.apply(&mut actuators, 0.005);
        assert!((actuators.level(3) - 0.495).abs() < 1e-12);
        assert_eq!(actuators.level(1), 0.5);
        assert_eq!(actuators.level(2), 0.5);
    }

    #[test]
    fn out_of_range_action_is_rejected() {
        assert!(matches!(
            Action::try_from(8),
            Err(ControlError::ActionOutOfRange { action: 8 })
        ));
    }

    #[test]
    fn levels_stay_clamped() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut actuators = Actuators::uniform(0.37);
        for _ in 0..5000 {
            let action = Action::try_from(rng.gen_range(0..NUM_ACTIONS)).unwrap();
            action.apply(&mut actuators, 0.05);
            assert!(actuators.levels().iter().all(|l| (0.0..=1.0).contains(l)));
        }
        actuators.increase(2, 10.0);
        assert_eq!(actuators.level(2), 1.0);
        actuators.decrease(2, 10.0);
        assert_eq!(actuators.level(2), 0.0);
    }

    #[test]
    #[should_panic]
    fn setting_missing_engine_panics() {
        Actuators::default().set(NUM_ENGINES, 0.5);
    }

    #[test]
    fn engines_sit_on_the_diagonals() {
        let frame = QuadFrame::new(&QuadConfig::default());
        let o = QuadConfig::default().engine_offset;
        assert_eq!(frame.engine_offset(0), Vector::new(o, 0.0, o));
        assert_eq!(frame.engine_offset(2), Vector::new(-o, 0.0, -o));
    }
}
