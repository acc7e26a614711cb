//! The per-tick control loop.

use super::{
    config::{ControllerConfig, DivergencePolicy},
    episode::{EpisodeManager, EpisodeStatus, ResetCause, SpawnBox, SpawnPolicy},
    error::ControlError,
    estimator::{SmoothedState, StateEstimator},
    learner::Learner,
    physics::{BodyHandle, Physics},
    quad::{Action, Actuators, QuadFrame},
    rewards::{RewardBreakdown, RewardShaper},
    Observation,
};
use rand::{rngs::StdRng, SeedableRng};
use std::time::{Duration, Instant};

/// What happened during one [tick](Controller::tick).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub action: Action,
    /// Reward before the action was applied.
    pub captured: RewardBreakdown,
    /// Reward after the physics step.
    pub post: RewardBreakdown,
    /// `post.training - captured.training`, as given to the learner.
    pub training_error: f64,
    pub episode: EpisodeStatus,
}

/// Drives one vehicle and one learner through the estimate, decide, act, step and learn cycle.
///
/// The vehicle's body lives in the physics world; the controller holds only its handle.
pub struct Controller<P: Physics, L: Learner, S: SpawnPolicy = SpawnBox> {
    physics: P,
    body: BodyHandle,
    learner: L,
    frame: QuadFrame,
    actuators: Actuators,
    estimator: StateEstimator,
    shaper: RewardShaper,
    episode: EpisodeManager<S>,
    divergence: DivergencePolicy,
    ticks: u64,
    resets: u64,
    stopped: bool,
}

impl<P: Physics, L: Learner> Controller<P, L, SpawnBox> {
    /// Constructs a controller that respawns inside the configured box.
    pub fn new(config: &ControllerConfig, physics: P, body: BodyHandle, learner: L) -> Self {
        let spawn = SpawnBox::from_config(&config.episode);
        Self::with_spawn(config, physics, body, learner, spawn)
    }
}

impl<P: Physics, L: Learner, S: SpawnPolicy> Controller<P, L, S> {
    /// Constructs a controller with a custom spawn policy.
    ///
    /// Engines start at zero thrust and the estimator is primed with the body's current state.
    pub fn with_spawn(
        config: &ControllerConfig,
        physics: P,
        body: BodyHandle,
        learner: L,
        spawn: S,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut estimator = StateEstimator::new(config.estimator.window);
        estimator.observe(&physics.kinematics(body));
        Controller {
            body,
            learner,
            frame: QuadFrame::new(&config.quad),
            actuators: Actuators::default(),
            estimator,
            shaper: RewardShaper::new(config.reward.clone()),
            episode: EpisodeManager::new(&config.episode, config.quad.hover_bias, spawn, rng),
            divergence: config.divergence,
            ticks: 0,
            resets: 0,
            stopped: false,
            physics,
        }
    }

    /// The learner's input for the current state.
    pub fn observation(&self) -> Observation {
        let s = self.estimator.current();
        let mut obs = Observation::zeros();
        let head = [
            s.velocity.x,
            s.velocity.y,
            s.pitch_rate,
            s.roll_rate,
            s.pitch,
            s.roll,
            s.height,
        ];
        for (i, v) in head.iter().chain(self.actuators.levels().iter()).enumerate() {
            obs[i] = *v;
        }
        obs
    }

    /// Reward breakdown of the current state, for display.
    pub fn diagnostics(&self) -> RewardBreakdown {
        self.shaper
            .score(self.estimator.current(), self.episode.terminal())
    }

    /// Runs one tick with timestep `dt`.
    ///
    /// Steps run in a fixed order: observe, score, decide, act, integrate, re-estimate, update
    /// the episode, score again, and train on the reward change.
    pub fn tick(&mut self, dt: f64) -> Result<TickReport, ControlError> {
        if self.stopped {
            return Err(ControlError::Stopped);
        }

        let observation = self.observation();
        self.check_finite("observation", observation.iter().all(|v| v.is_finite()))?;
        let captured = self
            .shaper
            .score(self.estimator.current(), self.episode.terminal());

        let action = Action::try_from(self.learner.decide(&observation))?;
        action.apply(&mut self.actuators, self.frame.increment());

        self.frame
            .apply_thrust(&mut self.physics, self.body, &self.actuators);
        self.physics.step(dt);

        let raw = self.physics.kinematics(self.body);
        self.check_finite("kinematics", raw.is_finite())?;
        let state = self.estimator.observe(&raw);
        let episode = self.episode.update(&state);
        if let Some(cause) = episode.reset {
            self.respawn(cause);
        }

        let post = self.shaper.score(&state, episode.terminal);
        let training_error = post.training - captured.training;
        self.check_finite("reward", training_error.is_finite())?;
        self.learner.update(training_error);

        self.ticks += 1;
        log::trace!(
            "tick {}: action {} error {:.4} terminal {}",
            self.ticks,
            action.index(),
            training_error,
            episode.terminal
        );
        Ok(TickReport {
            action,
            captured,
            post,
            training_error,
            episode,
        })
    }

    /// Respawns the vehicle and restarts the estimator from the new state.
    fn respawn(&mut self, cause: ResetCause) {
        let kin = self
            .episode
            .respawn(&mut self.physics, self.body, &mut self.actuators);
        self.estimator.reset();
        self.estimator.observe(&kin);
        self.resets += 1;
        log::debug!(
            "respawn #{} ({:?}) at ({:.2}, {:.2}, {:.2})",
            self.resets,
            cause,
            kin.position.x,
            kin.position.y,
            kin.position.z
        );
    }

    /// Under [`DivergencePolicy::FailFast`], stops the controller on a non-finite value.
    fn check_finite(&mut self, stage: &'static str, finite: bool) -> Result<(), ControlError> {
        match (finite, self.divergence) {
            (false, DivergencePolicy::FailFast) => {
                log::warn!("non-finite {} on tick {}", stage, self.ticks + 1);
                self.stop();
                Err(ControlError::NonFinite { stage })
            }
            _ => Ok(()),
        }
    }

    /// Serializes the learner's parameters.
    pub fn snapshot(&self) -> Result<String, ControlError> {
        Ok(self.learner.snapshot()?)
    }

    /// Loads learner parameters from a [snapshot](Controller::snapshot).
    pub fn restore(&mut self, blob: &str) -> Result<(), ControlError> {
        self.learner.restore(blob).map_err(|e| {
            log::warn!("rejected learner snapshot: {}", e);
            ControlError::from(e)
        })
    }

    /// Stops the controller; later ticks fail with [`ControlError::Stopped`].
    pub fn stop(&mut self) {
        if !self.stopped {
            log::info!(
                "controller stopped after {} ticks and {} respawns",
                self.ticks,
                self.resets
            );
        }
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Stops the controller and hands back its collaborators.
    pub fn into_parts(mut self) -> (P, L) {
        self.stop();
        (self.physics, self.learner)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn resets(&self) -> u64 {
        self.resets
    }

    pub fn actuators(&self) -> &Actuators {
        &self.actuators
    }

    pub fn state(&self) -> &SmoothedState {
        self.estimator.current()
    }

    pub fn physics(&self) -> &P {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut P {
        &mut self.physics
    }

    pub fn learner(&self) -> &L {
        &self.learner
    }

    pub fn learner_mut(&mut self) -> &mut L {
        &mut self.learner
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    /// Current thrust level of an engine.
    ///
    /// # Panics
    ///
    /// Panics if `engine` is not below [`NUM_ENGINES`](crate::NUM_ENGINES).
    pub fn thrust(&self, engine: usize) -> f64 {
        self.actuators.level(engine)
    }
}

/// Measures the frame rate over one-second intervals.
#[derive(Debug, Clone)]
pub struct FrameClock {
    started: Instant,
    frames: u32,
    fps: f64,
}

impl FrameClock {
    pub fn new() -> Self {
        FrameClock {
            started: Instant::now(),
            frames: 0,
            fps: 0.0,
        }
    }

    /// Counts a frame and returns the last measured rate.
    pub fn frame(&mut self) -> f64 {
        self.frame_at(Instant::now())
    }

    /// Counts a frame seen at `now`.
    pub fn frame_at(&mut self, now: Instant) -> f64 {
        self.frames += 1;
        if now.duration_since(self.started) >= Duration::from_secs(1) {
            self.fps = f64::from(self.frames);
            self.frames = 0;
            self.started = now;
        }
        self.fps
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
