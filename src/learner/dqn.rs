//! Deep Q-learning with a temporal input window and experience replay.

use super::{
    net::{SgdTrainer, ValueNet},
    Learner,
};
use crate::{config::DeepQConfig, error::LearnerError, Observation, NUM_ACTIONS, OBS_DIM};
use nalgebra::DVector;
use rand::{rngs::StdRng, Rng};
use std::collections::VecDeque;

/// A single transition stored for replay.
#[derive(Debug, Clone)]
struct Experience {
    state0: DVector<f64>,
    action0: usize,
    reward0: f64,
    state1: DVector<f64>,
}

/// Q-learner over a window of recent observations and actions.
///
/// The network sees the current observation plus the previous `temporal_window` observations and
/// one-hot actions. Until that window has filled, actions are random and nothing is stored.
pub struct DeepQLearner {
    config: DeepQConfig,
    net: ValueNet,
    trainer: SgdTrainer,
    rng: StdRng,
    window_size: usize,
    state_window: VecDeque<Observation>,
    action_window: VecDeque<usize>,
    reward_window: VecDeque<f64>,
    net_window: VecDeque<DVector<f64>>,
    experience: Vec<Experience>,
    forward_passes: u64,
    age: u64,
    epsilon: f64,
    learning: bool,
    latest_loss: Option<f64>,
}

impl DeepQLearner {
    pub fn new(config: DeepQConfig, mut rng: StdRng) -> Self {
        let tw = config.temporal_window;
        let inputs = OBS_DIM * (tw + 1) + NUM_ACTIONS * tw;
        let net = ValueNet::new(inputs, &config.hidden_layers, NUM_ACTIONS, &mut rng);
        let trainer = SgdTrainer::new(
            &net,
            config.learning_rate,
            config.momentum,
            config.l2_decay,
            config.batch_size,
        );
        let window_size = tw.max(2);
        DeepQLearner {
            net,
            trainer,
            rng,
            window_size,
            state_window: (0..window_size).map(|_| Observation::zeros()).collect(),
            action_window: (0..window_size).map(|_| 0).collect(),
            reward_window: (0..window_size).map(|_| 0.0).collect(),
            net_window: (0..window_size).map(|_| DVector::zeros(0)).collect(),
            experience: Vec::new(),
            forward_passes: 0,
            age: 0,
            epsilon: 1.0,
            learning: true,
            latest_loss: None,
            config,
        }
    }

    /// Enables or disables training; when disabled, exploration drops to the test-time rate.
    pub fn set_learning(&mut self, learning: bool) {
        self.learning = learning;
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Number of updates received while learning.
    pub fn age(&self) -> u64 {
        self.age
    }

    pub fn experience_len(&self) -> usize {
        self.experience.len()
    }

    /// Mean loss of the most recent training batch.
    pub fn latest_loss(&self) -> Option<f64> {
        self.latest_loss
    }

    /// Width of the network input.
    pub fn input_width(&self) -> usize {
        self.net.inputs()
    }

    /// Concatenates the current observation with the windowed history.
    fn net_input(&self, observation: &Observation) -> DVector<f64> {
        let mut input = Vec::with_capacity(self.net.inputs());
        input.extend(observation.iter());
        let n = self.window_size;
        for k in 0..self.config.temporal_window {
            input.extend(self.state_window[n - 1 - k].iter());
            let mut one_hot = [0.0; NUM_ACTIONS];
            one_hot[self.action_window[n - 1 - k]] = OBS_DIM as f64;
            input.extend(one_hot.iter());
        }
        DVector::from_vec(input)
    }

    /// Best action and its value.
    fn policy(&self, input: &DVector<f64>) -> (usize, f64) {
        let values = self.net.forward(input);
        let best = values.imax();
        (best, values[best])
    }

    fn random_action(&mut self) -> usize {
        self.rng.gen_range(0..NUM_ACTIONS)
    }

    fn update_epsilon(&mut self) {
        self.epsilon = if self.learning {
            let burnin = self.config.learning_steps_burnin as f64;
            let span = (self.config.learning_steps_total as f64 - burnin).max(1.0);
            let decayed = 1.0 - (self.age as f64 - burnin) / span;
            decayed.max(self.config.epsilon_min).min(1.0)
        } else {
            self.config.epsilon_test_time
        };
    }

    fn remember(&mut self, experience: Experience) {
        if self.experience.len() < self.config.experience_size {
            self.experience.push(experience);
        } else {
            let slot = self.rng.gen_range(0..self.experience.len());
            self.experience[slot] = experience;
        }
    }

    fn train_batch(&mut self) {
        let mut total = 0.0;
        for _ in 0..self.config.batch_size {
            let e = &self.experience[self.rng.gen_range(0..self.experience.len())];
            let (_, next_value) = self.policy(&e.state1);
            let target = e.reward0 + self.config.gamma * next_value;
            let (input, action) = (e.state0.clone(), e.action0);
            total += self.trainer.train(&mut self.net, &input, action, target);
        }
        self.latest_loss = Some(total / self.config.batch_size as f64);
    }
}

impl Learner for DeepQLearner {
    fn decide(&mut self, observation: &Observation) -> usize {
        self.forward_passes += 1;
        let tw = self.config.temporal_window as u64;

        let (input, action) = if self.forward_passes > tw {
            let input = self.net_input(observation);
            self.update_epsilon();
            let action = if self.rng.gen::<f64>() < self.epsilon {
                self.random_action()
            } else {
                self.policy(&input).0
            };
            (input, action)
        } else {
            (DVector::zeros(0), self.random_action())
        };

        self.net_window.pop_front();
        self.net_window.push_back(input);
        self.state_window.pop_front();
        self.state_window.push_back(*observation);
        self.action_window.pop_front();
        self.action_window.push_back(action);
        action
    }

    fn update(&mut self, training_error: f64) {
        self.reward_window.pop_front();
        self.reward_window.push_back(training_error);
        if !self.learning {
            return;
        }

        self.age += 1;
        if self.age == self.config.learning_steps_burnin {
            log::info!("learner finished burn-in after {} steps", self.age);
        }

        let n = self.window_size;
        if self.forward_passes > self.config.temporal_window as u64 + 1 {
            let experience = Experience {
                state0: self.net_window[n - 2].clone(),
                action0: self.action_window[n - 2],
                reward0: self.reward_window[n - 2],
                state1: self.net_window[n - 1].clone(),
            };
            self.remember(experience);
        }

        if self.experience.len() > self.config.start_learn_threshold {
            self.train_batch();
        }
    }

    fn snapshot(&self) -> Result<String, LearnerError> {
        Ok(serde_json::to_string(&self.net)?)
    }

    fn restore(&mut self, blob: &str) -> Result<(), LearnerError> {
        self.net = self.net.load_compatible(blob)?;
        Ok(())
    }
}
