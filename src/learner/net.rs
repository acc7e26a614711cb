//! A small fully-connected value network and its SGD trainer.

use crate::error::LearnerError;
use nalgebra::{DMatrix, DVector};
use rand::{rngs::StdRng, Rng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Dense {
    weights: DMatrix<f64>,
    bias: DVector<f64>,
}

impl Dense {
    fn shape(&self) -> (usize, usize) {
        self.weights.shape()
    }
}

/// ReLU hidden layers followed by a linear output layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ValueNet {
    layers: Vec<Dense>,
}

impl ValueNet {
    /// Constructs a network with randomly initialized weights.
    ///
    /// Weights are uniform with variance `1 / inputs`; hidden biases start slightly positive so
    /// ReLUs begin active.
    pub fn new(inputs: usize, hidden: &[usize], outputs: usize, rng: &mut StdRng) -> Self {
        let mut widths = Vec::with_capacity(hidden.len() + 2);
        widths.push(inputs);
        widths.extend_from_slice(hidden);
        widths.push(outputs);

        let depth = widths.len() - 1;
        let layers = widths
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let (n_in, n_out) = (w[0], w[1]);
                let scale = (3.0 / n_in as f64).sqrt();
                Dense {
                    weights: DMatrix::from_fn(n_out, n_in, |_, _| rng.gen_range(-scale..=scale)),
                    bias: DVector::from_element(n_out, if i + 1 < depth { 0.1 } else { 0.0 }),
                }
            })
            .collect();
        ValueNet { layers }
    }

    pub fn inputs(&self) -> usize {
        self.layers.first().map_or(0, |l| l.weights.ncols())
    }

    /// Output values for an input.
    pub fn forward(&self, input: &DVector<f64>) -> DVector<f64> {
        self.activations(input).pop().unwrap_or_else(|| input.clone())
    }

    /// The input followed by every layer's output.
    fn activations(&self, input: &DVector<f64>) -> Vec<DVector<f64>> {
        let mut acts = Vec::with_capacity(self.layers.len() + 1);
        acts.push(input.clone());
        for (i, layer) in self.layers.iter().enumerate() {
            let z = &layer.weights * &acts[i] + &layer.bias;
            let a = if i + 1 < self.layers.len() {
                z.map(|v| v.max(0.0))
            } else {
                z
            };
            acts.push(a);
        }
        acts
    }

    /// Layer shapes, for comparing against a restored network.
    fn describe(&self) -> String {
        let shapes: Vec<String> = self
            .layers
            .iter()
            .map(|l| {
                let (rows, cols) = l.shape();
                format!("{}x{}", rows, cols)
            })
            .collect();
        format!("[{}]", shapes.join(", "))
    }

    /// Parses a serialized network and checks it has this network's shape.
    pub fn load_compatible(&self, blob: &str) -> Result<ValueNet, LearnerError> {
        let net: ValueNet = serde_json::from_str(blob)?;
        let fits = net.layers.len() == self.layers.len()
            && net
                .layers
                .iter()
                .zip(self.layers.iter())
                .all(|(a, b)| a.shape() == b.shape() && a.bias.len() == b.bias.len());
        if fits {
            Ok(net)
        } else {
            Err(LearnerError::ShapeMismatch {
                expected: self.describe(),
                found: net.describe(),
            })
        }
    }
}

/// Mini-batch SGD with momentum and L2 decay on weights.
///
/// Gradients from [`train`](SgdTrainer::train) accumulate and are applied once every
/// `batch_size` samples.
#[derive(Debug, Clone)]
pub(crate) struct SgdTrainer {
    learning_rate: f64,
    momentum: f64,
    l2_decay: f64,
    batch_size: usize,
    samples: usize,
    grads: Vec<Dense>,
    velocity: Vec<Dense>,
}

impl SgdTrainer {
    pub fn new(
        net: &ValueNet,
        learning_rate: f64,
        momentum: f64,
        l2_decay: f64,
        batch_size: usize,
    ) -> Self {
        let zeros: Vec<Dense> = net
            .layers
            .iter()
            .map(|l| {
                let (rows, cols) = l.shape();
                Dense {
                    weights: DMatrix::zeros(rows, cols),
                    bias: DVector::zeros(rows),
                }
            })
            .collect();
        SgdTrainer {
            learning_rate,
            momentum,
            l2_decay,
            batch_size: batch_size.max(1),
            samples: 0,
            grads: zeros.clone(),
            velocity: zeros,
        }
    }

    /// Regresses output `dim` towards `target`, returning the squared-error loss.
    pub fn train(
        &mut self,
        net: &mut ValueNet,
        input: &DVector<f64>,
        dim: usize,
        target: f64,
    ) -> f64 {
        let acts = net.activations(input);
        let out = &acts[acts.len() - 1];
        let err = out[dim] - target;
        let mut delta = DVector::zeros(out.len());
        delta[dim] = err;

        for i in (0..net.layers.len()).rev() {
            self.grads[i].weights += &delta * acts[i].transpose();
            self.grads[i].bias += &delta;
            if i > 0 {
                let mask = acts[i].map(|a| if a > 0.0 { 1.0 } else { 0.0 });
                delta = (net.layers[i].weights.transpose() * &delta).component_mul(&mask);
            }
        }

        self.samples += 1;
        if self.samples % self.batch_size == 0 {
            self.apply(net);
        }
        0.5 * err * err
    }

    fn apply(&mut self, net: &mut ValueNet) {
        let n = self.batch_size as f64;
        for ((layer, grad), vel) in net
            .layers
            .iter_mut()
            .zip(self.grads.iter_mut())
            .zip(self.velocity.iter_mut())
        {
            let gw = (&layer.weights * self.l2_decay + &grad.weights) / n;
            let gb = &grad.bias / n;
            if self.momentum > 0.0 {
                vel.weights = &vel.weights * self.momentum - gw * self.learning_rate;
                vel.bias = &vel.bias * self.momentum - gb * self.learning_rate;
                layer.weights += &vel.weights;
                layer.bias += &vel.bias;
            } else {
                layer.weights -= gw * self.learning_rate;
                layer.bias -= gb * self.learning_rate;
            }
            grad.weights.fill(0.0);
            grad.bias.fill(0.0);
        }
    }
}
