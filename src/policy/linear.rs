//! Linear policy loaded from a JSON artifact.
//!
//! ```json
//! { "weights": [[0.0, 0.0, 1.0, 0.5], [0.0, 0.0, -1.0, -0.5]], "bias": [0.0, 0.0] }
//! ```
//!
//! `weights` has one row per action output and one column per observation
//! feature. Discrete action spaces take the argmax output; box action spaces
//! use the outputs directly, clipped into the bounds.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::Policy;
use crate::env::{Action, EnvSpaces, Observation, Space};

/// Dense affine map `y = W x + b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

impl LinearModel {
    pub fn output_dim(&self) -> usize {
        self.weights.len()
    }

    pub fn input_dim(&self) -> usize {
        self.weights.first().map_or(0, Vec::len)
    }

    /// Check the model against the environment it will drive. Returns a
    /// description of the first mismatch.
    pub fn check_shape(&self, spaces: &EnvSpaces) -> Result<(), String> {
        let expected_out = match &spaces.action_space {
            Space::Discrete { n } => *n,
            Space::Box { low, .. } => low.len(),
        };
        let expected_in = spaces.observation_space.flat_dim();

        if self.output_dim() != expected_out {
            return Err(format!(
                "weights have {} rows, action space needs {expected_out}",
                self.output_dim()
            ));
        }
        if self.bias.len() != expected_out {
            return Err(format!(
                "bias has {} entries, action space needs {expected_out}",
                self.bias.len()
            ));
        }
        if let Some(row) = self.weights.iter().position(|r| r.len() != expected_in) {
            return Err(format!(
                "weight row {row} has {} columns, observation space has {expected_in}",
                self.weights[row].len()
            ));
        }
        Ok(())
    }

    pub fn forward(&self, x: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(x).map(|(w, xi)| w * xi).sum::<f64>() + b)
            .collect()
    }
}

pub struct LinearPolicy {
    model: LinearModel,
    action_space: Space,
}

impl LinearPolicy {
    /// The model's shape must already have been checked against `action_space`.
    pub fn new(model: LinearModel, action_space: Space) -> Self {
        Self {
            model,
            action_space,
        }
    }
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        })
        .0
}

impl Policy for LinearPolicy {
    fn predict(&mut self, observations: &[Observation]) -> Result<Vec<Action>> {
        let input_dim = self.model.input_dim();
        observations
            .iter()
            .map(|obs| {
                if obs.len() != input_dim {
                    bail!(
                        "observation has {} features, policy expects {input_dim}",
                        obs.len()
                    );
                }
                let out = self.model.forward(obs);
                Ok(match self.action_space.clip(&out) {
                    Some(clipped) => Action::Continuous(clipped),
                    None => Action::Discrete(argmax(&out)),
                })
            })
            .collect()
    }

    fn name(&self) -> &str {
        "linear"
    }
}
