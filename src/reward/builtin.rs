//! Built-in reward functions.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use super::RewardFn;
use crate::env::{Action, EnvSpaces, Observation, Space};

/// Zero reward for every transition.
pub struct ZeroReward;

impl RewardFn for ZeroReward {
    fn reward(
        &mut self,
        obs: &[Observation],
        _actions: &[Action],
        _next_obs: &[Observation],
        _step_indices: &[usize],
    ) -> Result<Vec<f64>> {
        Ok(vec![0.0; obs.len()])
    }

    fn name(&self) -> &str {
        "zero"
    }
}

/// The same reward for every transition. Artifact: `{ "value": 5.0 }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstantReward {
    pub value: f64,
}

impl RewardFn for ConstantReward {
    fn reward(
        &mut self,
        obs: &[Observation],
        _actions: &[Action],
        _next_obs: &[Observation],
        _step_indices: &[usize],
    ) -> Result<Vec<f64>> {
        Ok(vec![self.value; obs.len()])
    }

    fn name(&self) -> &str {
        "constant"
    }
}

/// Artifact for [`LinearReward`]:
/// `r = obs_weights . s + act_weights . a + next_obs_weights . s' + bias`.
///
/// Discrete actions enter as a one-hot vector of length `n`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRewardModel {
    pub obs_weights: Vec<f64>,
    pub act_weights: Vec<f64>,
    pub next_obs_weights: Vec<f64>,
    #[serde(default)]
    pub bias: f64,
}

impl LinearRewardModel {
    /// Check the weight lengths against the environment's spaces.
    pub fn check_shape(&self, spaces: &EnvSpaces) -> Result<(), String> {
        let obs_dim = spaces.observation_space.flat_dim();
        let act_dim = action_feature_dim(&spaces.action_space);
        for (name, len, want) in [
            ("obs_weights", self.obs_weights.len(), obs_dim),
            ("act_weights", self.act_weights.len(), act_dim),
            ("next_obs_weights", self.next_obs_weights.len(), obs_dim),
        ] {
            if len != want {
                return Err(format!("{name} has {len} entries, expected {want}"));
            }
        }
        Ok(())
    }
}

fn action_feature_dim(space: &Space) -> usize {
    match space {
        Space::Discrete { n } => *n,
        Space::Box { low, .. } => low.len(),
    }
}

fn dot(w: &[f64], x: &[f64]) -> f64 {
    w.iter().zip(x).map(|(a, b)| a * b).sum()
}

/// Linear reward over `(s, a, s')`.
pub struct LinearReward {
    model: LinearRewardModel,
}

impl LinearReward {
    /// The model's shape must already have been checked.
    pub fn new(model: LinearRewardModel) -> Self {
        Self { model }
    }

    fn action_term(&self, action: &Action) -> Result<f64> {
        let w = &self.model.act_weights;
        match action {
            Action::Discrete(a) => {
                ensure!(*a < w.len(), "discrete action {a} outside one-hot width {}", w.len());
                Ok(w[*a])
            }
            Action::Continuous(v) => Ok(dot(w, v)),
        }
    }
}

impl RewardFn for LinearReward {
    fn reward(
        &mut self,
        obs: &[Observation],
        actions: &[Action],
        next_obs: &[Observation],
        _step_indices: &[usize],
    ) -> Result<Vec<f64>> {
        ensure!(
            obs.len() == actions.len() && obs.len() == next_obs.len(),
            "batch sizes differ: {} obs, {} actions, {} next obs",
            obs.len(),
            actions.len(),
            next_obs.len()
        );
        obs.iter()
            .zip(actions)
            .zip(next_obs)
            .map(|((s, a), s_next)| {
                Ok(dot(&self.model.obs_weights, s)
                    + self.action_term(a)?
                    + dot(&self.model.next_obs_weights, s_next)
                    + self.model.bias)
            })
            .collect()
    }

    fn name(&self) -> &str {
        "linear"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_reward_fills_the_batch() {
        let mut r = ConstantReward { value: 5.0 };
        let out = r
            .reward(&[vec![0.0], vec![1.0]], &[], &[], &[0, 0])
            .unwrap();
        assert_eq!(out, vec![5.0, 5.0]);
    }

    #[test]
    fn linear_reward_one_hot_encodes_discrete_actions() {
        let model = LinearRewardModel {
            obs_weights: vec![1.0, 0.0],
            act_weights: vec![0.0, 10.0],
            next_obs_weights: vec![0.0, 2.0],
            bias: 0.5,
        };
        let spaces = EnvSpaces {
            observation_space: Space::uniform_box(2, -1.0, 1.0),
            action_space: Space::Discrete { n: 2 },
        };
        model.check_shape(&spaces).unwrap();

        let mut r = LinearReward::new(model);
        let out = r
            .reward(
                &[vec![1.0, 0.0], vec![0.0, 0.0]],
                &[Action::Discrete(1), Action::Discrete(0)],
                &[vec![0.0, 1.0], vec![0.0, 0.0]],
                &[0, 3],
            )
            .unwrap();
        assert_eq!(out, vec![1.0 + 10.0 + 2.0 + 0.5, 0.5]);
    }

    #[test]
    fn linear_reward_shape_mismatch() {
        let model = LinearRewardModel {
            obs_weights: vec![1.0],
            act_weights: vec![0.0, 0.0],
            next_obs_weights: vec![0.0, 0.0],
            bias: 0.0,
        };
        let spaces = EnvSpaces {
            observation_space: Space::uniform_box(2, -1.0, 1.0),
            action_space: Space::Discrete { n: 2 },
        };
        let err = model.check_shape(&spaces).unwrap_err();
        assert!(err.starts_with("obs_weights"));
    }
}
