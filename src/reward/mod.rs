//! Reward functions that can replace an environment's native reward.
//!
//! A reward function sees whole transitions, batched over environment
//! instances: `(obs, action, next_obs, step_index) -> reward`. They are
//! loaded by type tag through
//! [`ArtifactRegistry::load_reward`](crate::artifact::ArtifactRegistry::load_reward)
//! and installed with [`RewardVecEnvWrapper`](crate::vec_env::RewardVecEnvWrapper).

pub mod builtin;

use anyhow::Result;

use crate::env::{Action, Observation};

pub use builtin::{ConstantReward, LinearReward, LinearRewardModel, ZeroReward};

/// Batched reward model. All slices have one entry per environment instance.
pub trait RewardFn: Send {
    /// `step_indices[i]` is the zero-based position of the transition within
    /// its episode.
    fn reward(
        &mut self,
        obs: &[Observation],
        actions: &[Action],
        next_obs: &[Observation],
        step_indices: &[usize],
    ) -> Result<Vec<f64>>;

    fn name(&self) -> &str;
}

impl<R: RewardFn + ?Sized> RewardFn for Box<R> {
    fn reward(
        &mut self,
        obs: &[Observation],
        actions: &[Action],
        next_obs: &[Observation],
        step_indices: &[usize],
    ) -> Result<Vec<f64>> {
        (**self).reward(obs, actions, next_obs, step_indices)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
