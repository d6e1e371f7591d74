//! Random policy for baselines and smoke tests.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::Policy;
use crate::env::{Action, Observation, Space};

/// Samples every action uniformly from the action space.
pub struct RandomPolicy {
    action_space: Space,
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(action_space: Space, seed: u64) -> Self {
        Self {
            action_space,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Policy for RandomPolicy {
    fn predict(&mut self, observations: &[Observation]) -> Result<Vec<Action>> {
        Ok(observations
            .iter()
            .map(|_| self.action_space.sample(&mut self.rng))
            .collect())
    }

    fn name(&self) -> &str {
        "random"
    }
}
