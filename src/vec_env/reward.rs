//! Reward replacement wrapper.

use anyhow::{ensure, Result};

use super::{VecEnv, VecStep};
use crate::env::{Action, EnvError, EnvSpaces, Observation};
use crate::reward::RewardFn;

/// Replaces the rewards of a [`VecEnv`] with the output of a [`RewardFn`].
///
/// The native reward is kept in `info.original_reward`. The reward function
/// sees the true final observation of an episode rather than the auto-reset
/// observation that the inner env returns in its place.
pub struct RewardVecEnvWrapper<V> {
    inner: V,
    reward_fn: Box<dyn RewardFn>,
    last_obs: Option<Vec<Observation>>,
    step_indices: Vec<usize>,
}

impl<V: VecEnv> RewardVecEnvWrapper<V> {
    pub fn new(inner: V, reward_fn: Box<dyn RewardFn>) -> Self {
        let n = inner.num_envs();
        Self {
            inner,
            reward_fn,
            last_obs: None,
            step_indices: vec![0; n],
        }
    }
}

impl<V: VecEnv> VecEnv for RewardVecEnvWrapper<V> {
    fn num_envs(&self) -> usize {
        self.inner.num_envs()
    }

    fn spaces(&self) -> &EnvSpaces {
        self.inner.spaces()
    }

    fn reset(&mut self) -> Result<Vec<Observation>> {
        let obs = self.inner.reset()?;
        self.step_indices.iter_mut().for_each(|i| *i = 0);
        self.last_obs = Some(obs.clone());
        Ok(obs)
    }

    fn step(&mut self, actions: &[Action]) -> Result<VecStep> {
        let Some(prev_obs) = self.last_obs.take() else {
            return Err(EnvError::NeedsReset.into());
        };
        let mut step = self.inner.step(actions)?;

        let next_obs: Vec<Observation> = step
            .observations
            .iter()
            .zip(&step.infos)
            .map(|(obs, info)| info.terminal_observation.as_ref().unwrap_or(obs).clone())
            .collect();

        let rewards = self
            .reward_fn
            .reward(&prev_obs, actions, &next_obs, &self.step_indices)?;
        ensure!(
            rewards.len() == step.len(),
            "reward function `{}` returned {} rewards for {} envs",
            self.reward_fn.name(),
            rewards.len(),
            step.len()
        );

        for (info, (native, replaced)) in step
            .infos
            .iter_mut()
            .zip(step.rewards.iter_mut().zip(rewards))
        {
            info.original_reward = Some(*native);
            *native = replaced;
        }
        for (index, done) in self.step_indices.iter_mut().zip(&step.dones) {
            *index = if *done { 0 } else { *index + 1 };
        }

        self.last_obs = Some(step.observations.clone());
        Ok(step)
    }

    fn render(&mut self) -> Result<String> {
        self.inner.render()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::env::make_env;
    use crate::reward::ConstantReward;
    use crate::vec_env::DummyVecEnv;

    /// Records the step indices it was called with.
    struct StepIndexRecorder(Arc<Mutex<Vec<Vec<usize>>>>);

    impl RewardFn for StepIndexRecorder {
        fn reward(
            &mut self,
            obs: &[Observation],
            _actions: &[Action],
            _next_obs: &[Observation],
            step_indices: &[usize],
        ) -> Result<Vec<f64>> {
            self.0.lock().unwrap().push(step_indices.to_vec());
            Ok(vec![0.0; obs.len()])
        }

        fn name(&self) -> &str {
            "recorder"
        }
    }

    fn venv(n: usize, limit: Option<usize>) -> DummyVecEnv {
        let envs = (0..n)
            .map(|i| make_env("CartPole-v1", i as u64, limit, None).unwrap())
            .collect();
        DummyVecEnv::new(envs).unwrap()
    }

    #[test]
    fn constant_reward_replaces_native_reward() {
        let reward_fn = Box::new(ConstantReward { value: 5.0 });
        let mut env = RewardVecEnvWrapper::new(venv(2, None), reward_fn);
        env.reset().unwrap();
        for _ in 0..20 {
            let step = env
                .step(&[Action::Discrete(0), Action::Discrete(1)])
                .unwrap();
            assert_eq!(step.rewards, vec![5.0, 5.0]);
            assert!(step.infos.iter().all(|i| i.original_reward == Some(1.0)));
        }
    }

    #[test]
    fn step_indices_restart_after_episode_end() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let reward_fn = Box::new(StepIndexRecorder(calls.clone()));
        let mut env = RewardVecEnvWrapper::new(venv(1, Some(3)), reward_fn);
        env.reset().unwrap();
        for _ in 0..5 {
            env.step(&[Action::Discrete(0)]).unwrap();
        }
        let seen: Vec<usize> = calls.lock().unwrap().iter().map(|c| c[0]).collect();
        assert_eq!(seen, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn step_before_reset_fails() {
        let reward_fn = Box::new(ConstantReward { value: 1.0 });
        let mut env = RewardVecEnvWrapper::new(venv(1, None), reward_fn);
        assert!(env.step(&[Action::Discrete(0)]).is_err());
    }
}
