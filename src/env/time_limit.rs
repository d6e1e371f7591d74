//! Episode length cap.

use anyhow::Result;

use super::traits::{Action, EnvSpaces, Environment, Observation, Transition};

/// Ends an episode after `max_episode_steps` steps, flagging the last
/// transition as truncated when the inner environment had not finished.
pub struct TimeLimit<E> {
    inner: E,
    max_episode_steps: usize,
    elapsed: usize,
}

impl<E: Environment> TimeLimit<E> {
    pub fn new(inner: E, max_episode_steps: usize) -> Self {
        Self {
            inner,
            max_episode_steps,
            elapsed: 0,
        }
    }
}

impl<E: Environment> Environment for TimeLimit<E> {
    fn spaces(&self) -> EnvSpaces {
        self.inner.spaces()
    }

    fn seed(&mut self, seed: u64) {
        self.inner.seed(seed);
    }

    fn reset(&mut self) -> Result<Observation> {
        self.elapsed = 0;
        self.inner.reset()
    }

    fn step(&mut self, action: &Action) -> Result<Transition> {
        let mut transition = self.inner.step(action)?;
        self.elapsed += 1;
        if self.elapsed >= self.max_episode_steps && !transition.done {
            transition.done = true;
            transition.info.truncated = true;
        }
        Ok(transition)
    }

    fn render(&self) -> String {
        self.inner.render()
    }

    fn id(&self) -> &str {
        self.inner.id()
    }
}
