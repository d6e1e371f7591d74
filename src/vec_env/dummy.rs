//! Sequential, in-process vectorized environment.

use anyhow::{bail, Result};

use super::{step_with_auto_reset, VecEnv, VecStep};
use crate::env::{Action, EnvError, EnvSpaces, Environment, Observation};

/// Steps each instance one after the other on the calling thread.
pub struct DummyVecEnv {
    envs: Vec<Box<dyn Environment>>,
    spaces: EnvSpaces,
    closed: bool,
}

impl DummyVecEnv {
    /// Build from already-constructed instances. All instances must share the
    /// same spaces.
    pub fn new(envs: Vec<Box<dyn Environment>>) -> Result<Self> {
        let Some(first) = envs.first() else {
            bail!("DummyVecEnv needs at least one environment");
        };
        let spaces = first.spaces();
        if let Some(i) = envs.iter().position(|e| e.spaces() != spaces) {
            bail!("environment {i} has different spaces from environment 0");
        }
        Ok(Self {
            envs,
            spaces,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            bail!("vectorized environment is closed");
        }
        Ok(())
    }
}

impl VecEnv for DummyVecEnv {
    fn num_envs(&self) -> usize {
        self.envs.len()
    }

    fn spaces(&self) -> &EnvSpaces {
        &self.spaces
    }

    fn reset(&mut self) -> Result<Vec<Observation>> {
        self.ensure_open()?;
        self.envs.iter_mut().map(|e| e.reset()).collect()
    }

    fn step(&mut self, actions: &[Action]) -> Result<VecStep> {
        self.ensure_open()?;
        if actions.len() != self.envs.len() {
            return Err(EnvError::BatchSize {
                expected: self.envs.len(),
                got: actions.len(),
            }
            .into());
        }

        // A rejected batch must leave every instance untouched.
        if let Some(bad) = actions
            .iter()
            .find(|a| !self.spaces.action_space.contains(a))
        {
            return Err(EnvError::InvalidAction {
                action: bad.clone(),
                space: self.spaces.action_space.clone(),
            }
            .into());
        }

        let mut out = VecStep::with_capacity(self.envs.len());
        for (env, action) in self.envs.iter_mut().zip(actions) {
            out.push(step_with_auto_reset(env, action)?);
        }
        Ok(out)
    }

    fn render(&mut self) -> Result<String> {
        self.ensure_open()?;
        let frames: Vec<String> = self.envs.iter().map(|e| e.render()).collect();
        Ok(frames.join("\n"))
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.envs.clear();
        Ok(())
    }
}
