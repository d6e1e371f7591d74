//! Vectorized environments: N environment instances stepped as one batch.
//!
//! - [`dummy::DummyVecEnv`] steps every instance sequentially in-process.
//! - [`subproc::SubprocVecEnv`] runs each instance in its own OS process and
//!   talks to it over a JSON-lines pipe (see [`worker`]).
//! - [`render::InteractiveRender`] and [`reward::RewardVecEnvWrapper`] wrap
//!   any [`VecEnv`] without changing its episode structure.
//!
//! All implementations auto-reset: when an instance finishes an episode, the
//! returned observation is the first one of its next episode and the final
//! observation is carried in [`StepInfo::terminal_observation`].

pub mod dummy;
pub mod factory;
pub mod render;
pub mod reward;
pub mod subproc;
pub mod worker;

use anyhow::Result;

use crate::env::{Action, EnvSpaces, Environment, Observation, StepInfo, Transition};

pub use dummy::DummyVecEnv;
pub use factory::{make_vec_env, VecEnvOptions};
pub use render::InteractiveRender;
pub use reward::RewardVecEnvWrapper;
pub use subproc::{SubprocVecEnv, WorkerCommand};

/// Batched result of [`VecEnv::step`], one entry per instance.
#[derive(Debug, Clone, Default)]
pub struct VecStep {
    pub observations: Vec<Observation>,
    pub rewards: Vec<f64>,
    pub dones: Vec<bool>,
    pub infos: Vec<StepInfo>,
}

impl VecStep {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            observations: Vec::with_capacity(n),
            rewards: Vec::with_capacity(n),
            dones: Vec::with_capacity(n),
            infos: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, transition: Transition) {
        self.observations.push(transition.observation);
        self.rewards.push(transition.reward);
        self.dones.push(transition.done);
        self.infos.push(transition.info);
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// A batch of environment instances that reset and step together.
pub trait VecEnv {
    /// Number of instances in the batch.
    fn num_envs(&self) -> usize;

    /// Spaces shared by every instance.
    fn spaces(&self) -> &EnvSpaces;

    /// Reset every instance and return their initial observations.
    fn reset(&mut self) -> Result<Vec<Observation>>;

    /// Step every instance with its action. `actions.len()` must equal
    /// [`num_envs`](Self::num_envs).
    fn step(&mut self, actions: &[Action]) -> Result<VecStep>;

    /// Text frames of every instance, one per line.
    fn render(&mut self) -> Result<String>;

    /// Release the instances. Further calls are errors.
    fn close(&mut self) -> Result<()>;
}

impl<V: VecEnv + ?Sized> VecEnv for Box<V> {
    fn num_envs(&self) -> usize {
        (**self).num_envs()
    }

    fn spaces(&self) -> &EnvSpaces {
        (**self).spaces()
    }

    fn reset(&mut self) -> Result<Vec<Observation>> {
        (**self).reset()
    }

    fn step(&mut self, actions: &[Action]) -> Result<VecStep> {
        (**self).step(actions)
    }

    fn render(&mut self) -> Result<String> {
        (**self).render()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Step `env` and, if the episode ended, reset it immediately.
///
/// The returned transition then holds the new episode's first observation,
/// with the real final observation moved into `info.terminal_observation`.
pub fn step_with_auto_reset<E: Environment + ?Sized>(
    env: &mut E,
    action: &Action,
) -> Result<Transition> {
    let mut transition = env.step(action)?;
    if transition.done {
        let first = env.reset()?;
        let terminal = std::mem::replace(&mut transition.observation, first);
        transition.info.terminal_observation = Some(terminal);
    }
    Ok(transition)
}
