//! Environment registry: maps ids such as `"CartPole-v1"` to constructors and
//! their default episode-length caps.

use std::path::Path;

use anyhow::Result;

use super::cartpole::{self, CartPoleEnv};
use super::monitor::Monitor;
use super::mountain_car::{self, MountainCarEnv};
use super::pendulum::{self, PendulumEnv};
use super::time_limit::TimeLimit;
use super::traits::{EnvError, Environment};

/// Registry entry for one environment id.
#[derive(Debug, Clone, Copy)]
pub struct EnvSpec {
    pub id: &'static str,
    /// Time limit applied when the caller does not set one.
    pub max_episode_steps: Option<usize>,
    entry: fn() -> Box<dyn Environment>,
}

impl EnvSpec {
    /// Build the bare environment, without time limit or monitor.
    pub fn make(&self) -> Box<dyn Environment> {
        (self.entry)()
    }
}

fn make_cartpole() -> Box<dyn Environment> {
    Box::new(CartPoleEnv::new())
}

fn make_mountain_car() -> Box<dyn Environment> {
    Box::new(MountainCarEnv::new())
}

fn make_pendulum() -> Box<dyn Environment> {
    Box::new(PendulumEnv::new())
}

const REGISTRY: &[EnvSpec] = &[
    EnvSpec {
        id: cartpole::ID,
        max_episode_steps: Some(500),
        entry: make_cartpole,
    },
    EnvSpec {
        id: mountain_car::ID,
        max_episode_steps: Some(200),
        entry: make_mountain_car,
    },
    EnvSpec {
        id: pendulum::ID,
        max_episode_steps: Some(200),
        entry: make_pendulum,
    },
];

/// Look up an environment id.
pub fn spec(id: &str) -> Result<&'static EnvSpec, EnvError> {
    REGISTRY
        .iter()
        .find(|s| s.id == id)
        .ok_or_else(|| EnvError::UnknownEnv(id.to_string()))
}

/// All registered environment ids.
pub fn ids() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|s| s.id)
}

/// Build one fully wrapped environment instance.
///
/// The stack is `raw env -> TimeLimit -> Monitor`. An explicit
/// `max_episode_steps` overrides the registry default. `monitor_path` is the
/// monitor's base path (see [`Monitor::new`]).
pub fn make_env(
    id: &str,
    seed: u64,
    max_episode_steps: Option<usize>,
    monitor_path: Option<&Path>,
) -> Result<Box<dyn Environment>> {
    let spec = spec(id)?;
    let mut env = spec.make();
    env.seed(seed);

    let env: Box<dyn Environment> = match max_episode_steps.or(spec.max_episode_steps) {
        Some(limit) => Box::new(TimeLimit::new(env, limit)),
        None => env,
    };
    Ok(Box::new(Monitor::new(env, monitor_path)?))
}
