//! Core environment trait and shared types.
//!
//! Every simulation environment (CartPole, MountainCar, Pendulum, ...) and
//! every single-instance wrapper implements the [`Environment`] trait so that
//! the vectorized environments can drive them uniformly.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Box bounds at or beyond this magnitude are treated as unbounded.
///
/// JSON cannot carry infinities, so environments use `f64::MAX` for open axes.
pub const UNBOUNDED: f64 = 1.0e30;

/// A flat observation vector.
pub type Observation = Vec<f64>;

/// An action taken in an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Index into a discrete action space.
    Discrete(usize),
    /// A point in a continuous box action space.
    Continuous(Vec<f64>),
}

/// The set of valid observations or actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Space {
    /// `n` discrete choices, `0..n`.
    Discrete { n: usize },
    /// An axis-aligned box; `low` and `high` have the same length.
    Box { low: Vec<f64>, high: Vec<f64> },
}

impl Space {
    /// A box with the same bound on every axis.
    pub fn uniform_box(dim: usize, low: f64, high: f64) -> Self {
        Self::Box {
            low: vec![low; dim],
            high: vec![high; dim],
        }
    }

    /// Flat dimensionality: `1` for discrete spaces, the box length otherwise.
    pub fn flat_dim(&self) -> usize {
        match self {
            Self::Discrete { .. } => 1,
            Self::Box { low, .. } => low.len(),
        }
    }

    /// Whether `action` is a member of this space.
    pub fn contains(&self, action: &Action) -> bool {
        match (self, action) {
            (Self::Discrete { n }, Action::Discrete(a)) => a < n,
            (Self::Box { low, high }, Action::Continuous(v)) => {
                v.len() == low.len()
                    && v.iter()
                        .zip(low.iter().zip(high))
                        .all(|(x, (lo, hi))| x >= lo && x <= hi)
            }
            _ => false,
        }
    }

    /// Draw a uniformly random action. Unbounded box axes sample from `[-1, 1]`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Action {
        match self {
            Self::Discrete { n } => Action::Discrete(rng.gen_range(0..*n)),
            Self::Box { low, high } => Action::Continuous(
                low.iter()
                    .zip(high)
                    .map(|(&lo, &hi)| {
                        let lo = if lo > -UNBOUNDED { lo } else { -1.0 };
                        let hi = if hi < UNBOUNDED { hi } else { 1.0 };
                        if hi > lo {
                            rng.gen_range(lo..=hi)
                        } else {
                            lo
                        }
                    })
                    .collect(),
            ),
        }
    }

    /// Clip a continuous vector into the box. Discrete spaces return `None`.
    pub fn clip(&self, values: &[f64]) -> Option<Vec<f64>> {
        match self {
            Self::Discrete { .. } => None,
            Self::Box { low, high } => Some(
                values
                    .iter()
                    .zip(low.iter().zip(high))
                    .map(|(x, (lo, hi))| x.max(*lo).min(*hi))
                    .collect(),
            ),
        }
    }
}

/// Observation and action spaces of an environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvSpaces {
    pub observation_space: Space,
    pub action_space: Space,
}

/// The monitor's summary of a finished episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    /// Episode return as reported by the environment itself.
    pub r: f64,
    /// Episode length in steps.
    pub l: usize,
    /// Seconds since the monitor was created.
    pub t: f64,
}

/// Side information attached to a transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    /// The episode ended because a time limit was hit.
    #[serde(default)]
    pub truncated: bool,
    /// Last observation of a finished episode, set when the vectorized env
    /// auto-reset the instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_observation: Option<Observation>,
    /// Monitor summary, present on the last step of an episode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<EpisodeRecord>,
    /// The environment's native reward, set when a reward override replaced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_reward: Option<f64>,
}

/// Result of a single environment step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub observation: Observation,
    pub reward: f64,
    pub done: bool,
    #[serde(default)]
    pub info: StepInfo,
}

/// Errors raised by environments and vectorized environments.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("unknown environment id: {0}")]
    UnknownEnv(String),

    #[error("action {action:?} is not in the action space {space:?}")]
    InvalidAction { action: Action, space: Space },

    #[error("expected {expected} actions, got {got}")]
    BatchSize { expected: usize, got: usize },

    #[error("step called before reset")]
    NeedsReset,

    #[error("environment worker {index} failed: {message}")]
    Worker { index: usize, message: String },
}

/// The core environment trait.
///
/// Implementations are single, sequential simulation instances. The
/// vectorized layer takes care of batching and auto-reset.
pub trait Environment: Send {
    /// The observation and action spaces.
    fn spaces(&self) -> EnvSpaces;

    /// Re-seed the environment's random number generator.
    fn seed(&mut self, seed: u64);

    /// Start a new episode and return its initial observation.
    fn reset(&mut self) -> anyhow::Result<Observation>;

    /// Apply `action` and return the resulting transition.
    fn step(&mut self, action: &Action) -> anyhow::Result<Transition>;

    /// A human-readable frame describing the current state.
    fn render(&self) -> String;

    /// The registry id of the underlying environment (e.g. `"CartPole-v1"`).
    fn id(&self) -> &str;
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    fn spaces(&self) -> EnvSpaces {
        (**self).spaces()
    }

    fn seed(&mut self, seed: u64) {
        (**self).seed(seed)
    }

    fn reset(&mut self) -> anyhow::Result<Observation> {
        (**self).reset()
    }

    fn step(&mut self, action: &Action) -> anyhow::Result<Transition> {
        (**self).step(action)
    }

    fn render(&self) -> String {
        (**self).render()
    }

    fn id(&self) -> &str {
        (**self).id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn discrete_contains_only_in_range_indices() {
        let space = Space::Discrete { n: 3 };
        assert!(space.contains(&Action::Discrete(2)));
        assert!(!space.contains(&Action::Discrete(3)));
        assert!(!space.contains(&Action::Continuous(vec![0.0])));
    }

    #[test]
    fn box_sample_stays_in_bounds() {
        let space = Space::uniform_box(2, -2.0, 2.0);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let a = space.sample(&mut rng);
            assert!(space.contains(&a), "{a:?} escaped {space:?}");
        }
    }

    #[test]
    fn clip_clamps_each_axis() {
        let space = Space::Box {
            low: vec![-1.0, 0.0],
            high: vec![1.0, 5.0],
        };
        assert_eq!(space.clip(&[3.0, -2.0]), Some(vec![1.0, 0.0]));
        assert_eq!(Space::Discrete { n: 2 }.clip(&[1.0]), None);
    }

    #[test]
    fn step_info_omits_empty_fields_on_the_wire() {
        let json = serde_json::to_string(&StepInfo::default()).unwrap();
        assert_eq!(json, r#"{"truncated":false}"#);
    }
}
