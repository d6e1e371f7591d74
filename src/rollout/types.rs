//! Trajectory data recorded by the rollout engine.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::env::{Action, Observation};

// ---------------------------------------------------------------------------
// Single step
// ---------------------------------------------------------------------------

/// One transition of a trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// The observation the action was chosen from.
    pub observation: Observation,
    pub action: Action,
    /// Reward as seen by the rollout, i.e. after any reward override.
    pub reward: f64,
    /// True only on the last step of the trajectory.
    pub done: bool,
}

// ---------------------------------------------------------------------------
// Full trajectory
// ---------------------------------------------------------------------------

/// A complete episode, from a reset to a done step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub steps: Vec<Step>,
    /// Observation reached after the last action.
    pub final_observation: Observation,
    /// Episode return reported by the environment monitor. Unaffected by
    /// reward overrides.
    pub monitor_return: Option<f64>,
}

impl Trajectory {
    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Undiscounted sum of the recorded rewards.
    pub fn total_return(&self) -> f64 {
        self.steps.iter().map(|s| s.reward).sum()
    }

    /// The trajectory ends on a done step and has no earlier done step.
    pub fn is_complete(&self) -> bool {
        match self.steps.split_last() {
            Some((last, rest)) => last.done && rest.iter().all(|s| !s.done),
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Stopping condition
// ---------------------------------------------------------------------------

/// When to stop collecting trajectories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoppingCondition {
    /// At least this many complete episodes.
    MinEpisodes(usize),
    /// Complete episodes totalling at least this many steps.
    MinTimesteps(usize),
}

impl StoppingCondition {
    /// Build from an evaluation budget. Exactly one of the two must be set
    /// and it must be positive.
    pub fn from_budget(
        n_timesteps: Option<usize>,
        n_episodes: Option<usize>,
    ) -> Result<Self, ConfigError> {
        match (n_timesteps, n_episodes) {
            (Some(_), Some(_)) => Err(ConfigError::BothBudgets),
            (None, None) => Err(ConfigError::NoBudget),
            (Some(0), None) => Err(ConfigError::ZeroBudget {
                field: "eval_n_timesteps",
            }),
            (None, Some(0)) => Err(ConfigError::ZeroBudget {
                field: "eval_n_episodes",
            }),
            (Some(t), None) => Ok(Self::MinTimesteps(t)),
            (None, Some(e)) => Ok(Self::MinEpisodes(e)),
        }
    }

    pub fn is_satisfied(&self, trajectories: &[Trajectory]) -> bool {
        match *self {
            Self::MinEpisodes(n) => trajectories.len() >= n,
            Self::MinTimesteps(n) => {
                trajectories.iter().map(Trajectory::len).sum::<usize>() >= n
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// Per-instance buffers of in-progress episodes.
#[derive(Debug, Default)]
pub struct TrajectoryAccumulator {
    partial: Vec<Vec<Step>>,
}

impl TrajectoryAccumulator {
    pub fn new(num_envs: usize) -> Self {
        Self {
            partial: vec![Vec::new(); num_envs],
        }
    }

    /// Append a step to instance `index`.
    pub fn push(&mut self, index: usize, step: Step) {
        self.partial[index].push(step);
    }

    /// Close instance `index`'s episode and hand back the trajectory.
    pub fn finish(
        &mut self,
        index: usize,
        final_observation: Observation,
        monitor_return: Option<f64>,
    ) -> Trajectory {
        Trajectory {
            steps: std::mem::take(&mut self.partial[index]),
            final_observation,
            monitor_return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn traj(len: usize) -> Trajectory {
        let steps = (0..len)
            .map(|i| Step {
                observation: vec![i as f64],
                action: Action::Discrete(0),
                reward: 1.0,
                done: i + 1 == len,
            })
            .collect();
        Trajectory {
            steps,
            final_observation: vec![len as f64],
            monitor_return: None,
        }
    }

    #[test]
    fn budget_must_name_exactly_one_positive_bound() {
        assert!(matches!(
            StoppingCondition::from_budget(Some(10), Some(2)),
            Err(ConfigError::BothBudgets)
        ));
        assert!(matches!(
            StoppingCondition::from_budget(None, None),
            Err(ConfigError::NoBudget)
        ));
        assert!(StoppingCondition::from_budget(Some(0), None).is_err());
        assert_eq!(
            StoppingCondition::from_budget(None, Some(2)).unwrap(),
            StoppingCondition::MinEpisodes(2)
        );
        assert_eq!(
            StoppingCondition::from_budget(Some(7), None).unwrap(),
            StoppingCondition::MinTimesteps(7)
        );
    }

    #[test]
    fn satisfaction_counts_episodes_or_steps() {
        let done = vec![traj(3), traj(4)];
        assert!(StoppingCondition::MinEpisodes(2).is_satisfied(&done));
        assert!(!StoppingCondition::MinEpisodes(3).is_satisfied(&done));
        assert!(StoppingCondition::MinTimesteps(7).is_satisfied(&done));
        assert!(!StoppingCondition::MinTimesteps(8).is_satisfied(&done));
    }

    #[test]
    fn completeness_requires_a_single_trailing_done() {
        assert!(traj(3).is_complete());
        let mut t = traj(3);
        t.steps[0].done = true;
        assert!(!t.is_complete());
        assert!(!traj(0).is_complete());
    }

    #[test]
    fn accumulator_keeps_instances_apart() {
        let mut acc = TrajectoryAccumulator::new(2);
        for i in 0..3 {
            acc.push(
                i % 2,
                Step {
                    observation: vec![i as f64],
                    action: Action::Discrete(i),
                    reward: 0.5,
                    done: false,
                },
            );
        }
        let t = acc.finish(0, vec![9.0], Some(1.0));
        assert_eq!(t.len(), 2);
        assert_eq!(t.total_return(), 1.0);
        assert_eq!(t.monitor_return, Some(1.0));

        let t = acc.finish(1, vec![8.0], None);
        assert_eq!(t.len(), 1);
        assert_eq!(t.steps[0].action, Action::Discrete(1));
        assert!(acc.finish(0, vec![], None).is_empty());
    }
}
