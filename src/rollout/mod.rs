//! Rollout engine: runs a policy in a vectorized environment until a
//! [`StoppingCondition`] is met, and summarizes the result.
//!
//! - [`types::Trajectory`] and [`types::Step`] record what happened.
//! - [`generate_trajectories`] drives the policy/environment loop.
//! - [`stats::rollout_stats`] reduces trajectories to summary statistics.

pub mod stats;
pub mod types;

use anyhow::{ensure, Context, Result};

use crate::policy::Policy;
use crate::vec_env::VecEnv;

pub use stats::{rollout_stats, RolloutStats, StatsError};
pub use types::{Step, StoppingCondition, Trajectory, TrajectoryAccumulator};

/// Run `policy` in `venv` and collect complete trajectories until `stop`
/// holds.
///
/// Once `stop` is satisfied, every instance that finishes an episode is
/// retired. Instances that are still mid-episode keep stepping until their
/// current episode ends, so no partial trajectory is ever returned. A retired
/// instance may keep being stepped alongside the others but nothing it does
/// is recorded.
pub fn generate_trajectories(
    policy: &mut dyn Policy,
    venv: &mut dyn VecEnv,
    stop: StoppingCondition,
) -> Result<Vec<Trajectory>> {
    let num_envs = venv.num_envs();
    let mut observations = venv.reset().context("failed to reset environment")?;
    let mut accumulator = TrajectoryAccumulator::new(num_envs);
    let mut trajectories = Vec::new();
    let mut active = vec![true; num_envs];
    let mut steps_taken = 0usize;

    while active.iter().any(|&a| a) {
        let actions = policy
            .predict(&observations)
            .with_context(|| format!("policy `{}` failed to predict", policy.name()))?;
        ensure!(
            actions.len() == num_envs,
            "policy `{}` returned {} actions for {num_envs} environments",
            policy.name(),
            actions.len()
        );

        let step = venv.step(&actions)?;
        ensure!(
            step.len() == num_envs,
            "environment returned {} results for {num_envs} actions",
            step.len()
        );
        steps_taken += 1;

        let mut finished = vec![false; num_envs];
        for (i, action) in actions.into_iter().enumerate() {
            if !active[i] {
                continue;
            }
            let done = step.dones[i];
            accumulator.push(
                i,
                Step {
                    observation: std::mem::take(&mut observations[i]),
                    action,
                    reward: step.rewards[i],
                    done,
                },
            );
            if done {
                let info = &step.infos[i];
                let final_observation = info
                    .terminal_observation
                    .clone()
                    .unwrap_or_else(|| step.observations[i].clone());
                let monitor_return = info.episode.as_ref().map(|e| e.r);
                trajectories.push(accumulator.finish(i, final_observation, monitor_return));
                finished[i] = true;
            }
        }

        if stop.is_satisfied(&trajectories) {
            for (a, f) in active.iter_mut().zip(&finished) {
                *a &= !f;
            }
        }
        observations = step.observations;
    }

    tracing::debug!(
        trajectories = trajectories.len(),
        vec_steps = steps_taken,
        "rollout finished"
    );
    Ok(trajectories)
}

#[cfg(test)]
pub(crate) mod tests {
    use anyhow::bail;

    use super::*;
    use crate::env::{Action, EnvSpaces, Observation, Space, StepInfo};
    use crate::policy::ZeroPolicy;
    use crate::vec_env::VecStep;

    /// Instance `i` runs episodes of exactly `lengths[i]` steps with reward 1.
    pub(crate) struct FixedLengthVecEnv {
        lengths: Vec<usize>,
        t: Vec<usize>,
        spaces: EnvSpaces,
        pub(crate) closed: bool,
    }

    impl FixedLengthVecEnv {
        pub(crate) fn new(lengths: Vec<usize>) -> Self {
            let n = lengths.len();
            Self {
                lengths,
                t: vec![0; n],
                spaces: EnvSpaces {
                    observation_space: Space::uniform_box(2, 0.0, 1000.0),
                    action_space: Space::Discrete { n: 2 },
                },
                closed: false,
            }
        }

        fn obs(&self, i: usize) -> Observation {
            vec![i as f64, self.t[i] as f64]
        }
    }

    impl VecEnv for FixedLengthVecEnv {
        fn num_envs(&self) -> usize {
            self.lengths.len()
        }

        fn spaces(&self) -> &EnvSpaces {
            &self.spaces
        }

        fn reset(&mut self) -> Result<Vec<Observation>> {
            self.t.iter_mut().for_each(|t| *t = 0);
            Ok((0..self.num_envs()).map(|i| self.obs(i)).collect())
        }

        fn step(&mut self, actions: &[Action]) -> Result<VecStep> {
            let mut out = VecStep::with_capacity(actions.len());
            for i in 0..self.num_envs() {
                self.t[i] += 1;
                let done = self.t[i] == self.lengths[i];
                let mut info = StepInfo::default();
                if done {
                    info.terminal_observation = Some(self.obs(i));
                    self.t[i] = 0;
                }
                out.observations.push(self.obs(i));
                out.rewards.push(1.0);
                out.dones.push(done);
                out.infos.push(info);
            }
            Ok(out)
        }

        fn render(&mut self) -> Result<String> {
            Ok(String::new())
        }

        fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    struct BadBatchPolicy;

    impl Policy for BadBatchPolicy {
        fn predict(&mut self, _observations: &[Observation]) -> Result<Vec<Action>> {
            Ok(vec![Action::Discrete(0)])
        }

        fn name(&self) -> &str {
            "bad-batch"
        }
    }

    struct FailingPolicy;

    impl Policy for FailingPolicy {
        fn predict(&mut self, _observations: &[Observation]) -> Result<Vec<Action>> {
            bail!("no weights")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn zero_policy() -> ZeroPolicy {
        ZeroPolicy::new(&Space::Discrete { n: 2 })
    }

    #[test]
    fn episode_budget_yields_at_least_k_complete_trajectories() {
        let mut venv = FixedLengthVecEnv::new(vec![2, 3, 5]);
        let trajs = generate_trajectories(
            &mut zero_policy(),
            &mut venv,
            StoppingCondition::MinEpisodes(5),
        )
        .unwrap();
        assert!(trajs.len() >= 5);
        assert!(trajs.iter().all(Trajectory::is_complete));
    }

    #[test]
    fn timestep_budget_yields_at_least_t_steps() {
        let mut venv = FixedLengthVecEnv::new(vec![4, 7]);
        let trajs = generate_trajectories(
            &mut zero_policy(),
            &mut venv,
            StoppingCondition::MinTimesteps(10),
        )
        .unwrap();
        let total: usize = trajs.iter().map(Trajectory::len).sum();
        assert!(total >= 10);
        assert!(trajs.iter().all(Trajectory::is_complete));
    }

    #[test]
    fn in_flight_episodes_are_finished_after_the_budget_is_met() {
        // Instance 0 crosses the budget at step 6 and retires; instance 1 is
        // mid-episode and must run to step 10.
        let mut venv = FixedLengthVecEnv::new(vec![3, 10]);
        let trajs = generate_trajectories(
            &mut zero_policy(),
            &mut venv,
            StoppingCondition::MinTimesteps(4),
        )
        .unwrap();
        let mut lens: Vec<usize> = trajs.iter().map(Trajectory::len).collect();
        lens.sort_unstable();
        assert_eq!(lens, vec![3, 3, 10]);
    }

    #[test]
    fn final_observation_is_the_terminal_one() {
        let mut venv = FixedLengthVecEnv::new(vec![2]);
        let trajs = generate_trajectories(
            &mut zero_policy(),
            &mut venv,
            StoppingCondition::MinEpisodes(1),
        )
        .unwrap();
        assert_eq!(trajs[0].final_observation, vec![0.0, 2.0]);
        assert_eq!(trajs[0].steps[0].observation, vec![0.0, 0.0]);
        assert_eq!(trajs[0].steps[1].observation, vec![0.0, 1.0]);
    }

    #[test]
    fn policy_batch_size_mismatch_is_an_error() {
        let mut venv = FixedLengthVecEnv::new(vec![2, 2]);
        let err = generate_trajectories(
            &mut BadBatchPolicy,
            &mut venv,
            StoppingCondition::MinEpisodes(1),
        )
        .unwrap_err();
        assert!(err.to_string().contains("returned 1 actions"));
    }

    #[test]
    fn policy_errors_propagate() {
        let mut venv = FixedLengthVecEnv::new(vec![2]);
        let result = generate_trajectories(
            &mut FailingPolicy,
            &mut venv,
            StoppingCondition::MinEpisodes(1),
        );
        assert!(result.is_err());
    }

    #[test]
    fn real_environment_trajectories_carry_monitor_returns() {
        use crate::env::make_env;
        use crate::vec_env::DummyVecEnv;

        let envs = (0..2)
            .map(|i| make_env("CartPole-v1", i, Some(20), None).unwrap())
            .collect();
        let mut venv = DummyVecEnv::new(envs).unwrap();
        let trajs = generate_trajectories(
            &mut zero_policy(),
            &mut venv,
            StoppingCondition::MinEpisodes(3),
        )
        .unwrap();
        assert!(trajs.len() >= 3);
        for t in &trajs {
            assert!(t.is_complete());
            assert_eq!(t.monitor_return, Some(t.total_return()));
        }
    }
}
