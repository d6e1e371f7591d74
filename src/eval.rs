//! Policy evaluation: build the environment, load the artifacts, roll out,
//! and summarize.

use anyhow::{Context, Result};

use crate::artifact::{ArtifactRegistry, LoadContext};
use crate::config::EvalPolicyConfig;
use crate::policy::Policy;
use crate::reward::RewardFn;
use crate::rollout::{
    generate_trajectories, rollout_stats, RolloutStats, StoppingCondition, Trajectory,
};
use crate::vec_env::{make_vec_env, InteractiveRender, RewardVecEnvWrapper, VecEnv, VecEnvOptions};

/// Evaluate the configured policy and return rollout statistics.
///
/// The budget is validated before anything is built. The environment is
/// closed and the policy and reward function are released whether or not
/// the rollout succeeds.
pub fn eval_policy(
    config: &EvalPolicyConfig,
    registry: &ArtifactRegistry,
) -> Result<RolloutStats> {
    config.validate()?;

    let mut config = config.clone();
    let (seed, log_dir) = config.resolve();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log dir {}", log_dir.display()))?;
    tracing::info!(
        env_name = %config.env_name,
        seed,
        log_dir = %log_dir.display(),
        "evaluating policy"
    );

    let venv = make_vec_env(&VecEnvOptions {
        env_id: &config.env_name,
        num_vec: config.num_vec,
        seed,
        parallel: config.parallel,
        log_dir: Some(&log_dir),
        max_episode_steps: config.max_episode_steps,
    })?;

    let trajectories = evaluate(venv, &config, seed, registry)?;
    let stats = rollout_stats(&trajectories)?;
    tracing::info!(
        n_traj = stats.n_traj,
        return_mean = stats.return_mean,
        return_std = stats.return_std,
        len_mean = stats.len_mean,
        "evaluation finished"
    );
    Ok(stats)
}

/// Run the configured policy in an already-built `venv`.
///
/// Takes ownership of `venv` and always closes it.
pub fn evaluate(
    mut venv: Box<dyn VecEnv>,
    config: &EvalPolicyConfig,
    seed: u64,
    registry: &ArtifactRegistry,
) -> Result<Vec<Trajectory>> {
    let loaded = StoppingCondition::from_budget(config.eval_n_timesteps, config.eval_n_episodes)
        .map_err(anyhow::Error::from)
        .and_then(|stop| {
            let ctx = LoadContext {
                spaces: venv.spaces().clone(),
                seed,
            };
            let (policy, reward_fn) = load_artifacts(config, registry, &ctx)?;
            Ok((stop, policy, reward_fn))
        });
    let (stop, mut policy, reward_fn) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            close_after_error(venv.as_mut());
            return Err(e);
        }
    };

    if config.render {
        venv = Box::new(InteractiveRender::new(venv, config.render_fps));
    }
    if let Some(reward_fn) = reward_fn {
        tracing::info!(reward_fn = reward_fn.name(), "overriding environment reward");
        venv = Box::new(RewardVecEnvWrapper::new(venv, reward_fn));
    }

    let outcome = generate_trajectories(policy.as_mut(), venv.as_mut(), stop);
    drop(policy);

    match outcome {
        Ok(trajectories) => {
            venv.close().context("failed to close environment")?;
            Ok(trajectories)
        }
        Err(e) => {
            close_after_error(venv.as_mut());
            Err(e)
        }
    }
}

fn load_artifacts(
    config: &EvalPolicyConfig,
    registry: &ArtifactRegistry,
    ctx: &LoadContext,
) -> Result<(Box<dyn Policy>, Option<Box<dyn RewardFn>>)> {
    let reward_fn = match &config.reward_type {
        Some(reward_type) => Some(
            registry
                .load_reward(reward_type, config.reward_path.as_deref(), ctx)
                .with_context(|| format!("failed to load reward `{reward_type}`"))?,
        ),
        None => None,
    };
    let policy = registry
        .load_policy(&config.policy_type, config.policy_path.as_deref(), ctx)
        .with_context(|| format!("failed to load policy `{}`", config.policy_type))?;
    Ok((policy, reward_fn))
}

/// Close `venv` when an error is already on its way out; a second failure is
/// only logged.
fn close_after_error(venv: &mut dyn VecEnv) {
    if let Err(e) = venv.close() {
        tracing::warn!(error = %e, "failed to close environment after error");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use anyhow::bail;

    use super::*;
    use crate::env::{Action, EnvSpaces, Observation, Space};
    use crate::rollout::tests::FixedLengthVecEnv;
    use crate::vec_env::VecStep;

    /// Counts drops so tests can check that artifacts are released.
    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingPolicy(#[allow(dead_code)] DropCounter);

    impl Policy for CountingPolicy {
        fn predict(&mut self, observations: &[Observation]) -> Result<Vec<Action>> {
            Ok(vec![Action::Discrete(0); observations.len()])
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    struct CountingReward(#[allow(dead_code)] DropCounter);

    impl RewardFn for CountingReward {
        fn reward(
            &mut self,
            obs: &[Observation],
            _actions: &[Action],
            _next_obs: &[Observation],
            _step_indices: &[usize],
        ) -> Result<Vec<f64>> {
            Ok(vec![5.0; obs.len()])
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    /// Fails on the `fail_at`-th step; records whether it was closed.
    struct FailingVecEnv {
        spaces: EnvSpaces,
        steps: usize,
        fail_at: usize,
        closed: Arc<AtomicUsize>,
    }

    impl VecEnv for FailingVecEnv {
        fn num_envs(&self) -> usize {
            1
        }

        fn spaces(&self) -> &EnvSpaces {
            &self.spaces
        }

        fn reset(&mut self) -> Result<Vec<Observation>> {
            Ok(vec![vec![0.0]])
        }

        fn step(&mut self, _actions: &[Action]) -> Result<VecStep> {
            self.steps += 1;
            if self.steps >= self.fail_at {
                bail!("simulator crashed");
            }
            let mut out = VecStep::with_capacity(1);
            out.observations.push(vec![0.0]);
            out.rewards.push(1.0);
            out.dones.push(false);
            out.infos.push(Default::default());
            Ok(out)
        }

        fn render(&mut self) -> Result<String> {
            Ok(String::new())
        }

        fn close(&mut self) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Counters {
        policy: Arc<AtomicUsize>,
        reward: Arc<AtomicUsize>,
    }

    fn counting_registry() -> (ArtifactRegistry, Counters) {
        let counters = Counters {
            policy: Arc::new(AtomicUsize::new(0)),
            reward: Arc::new(AtomicUsize::new(0)),
        };
        let mut registry = ArtifactRegistry::default();
        let policy_drops = counters.policy.clone();
        registry.register_policy("counting", move |_, _| {
            Ok(Box::new(CountingPolicy(DropCounter(policy_drops.clone()))))
        });
        let reward_drops = counters.reward.clone();
        registry.register_reward("counting", move |_, _| {
            Ok(Box::new(CountingReward(DropCounter(reward_drops.clone()))))
        });
        (registry, counters)
    }

    fn counting_config() -> EvalPolicyConfig {
        EvalPolicyConfig {
            eval_n_timesteps: None,
            eval_n_episodes: Some(2),
            render: false,
            policy_type: "counting".into(),
            reward_type: Some("counting".into()),
            ..Default::default()
        }
    }

    #[test]
    fn artifacts_released_once_and_env_closed_when_rollout_fails() {
        let (registry, counters) = counting_registry();
        let closed = Arc::new(AtomicUsize::new(0));
        let venv = Box::new(FailingVecEnv {
            spaces: EnvSpaces {
                observation_space: Space::uniform_box(1, -1.0, 1.0),
                action_space: Space::Discrete { n: 2 },
            },
            steps: 0,
            fail_at: 3,
            closed: closed.clone(),
        });

        let err = evaluate(venv, &counting_config(), 0, &registry).unwrap_err();
        assert!(format!("{err:#}").contains("simulator crashed"));
        assert_eq!(counters.policy.load(Ordering::SeqCst), 1);
        assert_eq!(counters.reward.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reward_override_applies_to_every_recorded_step() {
        let (registry, counters) = counting_registry();
        let venv = Box::new(FixedLengthVecEnv::new(vec![3, 4]));
        let trajs = evaluate(venv, &counting_config(), 0, &registry).unwrap();
        assert!(trajs.len() >= 2);
        assert!(trajs.iter().flat_map(|t| &t.steps).all(|s| s.reward == 5.0));
        assert_eq!(counters.policy.load(Ordering::SeqCst), 1);
        assert_eq!(counters.reward.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn load_failure_still_closes_the_env() {
        let (registry, counters) = counting_registry();
        let closed = Arc::new(AtomicUsize::new(0));
        let venv = Box::new(FailingVecEnv {
            spaces: EnvSpaces {
                observation_space: Space::uniform_box(1, -1.0, 1.0),
                action_space: Space::Discrete { n: 2 },
            },
            steps: 0,
            fail_at: usize::MAX,
            closed: closed.clone(),
        });
        let config = EvalPolicyConfig {
            policy_type: "no-such-policy".into(),
            ..counting_config()
        };
        assert!(evaluate(venv, &config, 0, &registry).is_err());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        // The reward was loaded before the policy failed and is already gone.
        assert_eq!(counters.reward.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn budget_is_checked_before_anything_is_built() {
        let config = EvalPolicyConfig {
            eval_n_episodes: Some(1),
            log_root: "/nonexistent/should/not/be/created".into(),
            ..Default::default()
        };
        let err = eval_policy(&config, &ArtifactRegistry::default()).unwrap_err();
        assert!(err.to_string().contains("got both"));
    }

    #[test]
    fn end_to_end_with_builtin_environment() {
        let tmp = tempfile::tempdir().unwrap();
        let config = EvalPolicyConfig {
            seed: Some(3),
            eval_n_timesteps: None,
            eval_n_episodes: Some(4),
            num_vec: 2,
            render: false,
            max_episode_steps: Some(25),
            log_dir: Some(tmp.path().join("log")),
            ..Default::default()
        };
        let stats = eval_policy(&config, &ArtifactRegistry::default()).unwrap();
        assert!(stats.n_traj >= 4);
        assert!(stats.len_max <= 25.0);
        assert_eq!(stats.monitor_return_mean, Some(stats.return_mean));
        assert!(tmp.path().join("log/monitor/mon000.monitor.csv").exists());
        assert!(tmp.path().join("log/monitor/mon001.monitor.csv").exists());
    }
}
