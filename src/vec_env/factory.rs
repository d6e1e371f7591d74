//! Builds the vectorized environment used for evaluation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::dummy::DummyVecEnv;
use super::subproc::{SubprocVecEnv, WorkerCommand};
use super::worker::WorkerArgs;
use super::VecEnv;
use crate::env::{make_env, registry};

/// Upper bound (exclusive) for per-instance seeds.
const MAX_INSTANCE_SEED: u64 = (1 << 31) - 1;

/// Parameters for [`make_vec_env`].
#[derive(Debug, Clone)]
pub struct VecEnvOptions<'a> {
    pub env_id: &'a str,
    pub num_vec: usize,
    pub seed: u64,
    /// One OS process per instance instead of sequential in-process stepping.
    pub parallel: bool,
    /// Monitor logs go to `<log_dir>/monitor/`.
    pub log_dir: Option<&'a Path>,
    /// Overrides the registry's episode-length cap.
    pub max_episode_steps: Option<usize>,
}

/// Derive one seed per instance from the master seed.
pub fn instance_seeds(seed: u64, n: usize) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(0..MAX_INSTANCE_SEED)).collect()
}

/// Base path of instance `index`'s monitor log.
pub fn monitor_base_path(log_dir: &Path, index: usize) -> PathBuf {
    log_dir.join("monitor").join(format!("mon{index:03}"))
}

/// Build `num_vec` instances of `env_id`, each wrapped in a time limit and a
/// monitor, and batch them into a [`VecEnv`].
///
/// Parallel workers re-invoke the running executable.
pub fn make_vec_env(opts: &VecEnvOptions<'_>) -> Result<Box<dyn VecEnv>> {
    make_vec_env_with(opts, WorkerCommand::current_exe)
}

/// Like [`make_vec_env`], but with an explicit worker launcher. The launcher
/// is only consulted when `opts.parallel` is set.
pub fn make_vec_env_with(
    opts: &VecEnvOptions<'_>,
    worker_command: impl FnOnce() -> Result<WorkerCommand>,
) -> Result<Box<dyn VecEnv>> {
    anyhow::ensure!(opts.num_vec > 0, "num_vec must be at least 1");
    // Fail on unknown ids before spawning anything.
    registry::spec(opts.env_id)?;

    let seeds = instance_seeds(opts.seed, opts.num_vec);
    tracing::info!(
        env_id = opts.env_id,
        num_vec = opts.num_vec,
        parallel = opts.parallel,
        seed = opts.seed,
        "building vectorized environment"
    );

    if opts.parallel {
        let args: Vec<WorkerArgs> = seeds
            .iter()
            .enumerate()
            .map(|(index, &seed)| WorkerArgs {
                env_id: opts.env_id.to_string(),
                seed,
                index,
                max_episode_steps: opts.max_episode_steps,
                monitor_path: opts.log_dir.map(|d| monitor_base_path(d, index)),
            })
            .collect();
        let command = worker_command()?;
        return Ok(Box::new(SubprocVecEnv::spawn(&command, &args)?));
    }

    let envs = seeds
        .iter()
        .enumerate()
        .map(|(index, &seed)| {
            let monitor = opts.log_dir.map(|d| monitor_base_path(d, index));
            make_env(opts.env_id, seed, opts.max_episode_steps, monitor.as_deref())
                .with_context(|| format!("failed to build environment {index}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Box::new(DummyVecEnv::new(envs)?))
}
