//! rl-eval: evaluate trained RL policies from the command line.
//!
//! - `eval`          -- Run a policy and print rollout statistics
//! - `print-config`  -- Print the resolved configuration as JSON
//! - `env-worker`    -- (hidden) Serve one environment instance over stdio

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rl_eval::artifact::ArtifactRegistry;
use rl_eval::config::EvalPolicyConfig;
use rl_eval::eval::eval_policy;
use rl_eval::tracking::{build_run_symlink, RunObserver, DEFAULT_OBSERVER_ROOT};
use rl_eval::vec_env::worker::{self, WorkerArgs};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// rl-eval: evaluate trained RL policies in vectorized environments
#[derive(Parser)]
#[command(name = "rl-eval", version, about)]
struct Cli {
    /// Path to a JSON configuration file (uses defaults if not provided).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Named preset applied after the config file (fast, cartpole,
    /// mountain_car, pendulum). May be repeated.
    #[arg(long, global = true)]
    preset: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a policy and print rollout statistics.
    Eval {
        #[command(flatten)]
        overrides: ConfigOverrides,

        /// Directory holding the numbered run records.
        #[arg(long, default_value = DEFAULT_OBSERVER_ROOT)]
        observer_root: PathBuf,

        /// Print the statistics as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Print the resolved configuration as JSON.
    PrintConfig {
        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// Serve a single environment instance over stdin/stdout.
    #[command(name = "env-worker", hide = true)]
    EnvWorker {
        #[arg(long)]
        env_id: String,
        #[arg(long)]
        seed: u64,
        #[arg(long)]
        index: usize,
        #[arg(long)]
        max_episode_steps: Option<usize>,
        #[arg(long)]
        monitor_path: Option<PathBuf>,
    },
}

/// Per-field overrides, applied on top of the config file and presets.
#[derive(Args, Debug, Default)]
struct ConfigOverrides {
    /// Environment id (e.g. CartPole-v1).
    #[arg(long)]
    env_name: Option<String>,

    /// Master seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Evaluate for at least this many timesteps. Clears the episode budget
    /// unless --eval-n-episodes is also given.
    #[arg(long)]
    eval_n_timesteps: Option<usize>,

    /// Evaluate for at least this many episodes. Clears the timestep budget
    /// unless --eval-n-timesteps is also given.
    #[arg(long)]
    eval_n_episodes: Option<usize>,

    /// Number of environment instances.
    #[arg(long)]
    num_vec: Option<usize>,

    /// Run each instance in its own worker process.
    #[arg(long, conflicts_with = "no_parallel")]
    parallel: bool,

    /// Step every instance in this process.
    #[arg(long)]
    no_parallel: bool,

    /// Render every step.
    #[arg(long, conflicts_with = "no_render")]
    render: bool,

    /// Do not render.
    #[arg(long)]
    no_render: bool,

    /// Rendering rate in frames per second (0 = no delay).
    #[arg(long)]
    render_fps: Option<u32>,

    /// Episode length cap, overriding the environment default.
    #[arg(long)]
    max_episode_steps: Option<usize>,

    /// Policy type tag (random, zero, linear).
    #[arg(long)]
    policy_type: Option<String>,

    /// Policy artifact file or directory.
    #[arg(long)]
    policy_path: Option<PathBuf>,

    /// Reward override type tag (zero, constant, linear).
    #[arg(long)]
    reward_type: Option<String>,

    /// Reward artifact file or directory.
    #[arg(long)]
    reward_path: Option<PathBuf>,

    /// Parent directory of the generated log directory.
    #[arg(long)]
    log_root: Option<PathBuf>,

    /// Exact log directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    fn apply(self, config: &mut EvalPolicyConfig) {
        if let Some(v) = self.env_name {
            config.env_name = v;
        }
        if let Some(v) = self.seed {
            config.seed = Some(v);
        }
        // A single budget flag replaces whatever budget came before it.
        match (self.eval_n_timesteps, self.eval_n_episodes) {
            (Some(timesteps), None) => {
                config.eval_n_timesteps = Some(timesteps);
                config.eval_n_episodes = None;
            }
            (None, Some(episodes)) => {
                config.eval_n_timesteps = None;
                config.eval_n_episodes = Some(episodes);
            }
            (Some(timesteps), Some(episodes)) => {
                config.eval_n_timesteps = Some(timesteps);
                config.eval_n_episodes = Some(episodes);
            }
            (None, None) => {}
        }
        if let Some(v) = self.num_vec {
            config.num_vec = v;
        }
        if self.parallel {
            config.parallel = true;
        }
        if self.no_parallel {
            config.parallel = false;
        }
        if self.render {
            config.render = true;
        }
        if self.no_render {
            config.render = false;
        }
        if let Some(v) = self.render_fps {
            config.render_fps = v;
        }
        if let Some(v) = self.max_episode_steps {
            config.max_episode_steps = Some(v);
        }
        if let Some(v) = self.policy_type {
            config.policy_type = v;
        }
        if let Some(v) = self.policy_path {
            config.policy_path = Some(v);
        }
        if let Some(v) = self.reward_type {
            config.reward_type = Some(v);
        }
        if let Some(v) = self.reward_path {
            config.reward_path = Some(v);
        }
        if let Some(v) = self.log_root {
            config.log_root = v;
        }
        if let Some(v) = self.log_dir {
            config.log_dir = Some(v);
        }
    }
}

// ---------------------------------------------------------------------------
// Entrypoint
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries results and the worker protocol.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Eval {
            overrides,
            observer_root,
            json,
        } => {
            let config = resolve_config(cli.config.as_ref(), &cli.preset, overrides)?;
            cmd_eval(config, observer_root, json)
        }
        Commands::PrintConfig { overrides } => {
            let config = resolve_config(cli.config.as_ref(), &cli.preset, overrides)?;
            cmd_print_config(config)
        }
        Commands::EnvWorker {
            env_id,
            seed,
            index,
            max_episode_steps,
            monitor_path,
        } => worker::run(&WorkerArgs {
            env_id,
            seed,
            index,
            max_episode_steps,
            monitor_path,
        }),
    }
}

/// Defaults, then the config file, then presets, then flags.
fn resolve_config(
    path: Option<&PathBuf>,
    presets: &[String],
    overrides: ConfigOverrides,
) -> Result<EvalPolicyConfig> {
    let mut config = match path {
        Some(path) => EvalPolicyConfig::from_json_file(path)?,
        None => EvalPolicyConfig::default(),
    };
    for preset in presets {
        config.apply_preset(preset)?;
    }
    overrides.apply(&mut config);
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_eval(mut config: EvalPolicyConfig, observer_root: PathBuf, json: bool) -> Result<()> {
    // Reject bad budgets before a run directory is created.
    config.validate()?;
    let (_, log_dir) = config.resolve();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log dir {}", log_dir.display()))?;

    let observer = RunObserver::new(observer_root);
    let run = observer.start_run("eval_policy", &config)?;
    if let Err(e) = build_run_symlink(&log_dir, run.dir()) {
        tracing::warn!(error = %e, "could not link log dir to run dir");
    }

    let registry = ArtifactRegistry::default();
    match eval_policy(&config, &registry) {
        Ok(stats) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{stats}");
            }
            run.complete(&stats)?;
            Ok(())
        }
        Err(e) => {
            if let Err(record_err) = run.fail(&e) {
                tracing::warn!(error = %record_err, "could not record run failure");
            }
            Err(e)
        }
    }
}

fn cmd_print_config(mut config: EvalPolicyConfig) -> Result<()> {
    config.resolve();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
