use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rollout::StoppingCondition;

/// Names accepted by [`EvalPolicyConfig::apply_preset`].
pub const PRESETS: &[&str] = &["fast", "cartpole", "mountain_car", "pendulum"];

/// Complete configuration for one policy evaluation run.
///
/// Every field has a default, so a JSON config file only needs the keys it
/// wants to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalPolicyConfig {
    /// Registry id of the environment (default: "CartPole-v1").
    pub env_name: String,
    /// Master seed. Drawn at random when unset and recorded with the run.
    pub seed: Option<u64>,
    /// Minimum number of timesteps to evaluate for (default: 10000).
    pub eval_n_timesteps: Option<usize>,
    /// Minimum number of episodes to evaluate for (default: unset).
    pub eval_n_episodes: Option<usize>,
    /// Number of environment instances stepped together (default: 1).
    pub num_vec: usize,
    /// Run each instance in its own worker process (default: false).
    pub parallel: bool,
    /// Overrides the environment's default episode-length cap.
    pub max_episode_steps: Option<usize>,
    /// Render every step to stderr (default: true).
    pub render: bool,
    /// Playback rate while rendering; 0 disables the delay (default: 60).
    pub render_fps: u32,
    /// Policy type tag (default: "random").
    pub policy_type: String,
    /// Policy artifact file, or a directory containing `model.json`.
    pub policy_path: Option<PathBuf>,
    /// Reward override type tag. Unset keeps the environment's own reward.
    pub reward_type: Option<String>,
    /// Reward artifact file, or a directory containing `model.json`.
    pub reward_path: Option<PathBuf>,
    /// Parent of the generated `log_dir` (default: "output/eval_policy").
    pub log_root: PathBuf,
    /// Output directory for monitor logs. Derived from `log_root` when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for EvalPolicyConfig {
    fn default() -> Self {
        Self {
            env_name: "CartPole-v1".into(),
            seed: None,
            eval_n_timesteps: Some(10_000),
            eval_n_episodes: None,
            num_vec: 1,
            parallel: false,
            max_episode_steps: None,
            render: true,
            render_fps: 60,
            policy_type: "random".into(),
            policy_path: None,
            reward_type: None,
            reward_path: None,
            log_root: PathBuf::from("output").join("eval_policy"),
            log_dir: None,
        }
    }
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("exactly one of eval_n_timesteps and eval_n_episodes may be set, got both")]
    BothBudgets,

    #[error("one of eval_n_timesteps or eval_n_episodes must be set")]
    NoBudget,

    #[error("{field} must be positive")]
    ZeroBudget { field: &'static str },

    #[error("num_vec must be at least 1")]
    ZeroNumVec,

    #[error("reward_path is set but reward_type is not")]
    RewardPathWithoutType,

    #[error("unknown preset `{name}` (expected one of: {})", PRESETS.join(", "))]
    UnknownPreset { name: String },

    #[error("failed to read config from {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl EvalPolicyConfig {
    /// Load a JSON config file. Missing keys take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply a named bundle of overrides on top of the current values.
    pub fn apply_preset(&mut self, name: &str) -> Result<(), ConfigError> {
        match name {
            "fast" => {
                self.render = false;
                self.eval_n_timesteps = Some(1);
                self.eval_n_episodes = None;
                self.max_episode_steps = Some(1);
            }
            "cartpole" => self.env_name = "CartPole-v1".into(),
            "mountain_car" => self.env_name = "MountainCar-v0".into(),
            "pendulum" => self.env_name = "Pendulum-v1".into(),
            other => {
                return Err(ConfigError::UnknownPreset {
                    name: other.to_string(),
                })
            }
        }
        Ok(())
    }

    /// Check everything that can be checked without building an environment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        StoppingCondition::from_budget(self.eval_n_timesteps, self.eval_n_episodes)?;
        if self.num_vec == 0 {
            return Err(ConfigError::ZeroNumVec);
        }
        if self.reward_path.is_some() && self.reward_type.is_none() {
            return Err(ConfigError::RewardPathWithoutType);
        }
        Ok(())
    }

    /// Fill in the seed and log directory if they are unset and return them.
    ///
    /// Calling this again returns the same values.
    pub fn resolve(&mut self) -> (u64, PathBuf) {
        let seed = *self
            .seed
            .get_or_insert_with(|| u64::from(rand::random::<u32>() >> 1));
        let log_dir = self
            .log_dir
            .get_or_insert_with(|| default_log_dir(&self.log_root, &self.env_name, Local::now()))
            .clone();
        (seed, log_dir)
    }
}

/// `<log_root>/<env_name with '/' replaced by '_'>/<YYYYmmdd_HHMMSS>_<6 hex>`.
pub fn default_log_dir(log_root: &Path, env_name: &str, now: DateTime<Local>) -> PathBuf {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    log_root
        .join(env_name.replace('/', "_"))
        .join(format!("{}_{}", now.format("%Y%m%d_%H%M%S"), &suffix[..6]))
}
