//! Loading policies and reward functions from `(type tag, path)` pairs.
//!
//! Artifacts are JSON files. A path that names a directory resolves to
//! `<dir>/model.json`. Loaders are looked up by type tag in an
//! [`ArtifactRegistry`]; the default registry knows the built-in types and
//! more can be added with [`ArtifactRegistry::register_policy`] and
//! [`ArtifactRegistry::register_reward`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::env::EnvSpaces;
use crate::policy::{LinearModel, LinearPolicy, Policy, RandomPolicy, ZeroPolicy};
use crate::reward::{ConstantReward, LinearReward, LinearRewardModel, RewardFn, ZeroReward};

/// File name looked up inside an artifact directory.
pub const ARTIFACT_FILE: &str = "model.json";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unknown {kind} type `{type_tag}` (known: {known})")]
    UnknownType {
        kind: &'static str,
        type_tag: String,
        known: String,
    },

    #[error("{kind} type `{type_tag}` needs an artifact path")]
    MissingPath {
        kind: &'static str,
        type_tag: String,
    },

    #[error("failed to read artifact {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse artifact {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("artifact {path} does not fit the environment: {message}")]
    Shape { path: PathBuf, message: String },
}

/// `path` itself, or `path/model.json` when `path` is a directory.
pub fn resolve_artifact_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(ARTIFACT_FILE)
    } else {
        path.to_path_buf()
    }
}

/// Read and deserialize the artifact at `path` (after directory resolution).
pub fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<(T, PathBuf), LoadError> {
    let path = resolve_artifact_path(path);
    let text = std::fs::read_to_string(&path).map_err(|source| LoadError::Read {
        path: path.clone(),
        source,
    })?;
    let value = serde_json::from_str(&text).map_err(|source| LoadError::Parse {
        path: path.clone(),
        source,
    })?;
    Ok((value, path))
}

/// What a loader knows about the environment it is loading for.
#[derive(Debug, Clone)]
pub struct LoadContext {
    pub spaces: EnvSpaces,
    /// Seed for loaders that need randomness.
    pub seed: u64,
}

pub type PolicyLoader =
    Box<dyn Fn(Option<&Path>, &LoadContext) -> Result<Box<dyn Policy>> + Send + Sync>;
pub type RewardLoader =
    Box<dyn Fn(Option<&Path>, &LoadContext) -> Result<Box<dyn RewardFn>> + Send + Sync>;

/// Type-tag lookup table for policy and reward loaders.
pub struct ArtifactRegistry {
    policies: BTreeMap<String, PolicyLoader>,
    rewards: BTreeMap<String, RewardLoader>,
}

impl Default for ArtifactRegistry {
    /// A registry with the built-in types: policies `random`, `zero` and
    /// `linear`; rewards `zero`, `constant` and `linear`.
    fn default() -> Self {
        let mut registry = Self::empty();

        registry.register_policy("random", |_, ctx| {
            Ok(Box::new(RandomPolicy::new(ctx.spaces.action_space.clone(), ctx.seed)))
        });
        registry.register_policy("zero", |_, ctx| {
            Ok(Box::new(ZeroPolicy::new(&ctx.spaces.action_space)))
        });
        registry.register_policy("linear", |path, ctx| {
            let path = require_path("policy", "linear", path)?;
            let (model, path): (LinearModel, _) = read_artifact(path)?;
            model
                .check_shape(&ctx.spaces)
                .map_err(|message| LoadError::Shape { path, message })?;
            Ok(Box::new(LinearPolicy::new(model, ctx.spaces.action_space.clone())))
        });

        registry.register_reward("zero", |_, _| Ok(Box::new(ZeroReward)));
        registry.register_reward("constant", |path, _| {
            let path = require_path("reward", "constant", path)?;
            let (reward, _): (ConstantReward, _) = read_artifact(path)?;
            Ok(Box::new(reward))
        });
        registry.register_reward("linear", |path, ctx| {
            let path = require_path("reward", "linear", path)?;
            let (model, path): (LinearRewardModel, _) = read_artifact(path)?;
            model
                .check_shape(&ctx.spaces)
                .map_err(|message| LoadError::Shape { path, message })?;
            Ok(Box::new(LinearReward::new(model)))
        });

        registry
    }
}

fn require_path<'a>(
    kind: &'static str,
    type_tag: &str,
    path: Option<&'a Path>,
) -> Result<&'a Path, LoadError> {
    path.ok_or_else(|| LoadError::MissingPath {
        kind,
        type_tag: type_tag.to_string(),
    })
}

impl ArtifactRegistry {
    /// A registry with no loaders at all.
    pub fn empty() -> Self {
        Self {
            policies: BTreeMap::new(),
            rewards: BTreeMap::new(),
        }
    }

    /// Register (or replace) the loader for a policy type tag.
    pub fn register_policy<F>(&mut self, type_tag: &str, loader: F)
    where
        F: Fn(Option<&Path>, &LoadContext) -> Result<Box<dyn Policy>> + Send + Sync + 'static,
    {
        self.policies.insert(type_tag.to_string(), Box::new(loader));
    }

    /// Register (or replace) the loader for a reward type tag.
    pub fn register_reward<F>(&mut self, type_tag: &str, loader: F)
    where
        F: Fn(Option<&Path>, &LoadContext) -> Result<Box<dyn RewardFn>> + Send + Sync + 'static,
    {
        self.rewards.insert(type_tag.to_string(), Box::new(loader));
    }

    pub fn policy_types(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    pub fn reward_types(&self) -> impl Iterator<Item = &str> {
        self.rewards.keys().map(String::as_str)
    }

    /// Load a policy for an environment with the spaces in `ctx`.
    pub fn load_policy(
        &self,
        type_tag: &str,
        path: Option<&Path>,
        ctx: &LoadContext,
    ) -> Result<Box<dyn Policy>> {
        let loader = self.policies.get(type_tag).ok_or_else(|| LoadError::UnknownType {
            kind: "policy",
            type_tag: type_tag.to_string(),
            known: self.policy_types().collect::<Vec<_>>().join(", "),
        })?;
        let policy = loader(path, ctx)?;
        tracing::info!(
            policy_type = type_tag,
            path = ?path,
            "loaded policy"
        );
        Ok(policy)
    }

    /// Load a reward function for an environment with the spaces in `ctx`.
    pub fn load_reward(
        &self,
        type_tag: &str,
        path: Option<&Path>,
        ctx: &LoadContext,
    ) -> Result<Box<dyn RewardFn>> {
        let loader = self.rewards.get(type_tag).ok_or_else(|| LoadError::UnknownType {
            kind: "reward",
            type_tag: type_tag.to_string(),
            known: self.reward_types().collect::<Vec<_>>().join(", "),
        })?;
        let reward_fn = loader(path, ctx)?;
        tracing::info!(
            reward_type = type_tag,
            path = ?path,
            "loaded reward function"
        );
        Ok(reward_fn)
    }
}
