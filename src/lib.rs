//! rl-eval: evaluate trained reinforcement-learning policies.
//!
//! Loads a policy (and optionally a reward model that replaces the
//! environment's reward), runs it in a vectorized environment for a budget of
//! episodes or timesteps, and reports return and episode-length statistics.

pub mod artifact;
pub mod config;
pub mod env;
pub mod eval;
pub mod policy;
pub mod reward;
pub mod rollout;
pub mod tracking;
pub mod vec_env;
