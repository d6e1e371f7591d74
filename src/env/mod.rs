//! Simulation environments and single-instance wrappers.
//!
//! Every environment implements the [`Environment`] trait so that the
//! vectorized environments in [`crate::vec_env`] can drive them uniformly.
//!
//! Included environments:
//! - **CartPole-v1** ([`cartpole`]) -- balance a pole on a cart, discrete.
//! - **MountainCar-v0** ([`mountain_car`]) -- drive up a hill, discrete.
//! - **Pendulum-v1** ([`pendulum`]) -- swing-up, continuous torque.
//!
//! Wrappers applied by [`registry::make_env`]:
//! - [`time_limit::TimeLimit`] caps episode length.
//! - [`monitor::Monitor`] records per-episode returns to a CSV log.

pub mod cartpole;
pub mod monitor;
pub mod mountain_car;
pub mod pendulum;
pub mod registry;
pub mod time_limit;
pub mod traits;

pub use monitor::Monitor;
pub use registry::{make_env, EnvSpec};
pub use time_limit::TimeLimit;
pub use traits::{
    Action, EnvError, EnvSpaces, Environment, EpisodeRecord, Observation, Space, StepInfo,
    Transition,
};
