//! Policies: map a batch of observations to a batch of actions.
//!
//! Concrete policies are loaded by type tag through
//! [`ArtifactRegistry::load_policy`](crate::artifact::ArtifactRegistry::load_policy).
//! Anything a policy holds (files, child processes, buffers) is released when
//! the boxed policy is dropped.

pub mod linear;
pub mod random;
pub mod zero;

use anyhow::Result;

use crate::env::{Action, Observation};

pub use linear::{LinearModel, LinearPolicy};
pub use random::RandomPolicy;
pub use zero::ZeroPolicy;

/// A decision function over a batch of observations, one per environment
/// instance.
pub trait Policy: Send {
    /// Selects one action per observation.
    fn predict(&mut self, observations: &[Observation]) -> Result<Vec<Action>>;

    /// Returns a human-readable name for this policy.
    fn name(&self) -> &str;
}

impl<P: Policy + ?Sized> Policy for Box<P> {
    fn predict(&mut self, observations: &[Observation]) -> Result<Vec<Action>> {
        (**self).predict(observations)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
