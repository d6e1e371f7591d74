use anyhow::Result;

use super::Policy;
use crate::env::{Action, Observation, Space};

/// Always takes the "zero" action: index 0 for discrete spaces, the origin
/// clipped into the box for continuous ones.
pub struct ZeroPolicy {
    action: Action,
}

impl ZeroPolicy {
    pub fn new(action_space: &Space) -> Self {
        let action = match action_space {
            Space::Discrete { .. } => Action::Discrete(0),
            Space::Box { low, .. } => {
                let zeros = vec![0.0; low.len()];
                Action::Continuous(action_space.clip(&zeros).unwrap_or(zeros))
            }
        };
        Self { action }
    }
}

impl Policy for ZeroPolicy {
    fn predict(&mut self, observations: &[Observation]) -> Result<Vec<Action>> {
        Ok(vec![self.action.clone(); observations.len()])
    }

    fn name(&self) -> &str {
        "zero"
    }
}
