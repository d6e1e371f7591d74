//! Inverted pendulum swing-up with a continuous torque action.
//!
//! The episode never terminates on its own; the registry caps it with a time
//! limit.

use std::f64::consts::PI;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::traits::{Action, EnvError, EnvSpaces, Environment, Observation, Space, Transition};

const MAX_SPEED: f64 = 8.0;
const MAX_TORQUE: f64 = 2.0;
const DT: f64 = 0.05;
const G: f64 = 10.0;
const MASS: f64 = 1.0;
const LENGTH: f64 = 1.0;

pub const ID: &str = "Pendulum-v1";

#[derive(Debug)]
pub struct PendulumEnv {
    rng: StdRng,
    /// `[theta, theta_dot]`.
    state: Option<[f64; 2]>,
    last_torque: f64,
}

impl PendulumEnv {
    pub fn new() -> Self {
        Self {
            rng: StdRng::seed_from_u64(0),
            state: None,
            last_torque: 0.0,
        }
    }

    fn observe([theta, theta_dot]: [f64; 2]) -> Observation {
        vec![theta.cos(), theta.sin(), theta_dot]
    }
}

impl Default for PendulumEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap an angle into `[-pi, pi)`.
fn angle_normalize(x: f64) -> f64 {
    (x + PI).rem_euclid(2.0 * PI) - PI
}

impl Environment for PendulumEnv {
    fn spaces(&self) -> EnvSpaces {
        EnvSpaces {
            observation_space: Space::Box {
                low: vec![-1.0, -1.0, -MAX_SPEED],
                high: vec![1.0, 1.0, MAX_SPEED],
            },
            action_space: Space::uniform_box(1, -MAX_TORQUE, MAX_TORQUE),
        }
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn reset(&mut self) -> Result<Observation> {
        let state = [self.rng.gen_range(-PI..PI), self.rng.gen_range(-1.0..1.0)];
        self.state = Some(state);
        self.last_torque = 0.0;
        Ok(Self::observe(state))
    }

    fn step(&mut self, action: &Action) -> Result<Transition> {
        let torque = match action {
            Action::Continuous(v) if v.len() == 1 => v[0].clamp(-MAX_TORQUE, MAX_TORQUE),
            other => {
                return Err(EnvError::InvalidAction {
                    action: other.clone(),
                    space: self.spaces().action_space,
                }
                .into())
            }
        };
        let [theta, theta_dot] = self.state.ok_or(EnvError::NeedsReset)?;

        let cost = angle_normalize(theta).powi(2)
            + 0.1 * theta_dot * theta_dot
            + 0.001 * torque * torque;

        let theta_dot = (theta_dot
            + (3.0 * G / (2.0 * LENGTH) * theta.sin()
                + 3.0 / (MASS * LENGTH * LENGTH) * torque)
                * DT)
            .clamp(-MAX_SPEED, MAX_SPEED);
        let theta = theta + theta_dot * DT;

        self.state = Some([theta, theta_dot]);
        self.last_torque = torque;

        Ok(Transition {
            observation: Self::observe([theta, theta_dot]),
            reward: -cost,
            done: false,
            info: Default::default(),
        })
    }

    fn render(&self) -> String {
        let Some([theta, theta_dot]) = self.state else {
            return format!("[{ID}] not reset");
        };
        format!(
            "[{ID}] theta={:+7.1}deg omega={theta_dot:+.2} torque={:+.2}",
            angle_normalize(theta).to_degrees(),
            self.last_torque
        )
    }

    fn id(&self) -> &str {
        ID
    }
}
