//! Classic cart-pole balancing task.
//!
//! A pole is attached by an un-actuated joint to a cart moving along a
//! frictionless track. The agent pushes the cart left (action 0) or right
//! (action 1) and receives `+1` for every step the pole stays upright. The
//! episode ends when the pole tilts more than 12 degrees or the cart leaves
//! the `[-2.4, 2.4]` track.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::traits::{Action, EnvError, EnvSpaces, Environment, Observation, Space, Transition};

const GRAVITY: f64 = 9.8;
const MASS_CART: f64 = 1.0;
const MASS_POLE: f64 = 0.1;
const TOTAL_MASS: f64 = MASS_CART + MASS_POLE;
const HALF_LENGTH: f64 = 0.5;
const POLE_MASS_LENGTH: f64 = MASS_POLE * HALF_LENGTH;
const FORCE_MAG: f64 = 10.0;
const TAU: f64 = 0.02;
const THETA_THRESHOLD: f64 = 12.0 * 2.0 * std::f64::consts::PI / 360.0;
const X_THRESHOLD: f64 = 2.4;

/// Width of the text track drawn by [`CartPoleEnv::render`].
const TRACK_WIDTH: usize = 41;

pub const ID: &str = "CartPole-v1";

/// Cart-pole with the standard physics constants and Euler integration.
#[derive(Debug)]
pub struct CartPoleEnv {
    rng: StdRng,
    /// `[x, x_dot, theta, theta_dot]`, `None` until the first reset.
    state: Option<[f64; 4]>,
    done: bool,
}

impl CartPoleEnv {
    pub fn new() -> Self {
        Self {
            rng: StdRng::seed_from_u64(0),
            state: None,
            done: false,
        }
    }
}

impl Default for CartPoleEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for CartPoleEnv {
    fn spaces(&self) -> EnvSpaces {
        EnvSpaces {
            observation_space: Space::Box {
                low: vec![-X_THRESHOLD * 2.0, f64::MIN, -THETA_THRESHOLD * 2.0, f64::MIN],
                high: vec![X_THRESHOLD * 2.0, f64::MAX, THETA_THRESHOLD * 2.0, f64::MAX],
            },
            action_space: Space::Discrete { n: 2 },
        }
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn reset(&mut self) -> Result<Observation> {
        let state: [f64; 4] = std::array::from_fn(|_| self.rng.gen_range(-0.05..0.05));
        self.state = Some(state);
        self.done = false;
        Ok(state.to_vec())
    }

    fn step(&mut self, action: &Action) -> Result<Transition> {
        let push_right = match action {
            Action::Discrete(a @ (0 | 1)) => *a == 1,
            other => {
                return Err(EnvError::InvalidAction {
                    action: other.clone(),
                    space: Space::Discrete { n: 2 },
                }
                .into())
            }
        };
        let [x, x_dot, theta, theta_dot] = match self.state {
            Some(s) if !self.done => s,
            _ => return Err(EnvError::NeedsReset.into()),
        };

        let force = if push_right { FORCE_MAG } else { -FORCE_MAG };
        let (sin, cos) = theta.sin_cos();
        let temp = (force + POLE_MASS_LENGTH * theta_dot * theta_dot * sin) / TOTAL_MASS;
        let theta_acc = (GRAVITY * sin - cos * temp)
            / (HALF_LENGTH * (4.0 / 3.0 - MASS_POLE * cos * cos / TOTAL_MASS));
        let x_acc = temp - POLE_MASS_LENGTH * theta_acc * cos / TOTAL_MASS;

        let next = [
            x + TAU * x_dot,
            x_dot + TAU * x_acc,
            theta + TAU * theta_dot,
            theta_dot + TAU * theta_acc,
        ];
        self.state = Some(next);

        let done = next[0].abs() > X_THRESHOLD || next[2].abs() > THETA_THRESHOLD;
        self.done = done;

        Ok(Transition {
            observation: next.to_vec(),
            reward: 1.0,
            done,
            info: Default::default(),
        })
    }

    fn render(&self) -> String {
        let Some([x, _, theta, _]) = self.state else {
            return format!("[{ID}] not reset");
        };
        let frac = ((x + X_THRESHOLD) / (2.0 * X_THRESHOLD)).clamp(0.0, 1.0);
        let cart = (frac * (TRACK_WIDTH - 1) as f64).round() as usize;
        let track: String = (0..TRACK_WIDTH)
            .map(|i| if i == cart { '#' } else { '-' })
            .collect();
        format!("[{ID}] |{track}| x={x:+.3} theta={:+.1}deg", theta.to_degrees())
    }

    fn id(&self) -> &str {
        ID
    }
}
