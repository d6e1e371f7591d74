//! Mountain car: drive an under-powered car up a hill.
//!
//! Actions: `0` accelerate left, `1` coast, `2` accelerate right. Every step
//! costs `-1` until the car reaches the flag at `position >= 0.5`.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::traits::{Action, EnvError, EnvSpaces, Environment, Observation, Space, Transition};

const MIN_POSITION: f64 = -1.2;
const MAX_POSITION: f64 = 0.6;
const MAX_SPEED: f64 = 0.07;
const GOAL_POSITION: f64 = 0.5;
const GOAL_VELOCITY: f64 = 0.0;
const FORCE: f64 = 0.001;
const GRAVITY: f64 = 0.0025;

const TRACK_WIDTH: usize = 37;

pub const ID: &str = "MountainCar-v0";

#[derive(Debug)]
pub struct MountainCarEnv {
    rng: StdRng,
    /// `[position, velocity]`.
    state: Option<[f64; 2]>,
    done: bool,
}

impl MountainCarEnv {
    pub fn new() -> Self {
        Self {
            rng: StdRng::seed_from_u64(0),
            state: None,
            done: false,
        }
    }
}

impl Default for MountainCarEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for MountainCarEnv {
    fn spaces(&self) -> EnvSpaces {
        EnvSpaces {
            observation_space: Space::Box {
                low: vec![MIN_POSITION, -MAX_SPEED],
                high: vec![MAX_POSITION, MAX_SPEED],
            },
            action_space: Space::Discrete { n: 3 },
        }
    }

    fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn reset(&mut self) -> Result<Observation> {
        let state = [self.rng.gen_range(-0.6..-0.4), 0.0];
        self.state = Some(state);
        self.done = false;
        Ok(state.to_vec())
    }

    fn step(&mut self, action: &Action) -> Result<Transition> {
        let push = match action {
            Action::Discrete(a) if *a < 3 => *a as f64 - 1.0,
            other => {
                return Err(EnvError::InvalidAction {
                    action: other.clone(),
                    space: Space::Discrete { n: 3 },
                }
                .into())
            }
        };
        let [position, velocity] = match self.state {
            Some(s) if !self.done => s,
            _ => return Err(EnvError::NeedsReset.into()),
        };

        let mut velocity = (velocity + push * FORCE - (3.0 * position).cos() * GRAVITY)
            .clamp(-MAX_SPEED, MAX_SPEED);
        let position = (position + velocity).clamp(MIN_POSITION, MAX_POSITION);
        if position <= MIN_POSITION && velocity < 0.0 {
            velocity = 0.0;
        }

        let done = position >= GOAL_POSITION && velocity >= GOAL_VELOCITY;
        self.state = Some([position, velocity]);
        self.done = done;

        Ok(Transition {
            observation: vec![position, velocity],
            reward: -1.0,
            done,
            info: Default::default(),
        })
    }

    fn render(&self) -> String {
        let Some([position, velocity]) = self.state else {
            return format!("[{ID}] not reset");
        };
        let to_cell = |p: f64| {
            let frac = (p - MIN_POSITION) / (MAX_POSITION - MIN_POSITION);
            (frac * (TRACK_WIDTH - 1) as f64).round() as usize
        };
        let car = to_cell(position);
        let flag = to_cell(GOAL_POSITION);
        let track: String = (0..TRACK_WIDTH)
            .map(|i| match i {
                _ if i == car => 'o',
                _ if i == flag => 'F',
                _ => '_',
            })
            .collect();
        format!("[{ID}] {track} pos={position:+.3} vel={velocity:+.4}")
    }

    fn id(&self) -> &str {
        ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_step_costs_one() {
        let mut env = MountainCarEnv::new();
        env.seed(11);
        let obs = env.reset().unwrap();
        assert!((-0.6..-0.4).contains(&obs[0]));
        assert_eq!(obs[1], 0.0);
        for _ in 0..10 {
            let t = env.step(&Action::Discrete(1)).unwrap();
            assert_eq!(t.reward, -1.0);
            assert!(!t.done);
        }
    }

    #[test]
    fn velocity_stays_within_limits() {
        let mut env = MountainCarEnv::new();
        env.reset().unwrap();
        for i in 0..300 {
            let a = if (i / 40) % 2 == 0 { 2 } else { 0 };
            let t = env.step(&Action::Discrete(a)).unwrap();
            assert!(t.observation[1].abs() <= MAX_SPEED + 1e-12);
            assert!(t.observation[0] >= MIN_POSITION && t.observation[0] <= MAX_POSITION);
            if t.done {
                break;
            }
        }
    }

    #[test]
    fn render_marks_car_and_flag() {
        let mut env = MountainCarEnv::new();
        env.reset().unwrap();
        let frame = env.render();
        assert!(frame.contains('o'));
        assert!(frame.contains('F'));
    }
}
