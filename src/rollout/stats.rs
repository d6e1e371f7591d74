//! Summary statistics over a batch of trajectories.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use super::types::Trajectory;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("cannot compute statistics of zero trajectories")]
    Empty,
}

/// Aggregate return and length statistics.
///
/// `std` is the sample standard deviation (n - 1 denominator), 0 for a
/// single trajectory. The `monitor_return_*` fields are present only when
/// every trajectory carries a monitor return.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RolloutStats {
    pub n_traj: usize,
    pub return_min: f64,
    pub return_mean: f64,
    pub return_std: f64,
    pub return_max: f64,
    pub len_min: f64,
    pub len_mean: f64,
    pub len_std: f64,
    pub len_max: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor_return_len: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor_return_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor_return_mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor_return_std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor_return_max: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
struct Summary {
    min: f64,
    mean: f64,
    std: f64,
    max: f64,
}

/// `values` must not be empty.
fn summarize(values: &[f64]) -> Summary {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = if values.len() < 2 {
        0.0
    } else {
        (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    };
    Summary {
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        mean,
        std,
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

/// Compute [`RolloutStats`] over `trajectories`.
pub fn rollout_stats(trajectories: &[Trajectory]) -> Result<RolloutStats, StatsError> {
    if trajectories.is_empty() {
        return Err(StatsError::Empty);
    }

    let returns: Vec<f64> = trajectories.iter().map(Trajectory::total_return).collect();
    let lens: Vec<f64> = trajectories.iter().map(|t| t.len() as f64).collect();
    let ret = summarize(&returns);
    let len = summarize(&lens);

    let monitor: Option<Vec<f64>> = trajectories.iter().map(|t| t.monitor_return).collect();
    let mon = monitor.as_deref().map(summarize);

    Ok(RolloutStats {
        n_traj: trajectories.len(),
        return_min: ret.min,
        return_mean: ret.mean,
        return_std: ret.std,
        return_max: ret.max,
        len_min: len.min,
        len_mean: len.mean,
        len_std: len.std,
        len_max: len.max,
        monitor_return_len: monitor.as_ref().map(Vec::len),
        monitor_return_min: mon.map(|s| s.min),
        monitor_return_mean: mon.map(|s| s.mean),
        monitor_return_std: mon.map(|s| s.std),
        monitor_return_max: mon.map(|s| s.max),
    })
}

impl fmt::Display for RolloutStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "n_traj: {}", self.n_traj)?;
        writeln!(
            f,
            "return: min {:.3}  mean {:.3}  std {:.3}  max {:.3}",
            self.return_min, self.return_mean, self.return_std, self.return_max
        )?;
        write!(
            f,
            "len:    min {:.1}  mean {:.3}  std {:.3}  max {:.1}",
            self.len_min, self.len_mean, self.len_std, self.len_max
        )?;
        if let (Some(min), Some(mean), Some(std), Some(max)) = (
            self.monitor_return_min,
            self.monitor_return_mean,
            self.monitor_return_std,
            self.monitor_return_max,
        ) {
            write!(
                f,
                "\nmonitor_return: min {min:.3}  mean {mean:.3}  std {std:.3}  max {max:.3}"
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Action;
    use crate::rollout::Step;

    fn traj(rewards: &[f64], monitor_return: Option<f64>) -> Trajectory {
        let steps = rewards
            .iter()
            .enumerate()
            .map(|(i, &reward)| Step {
                observation: vec![0.0],
                action: Action::Discrete(0),
                reward,
                done: i + 1 == rewards.len(),
            })
            .collect();
        Trajectory {
            steps,
            final_observation: vec![0.0],
            monitor_return,
        }
    }

    #[test]
    fn returns_one_two_three() {
        let trajs = vec![
            traj(&[1.0], None),
            traj(&[1.0, 1.0], None),
            traj(&[1.0, 1.0, 1.0], None),
        ];
        let stats = rollout_stats(&trajs).unwrap();
        assert_eq!(stats.n_traj, 3);
        assert_eq!(stats.return_mean, 2.0);
        assert_eq!(stats.return_std, 1.0);
        assert_eq!(stats.return_min, 1.0);
        assert_eq!(stats.return_max, 3.0);
        assert_eq!(stats.len_mean, 2.0);
        assert!(stats.monitor_return_mean.is_none());
    }

    #[test]
    fn single_trajectory_has_zero_std() {
        let stats = rollout_stats(&[traj(&[4.0, -1.0], None)]).unwrap();
        assert_eq!(stats.return_mean, 3.0);
        assert_eq!(stats.return_std, 0.0);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert_eq!(rollout_stats(&[]), Err(StatsError::Empty));
    }

    #[test]
    fn monitor_returns_reported_only_when_all_present() {
        let all = vec![traj(&[5.0], Some(1.0)), traj(&[5.0], Some(3.0))];
        let stats = rollout_stats(&all).unwrap();
        assert_eq!(stats.monitor_return_len, Some(2));
        assert_eq!(stats.monitor_return_mean, Some(2.0));
        assert_eq!(stats.return_mean, 5.0);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["monitor_return_max"], 3.0);

        let some = vec![traj(&[5.0], Some(1.0)), traj(&[5.0], None)];
        let stats = rollout_stats(&some).unwrap();
        assert!(stats.monitor_return_len.is_none());
        let json = serde_json::to_value(&stats).unwrap();
        assert!(json.get("monitor_return_mean").is_none());
    }

    #[test]
    fn display_lists_every_group() {
        let stats = rollout_stats(&[traj(&[1.0], Some(1.0))]).unwrap();
        let text = stats.to_string();
        assert!(text.starts_with("n_traj: 1"));
        assert!(text.contains("return:"));
        assert!(text.contains("monitor_return:"));
    }
}
