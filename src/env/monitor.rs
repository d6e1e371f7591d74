//! Per-episode return and length logging.
//!
//! The monitor sits directly around the raw environment (inside any reward
//! override), so the returns it records are the environment's own rewards.
//!
//! File layout, one file per environment instance:
//!
//! ```text
//! #{"t_start":1721374800.123,"env_id":"CartPole-v1"}
//! r,l,t
//! 23.0,23,0.004112
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;

use super::traits::{Action, EnvSpaces, Environment, EpisodeRecord, Observation, Transition};

/// Suffix appended to the monitor's base path.
pub const MONITOR_EXT: &str = "monitor.csv";

/// Records every finished episode into [`StepInfo::episode`](super::StepInfo)
/// and, when a base path is given, appends it to a CSV file.
pub struct Monitor<E> {
    inner: E,
    writer: Option<BufWriter<File>>,
    started: Instant,
    episode_return: f64,
    episode_len: usize,
}

impl<E: Environment> Monitor<E> {
    /// Wrap `inner`. With `base_path = Some("logs/monitor/mon000")` the file
    /// `logs/monitor/mon000.monitor.csv` is created (truncating any old one).
    pub fn new(inner: E, base_path: Option<&Path>) -> Result<Self> {
        let writer = match base_path {
            Some(base) => Some(Self::open(base, inner.id())?),
            None => None,
        };
        Ok(Self {
            inner,
            writer,
            started: Instant::now(),
            episode_return: 0.0,
            episode_len: 0,
        })
    }

    fn open(base: &Path, env_id: &str) -> Result<BufWriter<File>> {
        let path = monitor_file_path(base);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = File::create(&path)
            .with_context(|| format!("Failed to create monitor file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        let header = serde_json::json!({
            "t_start": Utc::now().timestamp_millis() as f64 / 1000.0,
            "env_id": env_id,
        });
        writeln!(writer, "#{header}")?;
        writeln!(writer, "r,l,t")?;
        writer.flush()?;
        tracing::debug!(path = %path.display(), "monitor file opened");
        Ok(writer)
    }
}

/// `<base>.monitor.csv`
pub fn monitor_file_path(base: &Path) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(MONITOR_EXT);
    PathBuf::from(name)
}

fn round6(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}

impl<E: Environment> Environment for Monitor<E> {
    fn spaces(&self) -> EnvSpaces {
        self.inner.spaces()
    }

    fn seed(&mut self, seed: u64) {
        self.inner.seed(seed);
    }

    fn reset(&mut self) -> Result<Observation> {
        self.episode_return = 0.0;
        self.episode_len = 0;
        self.inner.reset()
    }

    fn step(&mut self, action: &Action) -> Result<Transition> {
        let mut transition = self.inner.step(action)?;
        self.episode_return += transition.reward;
        self.episode_len += 1;

        if transition.done {
            let record = EpisodeRecord {
                r: round6(self.episode_return),
                l: self.episode_len,
                t: round6(self.started.elapsed().as_secs_f64()),
            };
            if let Some(writer) = self.writer.as_mut() {
                writeln!(writer, "{},{},{}", record.r, record.l, record.t)?;
                writer.flush()?;
            }
            transition.info.episode = Some(record);
        }
        Ok(transition)
    }

    fn render(&self) -> String {
        self.inner.render()
    }

    fn id(&self) -> &str {
        self.inner.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::cartpole::CartPoleEnv;

    #[test]
    fn writes_one_row_per_episode() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("monitor").join("mon000");
        let mut env = Monitor::new(CartPoleEnv::new(), Some(&base)).unwrap();

        for _ in 0..2 {
            env.reset().unwrap();
            loop {
                let t = env.step(&Action::Discrete(0)).unwrap();
                if t.done {
                    let record = t.info.episode.expect("episode record on done");
                    assert_eq!(record.r, record.l as f64);
                    break;
                }
                assert!(t.info.episode.is_none());
            }
        }

        let text = fs::read_to_string(monitor_file_path(&base)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("#{"));
        assert!(lines[0].contains("CartPole-v1"));
        assert_eq!(lines[1], "r,l,t");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn monitor_path_appends_extension() {
        let p = monitor_file_path(Path::new("logs/monitor/mon007"));
        assert_eq!(p, PathBuf::from("logs/monitor/mon007.monitor.csv"));
    }
}
