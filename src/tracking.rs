//! File-based experiment tracking.
//!
//! Every run gets a directory `<root>/<id>` with an integer id one higher
//! than the largest existing one. The directory holds `config.json` (the
//! resolved configuration) and `run.json` (status, timing, and the result or
//! the failure trace).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default observer root.
pub const DEFAULT_OBSERVER_ROOT: &str = "output/runs/eval_policy";

/// Name of the link created inside the log directory.
pub const RUN_LINK_NAME: &str = "run";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// Contents of `run.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub command: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_trace: Option<String>,
}

/// Allocates run directories under a root directory.
#[derive(Debug, Clone)]
pub struct RunObserver {
    root: PathBuf,
}

impl RunObserver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the next run directory and record `config` in it.
    pub fn start_run<C: Serialize>(&self, command: &str, config: &C) -> Result<Run> {
        let root = &self.root;
        std::fs::create_dir_all(root)
            .with_context(|| format!("Failed to create observer root {}", root.display()))?;

        let (id, dir) = self.allocate_dir()?;
        write_json(&dir.join("config.json"), config)?;

        let run = Run {
            id,
            dir,
            record: RunRecord {
                command: command.to_string(),
                status: RunStatus::Running,
                start_time: Utc::now(),
                stop_time: None,
                result: None,
                fail_trace: None,
            },
        };
        run.save()?;
        tracing::info!(run_id = id, dir = %run.dir.display(), "started run");
        Ok(run)
    }

    fn allocate_dir(&self) -> Result<(u64, PathBuf)> {
        let mut next = self.max_existing_id()? + 1;
        // Another process may claim an id between the scan and the mkdir.
        for _ in 0..16 {
            let dir = self.root.join(next.to_string());
            match std::fs::create_dir(&dir) {
                Ok(()) => return Ok((next, dir)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => next += 1,
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to create run dir {}", dir.display()))
                }
            }
        }
        anyhow::bail!("could not allocate a run directory under {}", self.root.display())
    }

    fn max_existing_id(&self) -> Result<u64> {
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to list {}", self.root.display()))?;
        let mut max = 0;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(id) = name.to_str().and_then(|n| n.parse::<u64>().ok()) {
                max = max.max(id);
            }
        }
        Ok(max)
    }
}

/// A started run. Finish it with [`Run::complete`] or [`Run::fail`].
#[derive(Debug)]
pub struct Run {
    id: u64,
    dir: PathBuf,
    record: RunRecord,
}

impl Run {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Mark the run COMPLETED with `result`.
    pub fn complete<R: Serialize>(mut self, result: &R) -> Result<()> {
        self.record.status = RunStatus::Completed;
        self.record.stop_time = Some(Utc::now());
        self.record.result = Some(serde_json::to_value(result)?);
        self.save()?;
        tracing::info!(run_id = self.id, "run completed");
        Ok(())
    }

    /// Mark the run FAILED with the error chain as trace.
    pub fn fail(mut self, error: &anyhow::Error) -> Result<()> {
        self.record.status = RunStatus::Failed;
        self.record.stop_time = Some(Utc::now());
        self.record.fail_trace = Some(format!("{error:?}"));
        self.save()?;
        tracing::warn!(run_id = self.id, "run failed");
        Ok(())
    }

    fn save(&self) -> Result<()> {
        write_json(&self.dir.join("run.json"), &self.record)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Create `<log_dir>/run` pointing at `run_dir`, replacing an existing link.
#[cfg(unix)]
pub fn build_run_symlink(log_dir: &Path, run_dir: &Path) -> Result<()> {
    let link = log_dir.join(RUN_LINK_NAME);
    if link.symlink_metadata().is_ok() {
        std::fs::remove_file(&link)
            .with_context(|| format!("Failed to remove old link {}", link.display()))?;
    }
    let target = std::path::absolute(run_dir)
        .with_context(|| format!("Failed to resolve {}", run_dir.display()))?;
    std::os::unix::fs::symlink(&target, &link).with_context(|| {
        format!("Failed to link {} -> {}", link.display(), target.display())
    })?;
    tracing::info!(
        link = %link.display(),
        target = %target.display(),
        "linked run directory"
    );
    Ok(())
}

#[cfg(not(unix))]
pub fn build_run_symlink(log_dir: &Path, run_dir: &Path) -> Result<()> {
    tracing::warn!(
        log_dir = %log_dir.display(),
        run_dir = %run_dir.display(),
        "run directory links are only created on unix"
    );
    Ok(())
}
