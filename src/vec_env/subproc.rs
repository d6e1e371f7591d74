//! Multi-process vectorized environment.
//!
//! Every instance lives in a child process running the `env-worker`
//! subcommand. A step sends all requests first and then collects all
//! responses, so the children simulate concurrently.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use anyhow::{bail, Context, Result};

use super::worker::{Request, Response, WorkerArgs};
use super::{VecEnv, VecStep};
use crate::env::{Action, EnvError, EnvSpaces, Observation};

/// Name of the hidden CLI subcommand that runs a worker.
pub const WORKER_SUBCOMMAND: &str = "env-worker";

/// How to launch a worker process.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    /// Arguments placed before the per-worker flags.
    pub leading_args: Vec<String>,
}

impl WorkerCommand {
    /// Re-invoke the running binary as `<exe> env-worker ...`.
    pub fn current_exe() -> Result<Self> {
        let program = std::env::current_exe().context("cannot locate the running executable")?;
        Ok(Self::for_program(program))
    }

    /// Invoke `program env-worker ...`.
    pub fn for_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: vec![WORKER_SUBCOMMAND.to_string()],
        }
    }
}

struct WorkerHandle {
    index: usize,
    child: Child,
    stdin: BufWriter<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    reaped: bool,
}

impl WorkerHandle {
    fn spawn(command: &WorkerCommand, args: &WorkerArgs) -> Result<Self> {
        let mut child = Command::new(&command.program)
            .args(&command.leading_args)
            .args(args.to_cli_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| {
                format!(
                    "failed to spawn env worker {} ({})",
                    args.index,
                    command.program.display()
                )
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                bail!("env worker {} pipes were not captured", args.index);
            }
        };
        Ok(Self {
            index: args.index,
            child,
            stdin: BufWriter::new(stdin),
            stdout: BufReader::new(stdout),
            reaped: false,
        })
    }

    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn send(&mut self, request: &Request) -> Result<()> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .and_then(|_| self.stdin.flush())
            .map_err(|e| self.failure(format!("pipe closed: {e}")))?;
        Ok(())
    }

    fn recv(&mut self) -> Result<Response> {
        let mut line = String::new();
        let n = self
            .stdout
            .read_line(&mut line)
            .map_err(|e| self.failure(format!("read failed: {e}")))?;
        if n == 0 {
            return Err(self.failure("worker exited unexpectedly".to_string()).into());
        }
        match serde_json::from_str(&line) {
            Ok(Response::Error { message }) => Err(self.failure(message).into()),
            Ok(response) => Ok(response),
            Err(e) => Err(self.failure(format!("malformed response: {e}")).into()),
        }
    }

    fn failure(&self, message: String) -> EnvError {
        EnvError::Worker {
            index: self.index,
            message,
        }
    }

    /// Ask the worker to exit, then reap it; kill it if it does not cooperate.
    fn shutdown(&mut self) {
        let polite = self
            .send(&Request::Close)
            .and_then(|_| self.recv())
            .is_ok();
        if !polite {
            let _ = self.child.kill();
        }
        if let Err(e) = self.child.wait() {
            tracing::warn!(index = self.index, error = %e, "failed to reap env worker");
        }
        self.reaped = true;
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Vectorized environment backed by one worker process per instance.
pub struct SubprocVecEnv {
    workers: Vec<WorkerHandle>,
    spaces: EnvSpaces,
}

impl SubprocVecEnv {
    /// Spawn one worker per entry of `args`.
    pub fn spawn(command: &WorkerCommand, args: &[WorkerArgs]) -> Result<Self> {
        if args.is_empty() {
            bail!("SubprocVecEnv needs at least one environment");
        }

        // `Drop` cleans up the children spawned so far on any error below.
        let mut venv = Self {
            workers: Vec::with_capacity(args.len()),
            spaces: EnvSpaces {
                observation_space: crate::env::Space::Discrete { n: 0 },
                action_space: crate::env::Space::Discrete { n: 0 },
            },
        };
        for a in args {
            venv.workers.push(WorkerHandle::spawn(command, a)?);
        }

        let all_spaces = venv.broadcast(|_| Request::Spaces)?;
        let mut spaces = None;
        for (i, response) in all_spaces.into_iter().enumerate() {
            let s = match response {
                Response::Spaces(s) => s,
                other => bail!("worker {i} answered spaces with {other:?}"),
            };
            match &spaces {
                None => spaces = Some(s),
                Some(first) if *first != s => {
                    bail!("worker {i} has different spaces from worker 0")
                }
                Some(_) => {}
            }
        }
        venv.spaces = spaces.context("no spaces reported")?;

        tracing::info!(pids = ?venv.pids(), "spawned env workers");
        Ok(venv)
    }

    /// Process ids of the live workers. Empty once closed.
    pub fn pids(&self) -> Vec<u32> {
        self.workers.iter().map(WorkerHandle::pid).collect()
    }

    /// Send one request to every worker, then collect every response.
    fn broadcast(
        &mut self,
        mut request_for: impl FnMut(usize) -> Request,
    ) -> Result<Vec<Response>> {
        if self.workers.is_empty() {
            bail!("vectorized environment is closed");
        }
        for (i, w) in self.workers.iter_mut().enumerate() {
            w.send(&request_for(i))?;
        }
        self.workers.iter_mut().map(|w| w.recv()).collect()
    }
}

impl VecEnv for SubprocVecEnv {
    fn num_envs(&self) -> usize {
        self.workers.len()
    }

    fn spaces(&self) -> &EnvSpaces {
        &self.spaces
    }

    fn reset(&mut self) -> Result<Vec<Observation>> {
        self.broadcast(|_| Request::Reset)?
            .into_iter()
            .map(|r| match r {
                Response::Reset { observation } => Ok(observation),
                other => bail!("unexpected reset response {other:?}"),
            })
            .collect()
    }

    fn step(&mut self, actions: &[Action]) -> Result<VecStep> {
        if actions.len() != self.workers.len() {
            return Err(EnvError::BatchSize {
                expected: self.workers.len(),
                got: actions.len(),
            }
            .into());
        }
        if let Some(bad) = actions
            .iter()
            .find(|a| !self.spaces.action_space.contains(a))
        {
            return Err(EnvError::InvalidAction {
                action: bad.clone(),
                space: self.spaces.action_space.clone(),
            }
            .into());
        }

        let responses = self.broadcast(|i| Request::Step {
            action: actions[i].clone(),
        })?;
        let mut out = VecStep::with_capacity(responses.len());
        for r in responses {
            match r {
                Response::Step(transition) => out.push(transition),
                other => bail!("unexpected step response {other:?}"),
            }
        }
        Ok(out)
    }

    fn render(&mut self) -> Result<String> {
        let frames = self
            .broadcast(|_| Request::Render)?
            .into_iter()
            .map(|r| match r {
                Response::Render { frame } => Ok(frame),
                other => bail!("unexpected render response {other:?}"),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(frames.join("\n"))
    }

    fn close(&mut self) -> Result<()> {
        for mut w in self.workers.drain(..) {
            w.shutdown();
        }
        Ok(())
    }
}

impl Drop for SubprocVecEnv {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            tracing::debug!(workers = self.workers.len(), "closing env workers on drop");
            let _ = self.close();
        }
    }
}
