//! Environment worker process: serves one environment instance over a
//! JSON-lines pipe.
//!
//! Each request is a single JSON object on its own line; the worker answers
//! every request with exactly one response line.
//!
//! ```text
//! -> {"cmd":"spaces"}
//! <- {"status":"spaces","observation_space":{...},"action_space":{...}}
//! -> {"cmd":"reset"}
//! <- {"status":"reset","observation":[0.01,-0.02,0.03,0.04]}
//! -> {"cmd":"step","action":{"discrete":1}}
//! <- {"status":"step","observation":[...],"reward":1.0,"done":false,"info":{...}}
//! -> {"cmd":"close"}
//! <- {"status":"closed"}
//! ```

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::step_with_auto_reset;
use crate::env::{make_env, Action, EnvSpaces, Environment, Observation, Transition};

/// Parent -> worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    Spaces,
    Reset,
    Step { action: Action },
    Render,
    Close,
}

/// Worker -> parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Spaces(EnvSpaces),
    Reset { observation: Observation },
    Step(Transition),
    Render { frame: String },
    Closed,
    Error { message: String },
}

/// Arguments the parent passes to a worker process.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerArgs {
    pub env_id: String,
    pub seed: u64,
    pub index: usize,
    pub max_episode_steps: Option<usize>,
    pub monitor_path: Option<PathBuf>,
}

impl WorkerArgs {
    /// Command-line flags understood by the `env-worker` subcommand.
    pub fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec![
            "--env-id".to_string(),
            self.env_id.clone(),
            "--seed".to_string(),
            self.seed.to_string(),
            "--index".to_string(),
            self.index.to_string(),
        ];
        if let Some(limit) = self.max_episode_steps {
            args.push("--max-episode-steps".to_string());
            args.push(limit.to_string());
        }
        if let Some(path) = &self.monitor_path {
            args.push("--monitor-path".to_string());
            args.push(path.display().to_string());
        }
        args
    }
}

/// Build the environment described by `args` and serve it on stdin/stdout
/// until the parent closes the pipe or sends `close`.
pub fn run(args: &WorkerArgs) -> Result<()> {
    let env = make_env(
        &args.env_id,
        args.seed,
        args.max_episode_steps,
        args.monitor_path.as_deref(),
    )
    .with_context(|| format!("worker {} failed to build {}", args.index, args.env_id))?;

    tracing::debug!(index = args.index, env_id = %args.env_id, "env worker ready");

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve(env, stdin.lock(), stdout.lock())
}

/// Request loop. Environment failures are reported back as
/// [`Response::Error`]; only pipe failures end the loop with an error.
pub fn serve<E, R, W>(mut env: E, reader: R, mut writer: W) -> Result<()>
where
    E: Environment,
    R: BufRead,
    W: Write,
{
    for line in reader.lines() {
        let line = line.context("failed to read request")?;
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                respond(
                    &mut writer,
                    &Response::Error {
                        message: format!("malformed request: {e}"),
                    },
                )?;
                continue;
            }
        };

        let response = match request {
            Request::Spaces => Ok(Response::Spaces(env.spaces())),
            Request::Reset => env.reset().map(|observation| Response::Reset { observation }),
            Request::Step { action } => step_with_auto_reset(&mut env, &action).map(Response::Step),
            Request::Render => Ok(Response::Render {
                frame: env.render(),
            }),
            Request::Close => {
                respond(&mut writer, &Response::Closed)?;
                return Ok(());
            }
        }
        .unwrap_or_else(|e| Response::Error {
            message: format!("{e:#}"),
        });

        respond(&mut writer, &response)?;
    }
    Ok(())
}

fn respond<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    serde_json::to_writer(&mut *writer, response).context("failed to encode response")?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn run_session(requests: &[Request]) -> Vec<Response> {
        let env = make_env("CartPole-v1", 0, None, None).unwrap();
        let mut input = String::new();
        for r in requests {
            input.push_str(&serde_json::to_string(r).unwrap());
            input.push('\n');
        }
        let mut output = Vec::new();
        serve(env, Cursor::new(input), &mut output).unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn answers_each_request_once() {
        let responses = run_session(&[
            Request::Spaces,
            Request::Reset,
            Request::Step {
                action: Action::Discrete(0),
            },
            Request::Render,
            Request::Close,
        ]);
        assert_eq!(responses.len(), 5);
        assert!(matches!(responses[0], Response::Spaces(_)));
        assert!(matches!(responses[1], Response::Reset { .. }));
        assert!(matches!(responses[2], Response::Step(_)));
        assert!(matches!(responses[3], Response::Render { .. }));
        assert!(matches!(responses[4], Response::Closed));
    }

    #[test]
    fn env_errors_do_not_kill_the_worker() {
        let responses = run_session(&[
            Request::Step {
                action: Action::Discrete(0),
            },
            Request::Reset,
        ]);
        assert!(matches!(responses[0], Response::Error { .. }));
        assert!(matches!(responses[1], Response::Reset { .. }));
    }

    #[test]
    fn stops_reading_after_close() {
        let responses = run_session(&[Request::Close, Request::Reset]);
        assert_eq!(responses.len(), 1);
    }

    #[test]
    fn cli_args_include_optional_flags() {
        let args = WorkerArgs {
            env_id: "CartPole-v1".into(),
            seed: 9,
            index: 2,
            max_episode_steps: Some(10),
            monitor_path: Some(PathBuf::from("logs/monitor/mon002")),
        };
        let cli = args.to_cli_args();
        assert!(cli.windows(2).any(|w| w == ["--max-episode-steps", "10"]));
        assert!(cli.windows(2).any(|w| w == ["--monitor-path", "logs/monitor/mon002"]));
    }
}
