//! Interactive rendering wrapper.

use std::io::Write;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

use super::{VecEnv, VecStep};
use crate::env::{Action, EnvSpaces, Observation};

/// Renders every frame to a sink after each reset and step, optionally
/// sleeping `1 / fps` seconds per step to keep playback watchable.
///
/// Observations, rewards and episode boundaries pass through unchanged.
pub struct InteractiveRender<V> {
    inner: V,
    fps: u32,
    sink: Box<dyn Write + Send>,
}

impl<V: VecEnv> InteractiveRender<V> {
    /// Render to standard error.
    pub fn new(inner: V, fps: u32) -> Self {
        Self::with_sink(inner, fps, Box::new(std::io::stderr()))
    }

    pub fn with_sink(inner: V, fps: u32, sink: Box<dyn Write + Send>) -> Self {
        Self { inner, fps, sink }
    }

    fn draw(&mut self) -> Result<()> {
        let frame = self.inner.render()?;
        writeln!(self.sink, "{frame}").context("failed to write frame")?;
        self.sink.flush()?;
        Ok(())
    }
}

impl<V: VecEnv> VecEnv for InteractiveRender<V> {
    fn num_envs(&self) -> usize {
        self.inner.num_envs()
    }

    fn spaces(&self) -> &EnvSpaces {
        self.inner.spaces()
    }

    fn reset(&mut self) -> Result<Vec<Observation>> {
        let obs = self.inner.reset()?;
        self.draw()?;
        Ok(obs)
    }

    fn step(&mut self, actions: &[Action]) -> Result<VecStep> {
        let step = self.inner.step(actions)?;
        if self.fps > 0 {
            thread::sleep(Duration::from_secs_f64(1.0 / f64::from(self.fps)));
        }
        self.draw()?;
        Ok(step)
    }

    fn render(&mut self) -> Result<String> {
        self.inner.render()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}
