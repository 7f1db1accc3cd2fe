// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Chop points for melodic samples.
//!
//! A melodic sample has no reliable transients, so its chop points come from an external
//! source (typically a script asking a language model for musically interesting boundaries).
//! That source may fail in any number of ways, so it is always wrapped in
//! [FallbackChopPoints], which substitutes evenly spaced points.

use std::future::Future;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::sample::NUM_CHOPS;

/// Default time to wait for an external chop point source.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ChopPointError {
    #[error("unable to run chop point command: {0}")]
    Io(#[from] std::io::Error),

    #[error("chop point command exited with {0}")]
    Exit(ExitStatus),

    #[error("unable to parse chop points: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("expected {expected} chop points, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("chop point {0} is not a finite number")]
    NotFinite(f64),

    #[error("chop point source timed out after {0:?}")]
    Timeout(Duration),
}

/// Something that can suggest chop start times for a sample of the given duration.
pub trait ChopPointSource: Send + Sync {
    fn chop_points(
        &self,
        duration: f64,
    ) -> impl Future<Output = Result<Vec<f64>, ChopPointError>> + Send;
}

/// Evenly spaced chop points. Never fails.
#[derive(Clone, Copy, Debug)]
pub struct LinearChopPoints {
    count: usize,
}

impl LinearChopPoints {
    pub fn new(count: usize) -> LinearChopPoints {
        LinearChopPoints { count }
    }

    /// `count` points starting at 0, spaced `duration / count` apart.
    pub fn points(&self, duration: f64) -> Vec<f64> {
        if self.count == 0 {
            return Vec::new();
        }
        let interval = duration.max(0.0) / self.count as f64;
        (0..self.count).map(|i| i as f64 * interval).collect()
    }
}

impl Default for LinearChopPoints {
    fn default() -> Self {
        LinearChopPoints::new(NUM_CHOPS)
    }
}

impl ChopPointSource for LinearChopPoints {
    async fn chop_points(&self, duration: f64) -> Result<Vec<f64>, ChopPointError> {
        Ok(self.points(duration))
    }
}

/// The JSON document an external chop point command is expected to print.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChopPointResponse {
    chop_start_times: Vec<f64>,
}

/// Runs an external command to get chop points. The sample duration in seconds is appended as
/// the last argument, and the command must print `{"chopStartTimes": [...]}` on stdout.
#[derive(Clone, Debug)]
pub struct CommandChopPoints {
    command: String,
    args: Vec<String>,
}

impl CommandChopPoints {
    pub fn new(command: &str, args: Vec<String>) -> CommandChopPoints {
        CommandChopPoints {
            command: command.to_string(),
            args,
        }
    }
}

impl ChopPointSource for CommandChopPoints {
    async fn chop_points(&self, duration: f64) -> Result<Vec<f64>, ChopPointError> {
        debug!(command = self.command, duration, "Requesting chop points");

        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(format!("{:.3}", duration))
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ChopPointError::Exit(output.status));
        }

        let response: ChopPointResponse = serde_json::from_slice(&output.stdout)?;
        Ok(response.chop_start_times)
    }
}

/// Validates and normalizes externally provided chop points: exactly `count` finite values,
/// clamped to [0, duration], sorted, with the first forced to 0.
pub fn normalize(
    points: Vec<f64>,
    duration: f64,
    count: usize,
) -> Result<Vec<f64>, ChopPointError> {
    if points.len() != count {
        return Err(ChopPointError::WrongLength {
            expected: count,
            actual: points.len(),
        });
    }
    if let Some(bad) = points.iter().find(|point| !point.is_finite()) {
        return Err(ChopPointError::NotFinite(*bad));
    }

    let duration = duration.max(0.0);
    let mut points: Vec<f64> = points
        .into_iter()
        .map(|point| point.clamp(0.0, duration))
        .collect();
    points.sort_by(f64::total_cmp);
    if let Some(first) = points.first_mut() {
        *first = 0.0;
    }
    Ok(points)
}

/// Tries a primary source and falls back to linear chop points on any failure.
pub struct FallbackChopPoints<P> {
    primary: Option<P>,
    timeout: Duration,
    fallback: LinearChopPoints,
}

impl<P: ChopPointSource> FallbackChopPoints<P> {
    pub fn new(primary: P, timeout: Duration) -> FallbackChopPoints<P> {
        FallbackChopPoints {
            primary: Some(primary),
            timeout,
            fallback: LinearChopPoints::default(),
        }
    }

    /// A provider with no primary source. Always returns linear chop points.
    pub fn linear() -> FallbackChopPoints<P> {
        FallbackChopPoints {
            primary: None,
            timeout: DEFAULT_TIMEOUT,
            fallback: LinearChopPoints::default(),
        }
    }

    /// Changes the number of chop points requested. Defaults to [NUM_CHOPS].
    pub fn with_count(mut self, count: usize) -> FallbackChopPoints<P> {
        self.fallback = LinearChopPoints::new(count);
        self
    }

    /// The number of chop points this provider returns.
    pub fn count(&self) -> usize {
        self.fallback.count
    }

    /// Returns exactly [FallbackChopPoints::count] ascending chop points in [0, duration],
    /// starting at 0.
    pub async fn chop_points(&self, duration: f64) -> Vec<f64> {
        let primary = match &self.primary {
            Some(primary) => primary,
            None => return self.fallback.points(duration),
        };

        let result = match tokio::time::timeout(self.timeout, primary.chop_points(duration)).await
        {
            Ok(result) => result,
            Err(_) => Err(ChopPointError::Timeout(self.timeout)),
        };

        match result.and_then(|points| normalize(points, duration, self.count())) {
            Ok(points) => points,
            Err(e) => {
                warn!(
                    err = e.to_string(),
                    "Chop point source failed, falling back to linear chops"
                );
                self.fallback.points(duration)
            }
        }
    }
}
