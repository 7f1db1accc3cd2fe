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
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use crate::chops::provider::{CommandChopPoints, FallbackChopPoints, DEFAULT_TIMEOUT};
use crate::chops::Chopper;
use crate::sample::SampleKind;
use crate::scheduler::track::{TrackConfig, TrackMap};
use crate::scheduler::DEFAULT_BPM;

mod error;

pub use error::ConfigError;

const DEFAULT_AUDIO_DEVICE: &str = "default";

/// An external command that suggests melodic chop points.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct ChopProvider {
    /// The command to run. The sample duration in seconds is passed as the last argument.
    command: String,

    /// Arguments passed before the duration.
    #[serde(default)]
    args: Vec<String>,

    /// How long to wait for the command, e.g. "10s" (default: 10s).
    timeout: Option<String>,
}

impl ChopProvider {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the timeout from the configuration.
    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        match &self.timeout {
            Some(timeout) => Ok(DurationString::from_string(timeout.clone())
                .map_err(|e| ConfigError::Timeout {
                    value: timeout.clone(),
                    reason: e.to_string(),
                })?
                .into()),
            None => Ok(DEFAULT_TIMEOUT),
        }
    }
}

/// A YAML representation of a performance session.
#[derive(Deserialize, Clone, Debug)]
pub struct Session {
    /// The audio device to play through. "default" is the default output device.
    audio_device: Option<String>,

    /// The drum break to load at startup.
    drums: Option<String>,

    /// The melodic sample to load at startup.
    melody: Option<String>,

    /// Tempo used for quantization (default: 120).
    bpm: Option<f64>,

    /// Whether pad presses snap to sixteenth notes (default: false).
    quantize: Option<bool>,

    /// Where melodic chop points come from. Absent means evenly spaced chops.
    chop_provider: Option<ChopProvider>,

    /// Per-track settings.
    #[serde(default)]
    tracks: TrackMap<TrackConfig>,

    /// The directory relative paths are resolved against.
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Session {
    /// Loads a session from a YAML file.
    pub fn load(path: &Path) -> Result<Session, ConfigError> {
        let mut session: Session = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;

        session.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(session)
    }

    /// Returns the audio device from the configuration.
    pub fn audio_device(&self) -> &str {
        self.audio_device.as_deref().unwrap_or(DEFAULT_AUDIO_DEVICE)
    }

    /// Returns the path of the sample to load for the given track, resolved against the
    /// session file's directory.
    pub fn sample_path(&self, kind: SampleKind) -> Option<PathBuf> {
        let path = match kind {
            SampleKind::Drums => self.drums.as_ref(),
            SampleKind::Melodic => self.melody.as_ref(),
        }?;
        Some(self.resolve(Path::new(path)))
    }

    /// Resolves a path against the session file's directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Returns the tempo (default: 120). Clamping is left to the transport.
    pub fn bpm(&self) -> f64 {
        self.bpm.unwrap_or(DEFAULT_BPM)
    }

    pub fn quantize(&self) -> bool {
        self.quantize.unwrap_or(false)
    }

    pub fn chop_provider(&self) -> Option<&ChopProvider> {
        self.chop_provider.as_ref()
    }

    /// Returns the track settings with out of range values clamped.
    pub fn tracks(&self) -> TrackMap<TrackConfig> {
        TrackMap::new(
            self.tracks.drums.clone().clamped(),
            self.tracks.melody.clone().clamped(),
        )
    }

    /// Builds the chopper described by the configuration.
    pub fn chopper(&self) -> Result<Chopper, ConfigError> {
        match &self.chop_provider {
            Some(provider) => {
                let source = CommandChopPoints::new(provider.command(), provider.args().to_vec());
                Ok(Chopper::new(FallbackChopPoints::new(source, provider.timeout()?)))
            }
            None => Ok(Chopper::linear()),
        }
    }
}
