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
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::clock::SystemClock;
use crate::sample::DecodedBuffer;

pub mod cpal;
pub mod mixer;
pub mod mock;

/// Global atomic counter for generating unique voice IDs.
static VOICE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifies a single playing (or scheduled) voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u64);

impl VoiceId {
    /// Returns a new, never before used voice ID.
    pub fn next() -> VoiceId {
        VoiceId(VOICE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice-{}", self.0)
    }
}

/// Everything the audio device needs to play part of a sample.
#[derive(Clone, Debug)]
pub struct VoiceRequest {
    pub id: VoiceId,
    /// The decoded audio. Never mutated once handed to the device.
    pub buffer: Arc<DecodedBuffer>,
    /// When to start, in device time.
    pub start_time: f64,
    /// Where in the buffer to start reading, in seconds.
    pub offset: f64,
    /// How much of the buffer to play, in seconds of source material.
    pub duration: f64,
    /// Linear gain.
    pub gain: f32,
    /// Playback rate. 1.0 is the original pitch, 2.0 is an octave up.
    pub playback_rate: f64,
}

impl VoiceRequest {
    /// How long the voice takes to play in device time.
    pub fn playing_time(&self) -> f64 {
        if self.playback_rate <= 0.0 {
            return self.duration;
        }
        self.duration / self.playback_rate
    }
}

/// Sent by a device whenever a voice stops producing sound, either because it reached its end
/// or because it was stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoiceFinished {
    pub id: VoiceId,
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("no device found with name {0}")]
    NotFound(String),

    #[error("no default output device available")]
    NoDefaultDevice,

    #[error("unsupported output sample format {0}")]
    UnsupportedFormat(String),

    #[error("the audio output is no longer running")]
    Disconnected,

    #[error("unable to list devices: {0}")]
    Devices(#[from] ::cpal::DevicesError),

    #[error("unable to get device name: {0}")]
    DeviceName(#[from] ::cpal::DeviceNameError),

    #[error("unable to get output configuration: {0}")]
    DefaultConfig(#[from] ::cpal::DefaultStreamConfigError),

    #[error("unable to get supported configurations: {0}")]
    SupportedConfigs(#[from] ::cpal::SupportedStreamConfigsError),

    #[error("unable to build output stream: {0}")]
    BuildStream(#[from] ::cpal::BuildStreamError),

    #[error("unable to start output stream: {0}")]
    PlayStream(#[from] ::cpal::PlayStreamError),

    #[error("audio host unavailable: {0}")]
    Host(#[from] ::cpal::HostUnavailable),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An audio output that can play scheduled voices.
pub trait Device: Any + fmt::Display + Send + Sync {
    /// Schedules a voice. Start times in the past start immediately.
    fn start_voice(&self, request: VoiceRequest) -> Result<(), DeviceError>;

    /// Stops a voice. Stopping an unknown or already finished voice does nothing.
    fn stop_voice(&self, id: VoiceId);

    /// The device's current time in seconds.
    fn now(&self) -> f64;

    #[cfg(test)]
    fn to_mock(&self) -> Option<&mock::Device>;
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<cpal::DeviceDescription>, DeviceError> {
    cpal::Device::list()
}

/// Gets a device with the given name. Names starting with "mock" get a mock device that plays
/// nothing but reports voices as finished in real time. Finished events are sent on the given
/// channel.
pub fn get_device(
    name: &str,
    finished_tx: Sender<VoiceFinished>,
) -> Result<Arc<dyn Device>, DeviceError> {
    if name.starts_with("mock") {
        return Ok(Arc::new(
            mock::Device::new(name, Arc::new(SystemClock::new()), finished_tx).with_auto_finish(),
        ));
    }

    Ok(Arc::new(cpal::Device::get(name, finished_tx)?))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_voice_ids_are_unique() {
        let first = VoiceId::next();
        let second = VoiceId::next();
        assert_ne!(first, second);
        assert!(second > first);
    }

    #[test]
    fn test_playing_time() {
        let mut request = VoiceRequest {
            id: VoiceId::next(),
            buffer: Arc::new(DecodedBuffer::mono(vec![0.0; 100], 100)),
            start_time: 0.0,
            offset: 0.0,
            duration: 1.0,
            gain: 1.0,
            playback_rate: 2.0,
        };
        assert_eq!(0.5, request.playing_time());

        request.playback_rate = 0.0;
        assert_eq!(1.0, request.playing_time());
    }

    #[test]
    fn test_mock_device_by_name() {
        let (finished_tx, _finished_rx) = crossbeam_channel::unbounded();
        let device = get_device("mock-device", finished_tx).unwrap();
        assert!(device.to_mock().is_some());
        assert_eq!("mock-device (Mock)", device.to_string());
    }
}
