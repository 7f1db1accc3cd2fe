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
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

use crate::sample::SampleKind;

/// Volume is a percentage. Values above 100 boost.
pub const MAX_VOLUME: u8 = 120;
pub const DEFAULT_VOLUME: u8 = 100;

/// Pitch shift range in semitones.
pub const MIN_PITCH: i8 = -12;
pub const MAX_PITCH: i8 = 12;

/// What a track loops over while the transport is playing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    /// The whole sample, over and over.
    #[default]
    Full,
    /// The chops named by the track's sequence, in order.
    Chop,
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopMode::Full => write!(f, "full"),
            LoopMode::Chop => write!(f, "chop"),
        }
    }
}

impl FromStr for LoopMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(LoopMode::Full),
            "chop" | "chops" => Ok(LoopMode::Chop),
            other => Err(format!("unknown loop mode: {}", other)),
        }
    }
}

/// Per-track playback settings. Owned by the caller, read by the scheduler.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    loop_mode: LoopMode,
    /// Comma separated 1-based chop numbers, as typed by the user.
    sequence: String,
    #[serde(deserialize_with = "deserialize_volume")]
    volume: u8,
    #[serde(deserialize_with = "deserialize_pitch")]
    pitch: i8,
}

fn clamp_volume(volume: i64) -> u8 {
    volume.clamp(0, MAX_VOLUME as i64) as u8
}

fn clamp_pitch(pitch: i64) -> i8 {
    pitch.clamp(MIN_PITCH as i64, MAX_PITCH as i64) as i8
}

/// Out of range volumes in a session file are clamped rather than rejected.
fn deserialize_volume<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    i64::deserialize(deserializer).map(clamp_volume)
}

fn deserialize_pitch<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i8, D::Error> {
    i64::deserialize(deserializer).map(clamp_pitch)
}

impl Default for TrackConfig {
    fn default() -> Self {
        TrackConfig {
            loop_mode: LoopMode::Full,
            sequence: "1".to_string(),
            volume: DEFAULT_VOLUME,
            pitch: 0,
        }
    }
}

impl TrackConfig {
    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn set_loop_mode(&mut self, loop_mode: LoopMode) {
        self.loop_mode = loop_mode;
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    pub fn set_sequence(&mut self, sequence: &str) {
        self.sequence = sequence.to_string();
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Sets the volume, clamped to [0, MAX_VOLUME].
    pub fn set_volume(&mut self, volume: i64) {
        self.volume = clamp_volume(volume);
    }

    pub fn pitch(&self) -> i8 {
        self.pitch
    }

    /// Sets the pitch shift in semitones, clamped to [MIN_PITCH, MAX_PITCH].
    pub fn set_pitch(&mut self, pitch: i64) {
        self.pitch = clamp_pitch(pitch);
    }

    /// Linear gain for voices on this track.
    pub fn gain(&self) -> f32 {
        self.volume as f32 / 100.0
    }

    /// Playback rate for voices on this track. A detune of `pitch * 100` cents.
    pub fn playback_rate(&self) -> f64 {
        2f64.powf(self.pitch as f64 / 12.0)
    }

    /// Returns a copy with out of range values clamped.
    pub fn clamped(mut self) -> TrackConfig {
        self.set_volume(self.volume as i64);
        self.set_pitch(self.pitch as i64);
        self
    }
}

/// One value per track.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackMap<T> {
    pub drums: T,
    pub melody: T,
}

impl<T> TrackMap<T> {
    pub fn new(drums: T, melody: T) -> TrackMap<T> {
        TrackMap { drums, melody }
    }

    /// Builds a map by calling the function for each kind.
    pub fn from_fn(mut f: impl FnMut(SampleKind) -> T) -> TrackMap<T> {
        TrackMap {
            drums: f(SampleKind::Drums),
            melody: f(SampleKind::Melodic),
        }
    }

    pub fn get(&self, kind: SampleKind) -> &T {
        match kind {
            SampleKind::Drums => &self.drums,
            SampleKind::Melodic => &self.melody,
        }
    }

    pub fn get_mut(&mut self, kind: SampleKind) -> &mut T {
        match kind {
            SampleKind::Drums => &mut self.drums,
            SampleKind::Melodic => &mut self.melody,
        }
    }

    /// Iterates over (kind, value) pairs, drums first.
    pub fn iter(&self) -> impl Iterator<Item = (SampleKind, &T)> {
        SampleKind::ALL.into_iter().map(move |kind| (kind, self.get(kind)))
    }
}

impl<T> Index<SampleKind> for TrackMap<T> {
    type Output = T;

    fn index(&self, kind: SampleKind) -> &T {
        self.get(kind)
    }
}

impl<T> IndexMut<SampleKind> for TrackMap<T> {
    fn index_mut(&mut self, kind: SampleKind) -> &mut T {
        self.get_mut(kind)
    }
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_defaults() {
        let track = TrackConfig::default();
        assert_eq!(LoopMode::Full, track.loop_mode());
        assert_eq!("1", track.sequence());
        assert_eq!(1.0, track.gain());
        assert_eq!(1.0, track.playback_rate());
    }

    #[test]
    fn test_clamping() {
        let mut track = TrackConfig::default();
        track.set_volume(500);
        assert_eq!(MAX_VOLUME, track.volume());
        assert_relative_eq!(1.2, track.gain());
        track.set_volume(-3);
        assert_eq!(0, track.volume());

        track.set_pitch(40);
        assert_eq!(12, track.pitch());
        assert_relative_eq!(2.0, track.playback_rate());
        track.set_pitch(-40);
        assert_eq!(-12, track.pitch());
        assert_relative_eq!(0.5, track.playback_rate());
    }

    #[test]
    fn test_loop_mode_parsing() {
        assert_eq!(Ok(LoopMode::Full), "full".parse());
        assert_eq!(Ok(LoopMode::Chop), " Chop ".parse());
        assert!("half".parse::<LoopMode>().is_err());
    }

    #[test]
    fn test_track_map() {
        let mut map = TrackMap::new(1, 2);
        assert_eq!(1, map[SampleKind::Drums]);
        map[SampleKind::Melodic] += 10;
        assert_eq!(12, *map.get(SampleKind::Melodic));

        let kinds: Vec<SampleKind> = map.iter().map(|(kind, _)| kind).collect();
        assert_eq!(SampleKind::ALL.to_vec(), kinds);

        let names = TrackMap::from_fn(|kind| kind.to_string());
        assert_eq!("melody", names.melody);
    }
}
