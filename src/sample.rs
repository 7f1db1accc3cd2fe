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

//! Samples, chops and pads.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The number of chops every loaded sample is split into.
pub const NUM_CHOPS: usize = 8;

/// The total number of pads. The first half plays drum chops, the second half melody chops.
pub const NUM_PADS: usize = NUM_CHOPS * 2;

/// The two kinds of sample that can be loaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SampleKind {
    Drums,
    Melodic,
}

impl SampleKind {
    /// Both kinds, in pad order.
    pub const ALL: [SampleKind; 2] = [SampleKind::Drums, SampleKind::Melodic];
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleKind::Drums => write!(f, "drums"),
            SampleKind::Melodic => write!(f, "melody"),
        }
    }
}

impl FromStr for SampleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "drums" | "drum" => Ok(SampleKind::Drums),
            "melody" | "melodic" => Ok(SampleKind::Melodic),
            other => Err(format!("unknown sample kind: {}", other)),
        }
    }
}

/// A labeled [start, end) region of a sample, in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Chop {
    /// The position of this chop within its sample. `None` for the whole-sample element.
    pub id: Option<usize>,
    pub start: f64,
    pub end: f64,
}

impl Chop {
    /// Creates a chop.
    pub fn new(id: usize, start: f64, end: f64) -> Chop {
        Chop {
            id: Some(id),
            start,
            end,
        }
    }

    /// A chop covering the entirety of a sample.
    pub fn whole(duration: f64) -> Chop {
        Chop {
            id: None,
            start: 0.0,
            end: duration,
        }
    }

    /// The length of the chop in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Decoded audio, planar (one Vec per channel).
#[derive(Clone, Debug)]
pub struct DecodedBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl DecodedBuffer {
    /// Creates a new buffer. All channels are expected to have the same length.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> DecodedBuffer {
        DecodedBuffer {
            channels,
            sample_rate,
        }
    }

    /// Creates a single channel buffer.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> DecodedBuffer {
        DecodedBuffer::new(vec![samples], sample_rate)
    }

    /// The samples for the given channel.
    pub fn channel(&self, channel: usize) -> &[f32] {
        self.channels
            .get(channel)
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    /// The duration of the buffer in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// A loaded sample and its chops. Immutable once created; replaced wholesale on a new load.
#[derive(Debug)]
pub struct Sample {
    name: String,
    kind: SampleKind,
    buffer: Arc<DecodedBuffer>,
    chops: Vec<Chop>,
}

impl Sample {
    /// Creates a sample from ascending chop start times. Each chop ends where the next one starts
    /// and the last one ends at the end of the buffer.
    pub fn from_chop_points(
        name: &str,
        kind: SampleKind,
        buffer: DecodedBuffer,
        points: &[f64],
    ) -> Sample {
        let duration = buffer.duration();
        let chops = points
            .iter()
            .enumerate()
            .map(|(i, start)| {
                let end = points.get(i + 1).copied().unwrap_or(duration);
                Chop::new(i, *start, end)
            })
            .collect();

        Sample {
            name: name.to_string(),
            kind,
            buffer: Arc::new(buffer),
            chops,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SampleKind {
        self.kind
    }

    /// The shared audio data, handed as-is to the audio device.
    pub fn buffer(&self) -> Arc<DecodedBuffer> {
        self.buffer.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate()
    }

    pub fn duration(&self) -> f64 {
        self.buffer.duration()
    }

    pub fn chops(&self) -> &[Chop] {
        &self.chops
    }

    pub fn chop(&self, index: usize) -> Option<Chop> {
        self.chops.get(index).copied()
    }
}

/// Identifies one of the performance pads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PadId(pub u8);

impl PadId {
    /// Returns the pad for the given index, if it exists.
    pub fn new(index: usize) -> Option<PadId> {
        if index < NUM_PADS {
            Some(PadId(index as u8))
        } else {
            None
        }
    }

    /// The kind of sample this pad plays.
    pub fn kind(&self) -> SampleKind {
        if (self.0 as usize) < NUM_CHOPS {
            SampleKind::Drums
        } else {
            SampleKind::Melodic
        }
    }

    /// The chop index within the pad's sample.
    pub fn chop_index(&self) -> usize {
        self.0 as usize % NUM_CHOPS
    }
}

impl fmt::Display for PadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pad-{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_chops_partition_sample() {
        let buffer = DecodedBuffer::mono(vec![0.0; 4000], 1000);
        let sample =
            Sample::from_chop_points("test", SampleKind::Drums, buffer, &[0.0, 1.0, 2.5, 3.0]);

        let chops = sample.chops();
        assert_eq!(4, chops.len());
        assert_eq!(0.0, chops[0].start);
        assert_relative_eq!(4.0, chops[3].end);
        for pair in chops.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(Some(2), chops[2].id);
        assert_relative_eq!(0.5, chops[2].duration());
    }

    #[test]
    fn test_buffer_duration() {
        assert_relative_eq!(2.0, DecodedBuffer::mono(vec![0.0; 88200], 44100).duration());
        assert_eq!(0.0, DecodedBuffer::mono(vec![], 44100).duration());
        assert_eq!(0.0, DecodedBuffer::mono(vec![0.0; 10], 0).duration());
        assert!(DecodedBuffer::mono(vec![], 44100).channel(3).is_empty());
    }

    #[test]
    fn test_pad_mapping() {
        assert_eq!(SampleKind::Drums, PadId(0).kind());
        assert_eq!(SampleKind::Drums, PadId(7).kind());
        assert_eq!(7, PadId(7).chop_index());
        assert_eq!(SampleKind::Melodic, PadId(8).kind());
        assert_eq!(0, PadId(8).chop_index());
        assert_eq!(7, PadId(15).chop_index());
        assert_eq!(None, PadId::new(16));
        assert_eq!("pad-3", PadId(3).to_string());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(Ok(SampleKind::Drums), "Drums".parse());
        assert_eq!(Ok(SampleKind::Melodic), "melody".parse());
        assert!("bass".parse::<SampleKind>().is_err());
    }
}
