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
use tracing::{debug, info};

use super::track::{LoopMode, TrackConfig};
use super::{start_voice, ScheduledVoice};
use crate::audio::{Device, VoiceId};
use crate::sample::{Chop, Sample, SampleKind};

/// Parses comma separated 1-based chop numbers into 0-based chop indices. Tokens that are not
/// integers or are out of range are dropped.
pub fn parse_sequence(text: &str, chop_count: usize) -> Vec<usize> {
    text.split(',')
        .filter_map(|token| token.trim().parse::<i64>().ok())
        .filter_map(|number| number.checked_sub(1))
        .filter_map(|index| usize::try_from(index).ok())
        .filter(|index| *index < chop_count)
        .collect()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopState {
    #[default]
    Stopped,
    Playing,
}

/// Loops one track by chaining elements off of finished events.
///
/// Every start and stop bumps the generation. Finished events carry the generation of the
/// element that produced them and are ignored unless both the generation and the voice match
/// what is currently playing, so a stopped chain can never resume.
#[derive(Debug)]
pub struct LoopSequencer {
    kind: SampleKind,
    state: LoopState,
    generation: u64,
    cursor: usize,
    current: Option<ScheduledVoice>,
}

impl LoopSequencer {
    pub fn new(kind: SampleKind) -> LoopSequencer {
        LoopSequencer {
            kind,
            state: LoopState::Stopped,
            generation: 0,
            cursor: 0,
            current: None,
        }
    }

    pub fn kind(&self) -> SampleKind {
        self.kind
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == LoopState::Playing
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The element currently scheduled or playing.
    pub fn current(&self) -> Option<&ScheduledVoice> {
        self.current.as_ref()
    }

    /// The play position within the sample, if the current element is sounding.
    pub fn position(&self, now: f64) -> Option<f64> {
        self.current.as_ref().and_then(|voice| voice.position(now))
    }

    /// Starts looping from the first element. If there is nothing to play the sequencer stays
    /// stopped.
    pub fn start(
        &mut self,
        device: &dyn Device,
        sample: Option<&Sample>,
        track: &TrackConfig,
    ) -> Option<ScheduledVoice> {
        self.generation += 1;
        self.cursor = 0;
        self.current = None;
        self.state = LoopState::Playing;

        let scheduled = sample.and_then(|sample| self.schedule_next(device, sample, track));
        match &scheduled {
            Some(voice) => info!(
                track = self.kind.to_string(),
                generation = self.generation,
                start = voice.start_time,
                "Loop started"
            ),
            None => {
                debug!(track = self.kind.to_string(), "Nothing to loop");
                self.state = LoopState::Stopped;
            }
        }
        scheduled
    }

    /// Stops looping and halts the current element. Returns the halted voice. Does nothing if
    /// already stopped.
    pub fn stop(&mut self, device: &dyn Device) -> Option<VoiceId> {
        if self.state == LoopState::Stopped {
            return None;
        }

        // Invalidate outstanding finished events before touching the voice.
        self.generation += 1;
        self.state = LoopState::Stopped;
        let voice = self.current.take().map(|current| current.voice);
        if let Some(voice) = voice {
            device.stop_voice(voice);
        }
        info!(track = self.kind.to_string(), "Loop stopped");
        voice
    }

    /// Handles the end of a loop element by scheduling the next one. Returns None for stale
    /// events or when there is nothing left to play.
    pub fn on_element_finished(
        &mut self,
        device: &dyn Device,
        voice: VoiceId,
        generation: u64,
        sample: Option<&Sample>,
        track: &TrackConfig,
    ) -> Option<ScheduledVoice> {
        let is_current = self
            .current
            .as_ref()
            .map(|current| current.voice == voice)
            .unwrap_or(false);
        if self.state != LoopState::Playing || generation != self.generation || !is_current {
            debug!(
                track = self.kind.to_string(),
                voice = voice.0,
                generation,
                current_generation = self.generation,
                "Ignoring stale loop element"
            );
            return None;
        }

        self.current = None;
        self.cursor += 1;
        let scheduled = sample.and_then(|sample| self.schedule_next(device, sample, track));
        if scheduled.is_none() {
            debug!(track = self.kind.to_string(), "Loop ran out of elements");
            self.state = LoopState::Stopped;
        }
        scheduled
    }

    /// Picks the element at the cursor and starts it now. Chops with no length are skipped.
    fn schedule_next(
        &mut self,
        device: &dyn Device,
        sample: &Sample,
        track: &TrackConfig,
    ) -> Option<ScheduledVoice> {
        let chop = match track.loop_mode() {
            LoopMode::Full => {
                self.cursor = 0;
                Some(Chop::whole(sample.duration())).filter(|chop| chop.duration() > 0.0)
            }
            LoopMode::Chop => self.next_chop(sample, track),
        }?;

        let scheduled = start_voice(device, sample, chop, track, device.now())?;
        self.current = Some(scheduled.clone());
        Some(scheduled)
    }

    fn next_chop(&mut self, sample: &Sample, track: &TrackConfig) -> Option<Chop> {
        let sequence = parse_sequence(track.sequence(), sample.chops().len());
        if sequence.is_empty() {
            return None;
        }

        // The sequence text may have changed since the cursor last moved.
        self.cursor %= sequence.len();
        for _ in 0..sequence.len() {
            let chop = sample.chop(sequence[self.cursor]);
            if let Some(chop) = chop.filter(|chop| chop.duration() > 0.0) {
                return Some(chop);
            }
            self.cursor = (self.cursor + 1) % sequence.len();
        }
        None
    }
}
