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
use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, span, Level, Span};

use crate::audio::{Device, VoiceId};
use crate::sample::{PadId, Sample, SampleKind};
use crate::scheduler::track::{LoopMode, TrackConfig, TrackMap};
use crate::scheduler::{PadTrigger, SchedulerState, TransportState, VoiceOwner};

/// The performer. Owns every piece of scheduling state and is driven from a single control
/// thread: pad presses, transport commands, setters and device finished events all come in
/// through `&mut self`.
pub struct Engine {
    /// The device voices are played through.
    device: Arc<dyn Device>,
    /// The loaded samples, if any.
    samples: TrackMap<Option<Arc<Sample>>>,
    /// Per-track settings.
    tracks: TrackMap<TrackConfig>,
    state: SchedulerState,
    /// The logging span.
    span: Span,
}

impl Engine {
    /// Creates an engine. The transport reference time is taken from the device clock now.
    pub fn new(device: Arc<dyn Device>) -> Engine {
        let mut state = SchedulerState::default();
        state.transport.set_reference_time(device.now());

        Engine {
            device,
            samples: TrackMap::default(),
            tracks: TrackMap::default(),
            state,
            span: span!(Level::INFO, "engine"),
        }
    }

    pub fn device(&self) -> Arc<dyn Device> {
        self.device.clone()
    }

    /// Installs a sample, replacing any previous sample of the same kind. Loops pick the new
    /// sample up when their current element ends.
    pub fn load_sample(&mut self, sample: Sample) -> Arc<Sample> {
        let _enter = self.span.enter();

        let sample = Arc::new(sample);
        info!(
            kind = sample.kind().to_string(),
            name = sample.name(),
            duration = sample.duration(),
            chops = sample.chops().len(),
            "Sample loaded"
        );
        self.samples[sample.kind()] = Some(sample.clone());
        sample
    }

    pub fn sample(&self, kind: SampleKind) -> Option<Arc<Sample>> {
        self.samples[kind].clone()
    }

    pub fn track(&self, kind: SampleKind) -> &TrackConfig {
        &self.tracks[kind]
    }

    /// Replaces the settings of both tracks. Values are clamped.
    pub fn set_tracks(&mut self, tracks: TrackMap<TrackConfig>) {
        self.tracks = TrackMap::new(tracks.drums.clamped(), tracks.melody.clamped());
    }

    /// Plays the pad's chop. Any pad press stops the transport if it is playing, even one
    /// whose sample isn't loaded. Nothing is played if the pad's sample isn't loaded.
    pub fn trigger_pad(&mut self, pad: PadId) -> Option<PadTrigger> {
        if self.state.transport.is_playing() {
            self.stop();
        }

        let kind = pad.kind();
        let sample = match self.samples[kind].clone() {
            Some(sample) => sample,
            None => {
                debug!(pad = pad.to_string(), "No sample loaded for pad");
                return None;
            }
        };

        let _enter = self.span.enter();
        let trigger = self.state.pads.trigger(
            self.device.as_ref(),
            &self.state.transport,
            pad,
            &sample,
            &self.tracks[kind],
        )?;

        for voice in trigger.stopped.iter() {
            self.state.owners.remove(voice);
        }
        if !trigger.stitched {
            self.state.playheads.clear_kind(kind);
        }
        self.state.playheads.push(trigger.scheduled.clone());
        self.state
            .owners
            .insert(trigger.scheduled.voice, VoiceOwner::Pad(pad));
        Some(trigger)
    }

    /// Starts both track loops. Returns false if already playing or there is nothing to play.
    pub fn play(&mut self) -> bool {
        let _enter = self.span.enter();

        if self.state.transport.is_playing() {
            info!("Already playing");
            return false;
        }
        if self.samples.iter().all(|(_, sample)| sample.is_none()) {
            info!("No samples loaded, nothing to play");
            return false;
        }

        self.state.playheads.clear();
        self.state.transport.set_state(TransportState::Playing);
        for kind in SampleKind::ALL {
            let sample = self.samples[kind].clone();
            let started = self.state.loops[kind].start(
                self.device.as_ref(),
                sample.as_deref(),
                &self.tracks[kind],
            );
            if let Some(scheduled) = started {
                let generation = self.state.loops[kind].generation();
                self.state
                    .owners
                    .insert(scheduled.voice, VoiceOwner::Loop { kind, generation });
            }
        }

        if !self.any_loop_playing() {
            info!("No track had anything to loop");
            self.state.transport.set_state(TransportState::Idle);
            return false;
        }
        true
    }

    /// Stops both track loops along with the drum chain and the melody pad voice. Does nothing
    /// if the transport is idle.
    pub fn stop(&mut self) {
        let _enter = self.span.enter();

        if !self.state.transport.is_playing() {
            debug!("Transport already stopped");
            return;
        }

        let device = self.device.as_ref();
        for kind in SampleKind::ALL {
            if let Some(voice) = self.state.loops[kind].stop(device) {
                self.state.owners.remove(&voice);
            }
        }
        self.state.pads.reset_stitch();
        for voice in self.state.pads.stop_voices(device, SampleKind::Melodic) {
            self.state.owners.remove(&voice);
        }
        self.state.playheads.clear();
        self.state.transport.set_state(TransportState::Idle);
        info!("Transport stopped");
    }

    /// Stops everything, including pad voices.
    pub fn reset(&mut self) {
        self.stop();

        let _enter = self.span.enter();
        for voice in self.state.pads.stop_all(self.device.as_ref()) {
            self.state.owners.remove(&voice);
        }
        self.state.pads.reset_stitch();
        self.state.playheads.clear();
        info!("Reset");
    }

    pub fn transport_state(&self) -> TransportState {
        self.state.transport.state()
    }

    pub fn bpm(&self) -> f64 {
        self.state.transport.bpm()
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.state.transport.set_bpm(bpm);
    }

    pub fn quantize(&self) -> bool {
        self.state.transport.quantize()
    }

    pub fn set_quantize(&mut self, quantize: bool) {
        self.state.transport.set_quantize(quantize);
    }

    /// Sets a track's volume. Applies to voices started from now on.
    pub fn set_volume(&mut self, kind: SampleKind, volume: i64) {
        self.tracks[kind].set_volume(volume);
    }

    /// Sets a track's pitch shift in semitones. Applies to voices started from now on.
    pub fn set_pitch(&mut self, kind: SampleKind, pitch: i64) {
        self.tracks[kind].set_pitch(pitch);
    }

    pub fn set_loop_mode(&mut self, kind: SampleKind, loop_mode: LoopMode) {
        self.tracks[kind].set_loop_mode(loop_mode);
    }

    pub fn set_sequence(&mut self, kind: SampleKind, sequence: &str) {
        self.tracks[kind].set_sequence(sequence);
    }

    /// Pads with a voice that is scheduled or playing.
    pub fn active_pads(&self) -> BTreeSet<PadId> {
        self.state.pads.active_pads()
    }

    /// Returns true while there are playhead positions worth polling for.
    pub fn needs_playhead_sweep(&self) -> bool {
        self.state.transport.is_playing() || self.state.playheads.is_sweeping()
    }

    /// Computes each track's playhead position in seconds into its sample. While the
    /// transport is playing this comes from the loops, otherwise from triggered pads.
    pub fn tick_playheads(&mut self) -> TrackMap<Option<f64>> {
        let now = self.device.now();
        if self.state.transport.is_playing() {
            let loops = &self.state.loops;
            return TrackMap::from_fn(|kind| loops[kind].position(now));
        }

        let pad = self.state.playheads.sweep(now);
        TrackMap::from_fn(|kind| {
            pad.filter(|pad| pad.kind == kind).map(|pad| pad.position)
        })
    }

    /// Handles a finished event from the device. Loop elements chain into the next element;
    /// pad voices leave the active set. Unknown and stale voices are ignored.
    pub fn on_voice_finished(&mut self, voice: VoiceId) {
        let _enter = self.span.enter();

        match self.state.owners.remove(&voice) {
            None => debug!(voice = voice.0, "Ignoring finished event for unknown voice"),
            Some(VoiceOwner::Pad(pad)) => {
                self.state.pads.finish(voice);
                debug!(pad = pad.to_string(), voice = voice.0, "Pad voice finished");
            }
            Some(VoiceOwner::Loop { kind, generation }) => {
                let sample = self.samples[kind].clone();
                let next = self.state.loops[kind].on_element_finished(
                    self.device.as_ref(),
                    voice,
                    generation,
                    sample.as_deref(),
                    &self.tracks[kind],
                );
                if let Some(next) = next {
                    let generation = self.state.loops[kind].generation();
                    self.state
                        .owners
                        .insert(next.voice, VoiceOwner::Loop { kind, generation });
                } else if self.state.transport.is_playing() && !self.any_loop_playing() {
                    info!("Both loops have run out, transport stopped");
                    self.state.transport.set_state(TransportState::Idle);
                }
            }
        }
    }

    fn any_loop_playing(&self) -> bool {
        self.state.loops.iter().any(|(_, sequencer)| sequencer.is_playing())
    }

    #[cfg(test)]
    fn tracked_voices(&self) -> usize {
        self.state.owners.len()
    }
}
