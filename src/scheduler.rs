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

//! Voice scheduling.
//!
//! All scheduling state lives in one [SchedulerState] that is only ever touched from the
//! control thread. The audio device receives finished voices as immutable requests and reports
//! back through [crate::audio::VoiceFinished] events; nothing here is shared with the audio
//! callback.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, error};

use crate::audio::{Device, VoiceId, VoiceRequest};
use crate::sample::{Chop, PadId, Sample, SampleKind};

pub mod playhead;
pub mod sequencer;
pub mod track;

use playhead::PlayheadTracker;
use sequencer::LoopSequencer;
use track::{TrackConfig, TrackMap};

pub const DEFAULT_BPM: f64 = 120.0;
pub const MIN_BPM: f64 = 40.0;
pub const MAX_BPM: f64 = 300.0;

/// How far past a sixteenth, in sixteenths, a press may be and still count as on the grid.
const GRID_TOLERANCE: f64 = 1e-9;

/// Whether the per-track loops are running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportState {
    #[default]
    Idle,
    Playing,
}

/// Tempo, quantization and the time reference quantization is relative to.
#[derive(Clone, Debug)]
pub struct Transport {
    state: TransportState,
    reference_time: Option<f64>,
    bpm: f64,
    quantize: bool,
}

impl Default for Transport {
    fn default() -> Self {
        Transport {
            state: TransportState::Idle,
            reference_time: None,
            bpm: DEFAULT_BPM,
            quantize: false,
        }
    }
}

impl Transport {
    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn set_state(&mut self, state: TransportState) {
        self.state = state;
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn reference_time(&self) -> Option<f64> {
        self.reference_time
    }

    pub fn set_reference_time(&mut self, reference_time: f64) {
        self.reference_time = Some(reference_time);
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Sets the tempo, clamped to [MIN_BPM, MAX_BPM]. Non-finite values are ignored.
    pub fn set_bpm(&mut self, bpm: f64) {
        if bpm.is_finite() {
            self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        }
    }

    pub fn quantize(&self) -> bool {
        self.quantize
    }

    pub fn set_quantize(&mut self, quantize: bool) {
        self.quantize = quantize;
    }

    /// The length of a sixteenth note in seconds.
    pub fn sixteenth(&self) -> f64 {
        60.0 / self.bpm / 4.0
    }

    /// Snaps `now` forward to the next sixteenth note boundary (or leaves it alone if it is on
    /// one). Returns `now` unchanged if quantization is off or there is no reference time.
    pub fn quantized_start_time(&self, now: f64) -> f64 {
        let reference = match self.reference_time {
            Some(reference) if self.quantize => reference,
            _ => return now,
        };

        let interval = self.sixteenth();
        let elapsed_units = (now - reference) / interval;
        // Presses that land on a grid line up to rounding error stay on it.
        reference + (elapsed_units - GRID_TOLERANCE).ceil() * interval
    }
}

/// Drum stitching: consecutive drum hits triggered before the previous one ends are chained
/// back to back.
#[derive(Clone, Debug, Default)]
pub struct StitchState {
    pending_chain_end: Option<f64>,
}

impl StitchState {
    /// Returns true if a chain is still being played at the given time.
    pub fn is_active(&self, now: f64) -> bool {
        matches!(self.pending_chain_end, Some(end) if now < end)
    }

    pub fn chain_end(&self) -> Option<f64> {
        self.pending_chain_end
    }

    /// Appends a chop to the chain.
    fn append(&mut self, duration: f64) {
        let start = self.pending_chain_end.unwrap_or(0.0);
        // Successive additions accumulate floating point error over very long chains.
        self.pending_chain_end = Some(start + duration);
    }

    /// Starts a new chain.
    fn restart(&mut self, start: f64, duration: f64) {
        self.pending_chain_end = Some(start + duration);
    }

    pub fn reset(&mut self) {
        self.pending_chain_end = None;
    }
}

/// A voice handed to the device, with what is needed to derive its play position.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledVoice {
    pub voice: VoiceId,
    pub kind: SampleKind,
    pub chop: Chop,
    pub start_time: f64,
}

impl ScheduledVoice {
    /// When the chop's region has elapsed on the timeline.
    pub fn end_time(&self) -> f64 {
        self.start_time + self.chop.duration()
    }

    /// The play position within the sample at the given time, if the voice is sounding.
    pub fn position(&self, now: f64) -> Option<f64> {
        let elapsed = now - self.start_time;
        if elapsed >= 0.0 && elapsed < self.chop.duration() {
            Some(self.chop.start + elapsed)
        } else {
            None
        }
    }
}

/// Starts a voice for the chop of the sample using the track's gain and pitch. Device errors
/// are logged and treated as nothing having been scheduled.
pub fn start_voice(
    device: &dyn Device,
    sample: &Sample,
    chop: Chop,
    track: &TrackConfig,
    start_time: f64,
) -> Option<ScheduledVoice> {
    let request = VoiceRequest {
        id: VoiceId::next(),
        buffer: sample.buffer(),
        start_time,
        offset: chop.start,
        duration: chop.duration(),
        gain: track.gain(),
        playback_rate: track.playback_rate(),
    };
    let voice = request.id;

    if let Err(e) = device.start_voice(request) {
        error!(
            err = e.to_string(),
            sample = sample.name(),
            "Unable to start voice"
        );
        return None;
    }

    Some(ScheduledVoice {
        voice,
        kind: sample.kind(),
        chop,
        start_time,
    })
}

/// The result of a pad press.
#[derive(Clone, Debug, PartialEq)]
pub struct PadTrigger {
    pub pad: PadId,
    pub scheduled: ScheduledVoice,
    /// True if the chop was appended to an active drum chain.
    pub stitched: bool,
    /// Pad voices cut off by this trigger.
    pub stopped: Vec<VoiceId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PadVoice {
    pad: PadId,
    voice: VoiceId,
}

/// Pad trigger semantics: quantization, drum stitching and melody monophony.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    stitch: StitchState,
    voices: Vec<PadVoice>,
}

impl PlaybackScheduler {
    pub fn stitch(&self) -> &StitchState {
        &self.stitch
    }

    pub fn reset_stitch(&mut self) {
        self.stitch.reset();
    }

    /// Schedules the pad's chop. Returns None if the sample has no such chop or the device
    /// refused the voice.
    pub fn trigger(
        &mut self,
        device: &dyn Device,
        transport: &Transport,
        pad: PadId,
        sample: &Sample,
        track: &TrackConfig,
    ) -> Option<PadTrigger> {
        let chop = sample.chop(pad.chop_index())?;
        let now = device.now();
        let duration = chop.duration();

        let kind = pad.kind();
        let mut stopped = Vec::new();
        let (start_time, stitched) = match self.stitch.chain_end() {
            Some(end) if kind == SampleKind::Drums && self.stitch.is_active(now) => (end, true),
            _ => {
                stopped = self.stop_voices(device, kind);
                (transport.quantized_start_time(now), false)
            }
        };

        // The chain only moves once the device has accepted the voice.
        let scheduled = start_voice(device, sample, chop, track, start_time)?;
        if stitched {
            self.stitch.append(duration);
        } else if kind == SampleKind::Drums {
            self.stitch.restart(start_time, duration);
        }
        debug!(
            pad = pad.to_string(),
            start = start_time,
            stitched,
            "Pad triggered"
        );
        self.voices.push(PadVoice {
            pad,
            voice: scheduled.voice,
        });

        Some(PadTrigger {
            pad,
            scheduled,
            stitched,
            stopped,
        })
    }

    /// Stops every pad voice of the given kind. Returns the stopped voices.
    pub fn stop_voices(&mut self, device: &dyn Device, kind: SampleKind) -> Vec<VoiceId> {
        let mut stopped = Vec::new();
        self.voices.retain(|pad_voice| {
            if pad_voice.pad.kind() == kind {
                device.stop_voice(pad_voice.voice);
                stopped.push(pad_voice.voice);
                false
            } else {
                true
            }
        });
        stopped
    }

    /// Stops every pad voice. Returns the stopped voices.
    pub fn stop_all(&mut self, device: &dyn Device) -> Vec<VoiceId> {
        let mut stopped = self.stop_voices(device, SampleKind::Drums);
        stopped.extend(self.stop_voices(device, SampleKind::Melodic));
        stopped
    }

    /// Forgets a voice that has finished playing. Returns its pad if it was a pad voice.
    pub fn finish(&mut self, voice: VoiceId) -> Option<PadId> {
        let index = self.voices.iter().position(|v| v.voice == voice)?;
        Some(self.voices.remove(index).pad)
    }

    /// Pads with a voice that is scheduled or playing.
    pub fn active_pads(&self) -> BTreeSet<PadId> {
        self.voices.iter().map(|v| v.pad).collect()
    }
}

/// Who a voice belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceOwner {
    Pad(PadId),
    /// A loop element, tagged with the sequencer generation that scheduled it.
    Loop { kind: SampleKind, generation: u64 },
}

/// All mutable scheduling state. Single writer: only the control thread touches it.
#[derive(Debug)]
pub struct SchedulerState {
    pub transport: Transport,
    pub pads: PlaybackScheduler,
    pub loops: TrackMap<LoopSequencer>,
    pub playheads: PlayheadTracker,
    pub owners: HashMap<VoiceId, VoiceOwner>,
}

impl Default for SchedulerState {
    fn default() -> Self {
        SchedulerState {
            transport: Transport::default(),
            pads: PlaybackScheduler::default(),
            loops: TrackMap::from_fn(LoopSequencer::new),
            playheads: PlayheadTracker::default(),
            owners: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use approx::assert_relative_eq;

    use super::*;
    use crate::audio::mock;
    use crate::clock::ManualClock;
    use crate::sample::DecodedBuffer;

    fn transport(bpm: f64, reference: Option<f64>, quantize: bool) -> Transport {
        let mut transport = Transport::default();
        transport.set_bpm(bpm);
        if let Some(reference) = reference {
            transport.set_reference_time(reference);
        }
        transport.set_quantize(quantize);
        transport
    }

    /// Eight chops of 0.5s each.
    fn sample(kind: SampleKind) -> Sample {
        let points: Vec<f64> = (0..8).map(|i| i as f64 * 0.5).collect();
        Sample::from_chop_points(
            "test",
            kind,
            DecodedBuffer::mono(vec![0.0; 4000], 1000),
            &points,
        )
    }

    fn device() -> (mock::Device, Arc<ManualClock>) {
        let (finished_tx, _) = crossbeam_channel::unbounded();
        let clock = Arc::new(ManualClock::new());
        (mock::Device::new("mock", clock.clone(), finished_tx), clock)
    }

    #[test]
    fn test_quantization() {
        let transport = transport(120.0, Some(0.0), true);
        assert_relative_eq!(0.125, transport.sixteenth());
        assert_relative_eq!(0.125, transport.quantized_start_time(0.05));
        assert_relative_eq!(0.125, transport.quantized_start_time(0.125));
        assert_relative_eq!(0.0, transport.quantized_start_time(0.0));
        assert_relative_eq!(0.25, transport.quantized_start_time(0.126));
    }

    #[test]
    fn test_quantization_relative_to_reference() {
        let transport = transport(60.0, Some(1.1), true);
        assert_relative_eq!(1.35, transport.quantized_start_time(1.2));
    }

    #[test]
    fn test_on_grid_presses_are_not_delayed() {
        for bpm in [90.0, 120.0, 133.0, 175.0] {
            for reference in [0.0, 0.3, 1.1, 7.77] {
                let transport = transport(bpm, Some(reference), true);
                let interval = transport.sixteenth();
                for step in 0..500 {
                    let on_grid = reference + step as f64 * interval;
                    assert_relative_eq!(
                        on_grid,
                        transport.quantized_start_time(on_grid),
                        epsilon = 1e-9
                    );
                }
            }
        }
        let transport = transport(90.0, Some(0.3), true);
        assert_relative_eq!(0.3 + 1.0 / 6.0, transport.quantized_start_time(0.3 + 1.0 / 6.0));
    }

    #[test]
    fn test_quantization_disabled() {
        assert_eq!(0.05, transport(120.0, Some(0.0), false).quantized_start_time(0.05));
        assert_eq!(0.05, transport(120.0, None, true).quantized_start_time(0.05));
    }

    #[test]
    fn test_bpm_is_clamped() {
        let mut transport = Transport::default();
        assert_eq!(DEFAULT_BPM, transport.bpm());
        transport.set_bpm(1000.0);
        assert_eq!(MAX_BPM, transport.bpm());
        transport.set_bpm(1.0);
        assert_eq!(MIN_BPM, transport.bpm());
        transport.set_bpm(f64::NAN);
        assert_eq!(MIN_BPM, transport.bpm());
    }

    #[test]
    fn test_drum_stitching() {
        let (device, clock) = device();
        let transport = transport(120.0, Some(0.0), false);
        let sample = sample(SampleKind::Drums);
        let track = TrackConfig::default();
        let mut scheduler = PlaybackScheduler::default();

        let a = scheduler
            .trigger(&device, &transport, PadId(0), &sample, &track)
            .unwrap();
        assert_eq!(0.0, a.scheduled.start_time);
        assert!(!a.stitched);
        assert_eq!(Some(0.5), scheduler.stitch().chain_end());

        clock.set(0.2);
        let b = scheduler
            .trigger(&device, &transport, PadId(3), &sample, &track)
            .unwrap();
        assert_eq!(0.5, b.scheduled.start_time);
        assert!(b.stitched);
        assert_eq!(Some(1.0), scheduler.stitch().chain_end());

        // Nothing was stopped while chaining.
        assert!(device.stopped().is_empty());
        assert_eq!(2, scheduler.active_pads().len());

        // After the chain has run out, a new hit starts fresh and stops the old voices.
        clock.set(1.5);
        let c = scheduler
            .trigger(&device, &transport, PadId(1), &sample, &track)
            .unwrap();
        assert_eq!(1.5, c.scheduled.start_time);
        assert!(!c.stitched);
        assert_eq!(vec![a.scheduled.voice, b.scheduled.voice], device.stopped());
        assert_eq!(device.stopped(), c.stopped);
        assert_eq!(BTreeSet::from([PadId(1)]), scheduler.active_pads());
    }

    #[test]
    fn test_refused_voice_leaves_chain_alone() {
        let (device, clock) = device();
        let transport = transport(120.0, Some(0.0), false);
        let sample = sample(SampleKind::Drums);
        let track = TrackConfig::default();
        let mut scheduler = PlaybackScheduler::default();

        scheduler
            .trigger(&device, &transport, PadId(0), &sample, &track)
            .unwrap();
        assert_eq!(Some(0.5), scheduler.stitch().chain_end());

        device.set_disconnected(true);
        clock.set(0.2);
        assert!(scheduler
            .trigger(&device, &transport, PadId(1), &sample, &track)
            .is_none());
        assert_eq!(Some(0.5), scheduler.stitch().chain_end());
        assert_eq!(1, scheduler.active_pads().len());

        // A refused fresh hit doesn't start a chain either.
        clock.set(2.0);
        assert!(scheduler
            .trigger(&device, &transport, PadId(2), &sample, &track)
            .is_none());
        assert!(!scheduler.stitch().is_active(2.0));

        device.set_disconnected(false);
        clock.set(2.5);
        let c = scheduler
            .trigger(&device, &transport, PadId(2), &sample, &track)
            .unwrap();
        assert_eq!(2.5, c.scheduled.start_time);
        assert_eq!(Some(3.0), scheduler.stitch().chain_end());
    }

    #[test]
    fn test_drum_chain_is_quantized_at_its_start_only() {
        let (device, clock) = device();
        let transport = transport(120.0, Some(0.0), true);
        let sample = sample(SampleKind::Drums);
        let track = TrackConfig::default();
        let mut scheduler = PlaybackScheduler::default();

        clock.set(0.05);
        let a = scheduler
            .trigger(&device, &transport, PadId(0), &sample, &track)
            .unwrap();
        assert_relative_eq!(0.125, a.scheduled.start_time);

        clock.set(0.3);
        let b = scheduler
            .trigger(&device, &transport, PadId(1), &sample, &track)
            .unwrap();
        assert_relative_eq!(0.625, b.scheduled.start_time);
    }

    #[test]
    fn test_melody_is_monophonic() {
        let (device, clock) = device();
        let transport = transport(120.0, Some(0.0), false);
        let sample = sample(SampleKind::Melodic);
        let track = TrackConfig::default();
        let mut scheduler = PlaybackScheduler::default();

        let x = scheduler
            .trigger(&device, &transport, PadId(8), &sample, &track)
            .unwrap();
        clock.set(0.1);
        let y = scheduler
            .trigger(&device, &transport, PadId(9), &sample, &track)
            .unwrap();

        assert_eq!(vec![x.scheduled.voice], device.stopped());
        assert_eq!(vec![x.scheduled.voice], y.stopped);
        assert!(device.is_active(y.scheduled.voice));
        assert_eq!(BTreeSet::from([PadId(9)]), scheduler.active_pads());
        assert_eq!(0.1, y.scheduled.start_time);
        // Melody never touches the drum chain.
        assert_eq!(None, scheduler.stitch().chain_end());
    }

    #[test]
    fn test_voice_parameters_follow_track() {
        let (device, _) = device();
        let transport = transport(120.0, Some(0.0), false);
        let sample = sample(SampleKind::Melodic);
        let mut track = TrackConfig::default();
        track.set_volume(50);
        track.set_pitch(12);
        let mut scheduler = PlaybackScheduler::default();

        scheduler
            .trigger(&device, &transport, PadId(10), &sample, &track)
            .unwrap();
        let request = device.last_started().unwrap();
        assert_eq!(1.0, request.offset);
        assert_eq!(0.5, request.duration);
        assert_eq!(0.5, request.gain);
        assert_relative_eq!(2.0, request.playback_rate);
    }

    #[test]
    fn test_missing_chop_is_ignored() {
        let (device, _) = device();
        let transport = Transport::default();
        let sample = Sample::from_chop_points(
            "short",
            SampleKind::Drums,
            DecodedBuffer::mono(vec![0.0; 1000], 1000),
            &[0.0, 0.5],
        );
        let mut scheduler = PlaybackScheduler::default();

        assert!(scheduler
            .trigger(&device, &transport, PadId(5), &sample, &TrackConfig::default())
            .is_none());
        assert!(device.started().is_empty());
    }

    #[test]
    fn test_finish_forgets_pad() {
        let (device, _) = device();
        let transport = Transport::default();
        let sample = sample(SampleKind::Drums);
        let mut scheduler = PlaybackScheduler::default();

        let a = scheduler
            .trigger(&device, &transport, PadId(2), &sample, &TrackConfig::default())
            .unwrap();
        assert_eq!(Some(PadId(2)), scheduler.finish(a.scheduled.voice));
        assert_eq!(None, scheduler.finish(a.scheduled.voice));
        assert!(scheduler.active_pads().is_empty());
    }

    #[test]
    fn test_scheduled_voice_position() {
        let voice = ScheduledVoice {
            voice: VoiceId::next(),
            kind: SampleKind::Drums,
            chop: Chop::new(2, 1.0, 1.5),
            start_time: 10.0,
        };
        assert_eq!(None, voice.position(9.9));
        assert_eq!(Some(1.0), voice.position(10.0));
        assert_relative_eq!(1.25, voice.position(10.25).unwrap());
        assert_eq!(None, voice.position(10.5));
        assert_eq!(10.5, voice.end_time());
    }
}
