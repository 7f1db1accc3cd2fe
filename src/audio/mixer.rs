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
// Core audio mixing logic that is independent of any audio backend
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use super::{VoiceFinished, VoiceId, VoiceRequest};
use crate::clock::FrameClock;

/// Messages from the control thread to the mixer.
#[derive(Debug)]
pub enum MixerCommand {
    Start(VoiceRequest),
    Stop(VoiceId),
}

/// A voice being rendered.
struct ActiveVoice {
    request: VoiceRequest,
    /// Output frame at which the voice starts.
    start_frame: u64,
    /// Read position in source frames.
    position: f64,
    /// Source frame at which the voice ends.
    end_position: f64,
    /// Source frames advanced per output frame.
    step: f64,
}

impl ActiveVoice {
    fn new(request: VoiceRequest, output_sample_rate: u32) -> ActiveVoice {
        let source_rate = request.buffer.sample_rate() as f64;
        let start_frame = (request.start_time.max(0.0) * output_sample_rate as f64).round() as u64;
        let position = request.offset.max(0.0) * source_rate;
        let end_position = ((request.offset + request.duration) * source_rate)
            .min(request.buffer.frames() as f64);
        let step = if output_sample_rate == 0 {
            0.0
        } else {
            request.playback_rate.max(0.0) * source_rate / output_sample_rate as f64
        };

        ActiveVoice {
            request,
            start_frame,
            position,
            end_position,
            step,
        }
    }

    fn is_finished(&self) -> bool {
        self.step <= 0.0 || self.position >= self.end_position
    }

    /// Reads the interpolated sample for the given output channel at the current position.
    fn read(&self, output_channel: usize) -> f32 {
        let buffer = &self.request.buffer;
        let channel_count = buffer.channel_count();
        if channel_count == 0 {
            return 0.0;
        }
        let data = buffer.channel(output_channel.min(channel_count - 1));

        let index = self.position as usize;
        let frac = (self.position - index as f64) as f32;
        let s0 = data.get(index).copied().unwrap_or(0.0);
        let s1 = data.get(index + 1).copied().unwrap_or(s0);
        s0 * (1.0 - frac) + s1 * frac
    }

    /// Mixes this voice into an interleaved block that starts at the given output frame.
    fn render_into(&mut self, out: &mut [f32], channels: usize, block_start: u64) {
        for (i, frame) in out.chunks_exact_mut(channels).enumerate() {
            if self.is_finished() {
                return;
            }
            if block_start + (i as u64) < self.start_frame {
                continue;
            }

            for (channel, sample) in frame.iter_mut().enumerate() {
                *sample += self.read(channel) * self.request.gain;
            }
            self.position += self.step;
        }
    }
}

/// Renders scheduled voices into an interleaved output buffer. Owned by the audio callback.
pub struct Mixer {
    voices: Vec<ActiveVoice>,
    commands: Receiver<MixerCommand>,
    finished_tx: Sender<VoiceFinished>,
    clock: Arc<FrameClock>,
    channels: usize,
}

impl Mixer {
    pub fn new(
        channels: u16,
        clock: Arc<FrameClock>,
        commands: Receiver<MixerCommand>,
        finished_tx: Sender<VoiceFinished>,
    ) -> Mixer {
        Mixer {
            voices: Vec::new(),
            commands,
            finished_tx,
            clock,
            channels: channels.max(1) as usize,
        }
    }

    /// The number of voices currently scheduled or playing.
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Applies all pending commands.
    pub fn process_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                MixerCommand::Start(request) => {
                    let voice = ActiveVoice::new(request, self.clock.sample_rate());
                    self.voices.push(voice);
                }
                MixerCommand::Stop(id) => {
                    let before = self.voices.len();
                    self.voices.retain(|voice| voice.request.id != id);
                    if self.voices.len() != before {
                        self.notify_finished(id);
                    }
                }
            }
        }
    }

    /// Fills the interleaved output buffer and advances the clock by the number of frames.
    pub fn render(&mut self, out: &mut [f32]) {
        self.process_commands();
        out.fill(0.0);

        let block_start = self.clock.frames();
        let channels = self.channels;
        for voice in self.voices.iter_mut() {
            voice.render_into(out, channels, block_start);
        }

        let mut finished = Vec::new();
        self.voices.retain(|voice| {
            if voice.is_finished() {
                finished.push(voice.request.id);
                false
            } else {
                true
            }
        });
        for id in finished {
            self.notify_finished(id);
        }

        self.clock.advance((out.len() / channels) as u64);
    }

    fn notify_finished(&self, id: VoiceId) {
        let _ = self.finished_tx.try_send(VoiceFinished { id });
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use crossbeam_channel::unbounded;

    use super::*;
    use crate::sample::DecodedBuffer;
    use crate::testutil::audio::calculate_rms;

    struct Harness {
        mixer: Mixer,
        commands: Sender<MixerCommand>,
        finished: Receiver<VoiceFinished>,
        clock: Arc<FrameClock>,
    }

    fn harness(channels: u16, sample_rate: u32) -> Harness {
        let (commands_tx, commands_rx) = unbounded();
        let (finished_tx, finished_rx) = unbounded();
        let clock = Arc::new(FrameClock::new(sample_rate));
        Harness {
            mixer: Mixer::new(channels, clock.clone(), commands_rx, finished_tx),
            commands: commands_tx,
            finished: finished_rx,
            clock,
        }
    }

    fn request(buffer: DecodedBuffer, start_time: f64, offset: f64, duration: f64) -> VoiceRequest {
        VoiceRequest {
            id: VoiceId::next(),
            buffer: Arc::new(buffer),
            start_time,
            offset,
            duration,
            gain: 1.0,
            playback_rate: 1.0,
        }
    }

    #[test]
    fn test_renders_offset_and_duration() {
        let mut h = harness(1, 10);
        let buffer = DecodedBuffer::mono((0..10).map(|i| i as f32).collect(), 10);
        let voice = request(buffer, 0.0, 0.2, 0.3);
        let id = voice.id;
        h.commands.send(MixerCommand::Start(voice)).unwrap();

        let mut out = vec![0.0; 5];
        h.mixer.render(&mut out);
        assert_eq!(vec![2.0, 3.0, 4.0, 0.0, 0.0], out);
        assert_eq!(0, h.mixer.active_voices());
        assert_eq!(id, h.finished.try_recv().unwrap().id);
        assert_eq!(5, h.clock.frames());
    }

    #[test]
    fn test_start_time_is_honored() {
        let mut h = harness(1, 10);
        let buffer = DecodedBuffer::mono(vec![1.0; 10], 10);
        h.commands
            .send(MixerCommand::Start(request(buffer, 0.7, 0.0, 0.2)))
            .unwrap();

        let mut out = vec![0.0; 5];
        h.mixer.render(&mut out);
        assert_eq!(vec![0.0; 5], out);
        assert_eq!(1, h.mixer.active_voices());

        h.mixer.render(&mut out);
        assert_eq!(vec![0.0, 0.0, 1.0, 1.0, 0.0], out);
        assert_eq!(0, h.mixer.active_voices());
    }

    #[test]
    fn test_gain_and_channel_mapping() {
        let mut h = harness(2, 10);
        let buffer = DecodedBuffer::mono(vec![1.0; 10], 10);
        let mut voice = request(buffer, 0.0, 0.0, 1.0);
        voice.gain = 0.5;
        h.commands.send(MixerCommand::Start(voice)).unwrap();

        let mut out = vec![0.0; 4];
        h.mixer.render(&mut out);
        // Mono sources are copied to every output channel.
        assert_eq!(vec![0.5; 4], out);
        assert_eq!(2, h.clock.frames());
    }

    #[test]
    fn test_playback_rate() {
        let mut h = harness(1, 10);
        let buffer = DecodedBuffer::mono((0..10).map(|i| i as f32).collect(), 10);
        let mut voice = request(buffer, 0.0, 0.0, 1.0);
        voice.playback_rate = 2.0;
        h.commands.send(MixerCommand::Start(voice)).unwrap();

        let mut out = vec![0.0; 6];
        h.mixer.render(&mut out);
        assert_eq!(vec![0.0, 2.0, 4.0, 6.0, 8.0, 0.0], out);
        assert_eq!(0, h.mixer.active_voices());
    }

    #[test]
    fn test_half_rate_interpolates() {
        let mut h = harness(1, 10);
        let buffer = DecodedBuffer::mono(vec![0.0, 1.0, 2.0, 3.0], 10);
        let mut voice = request(buffer, 0.0, 0.0, 0.4);
        voice.playback_rate = 0.5;
        h.commands.send(MixerCommand::Start(voice)).unwrap();

        let mut out = vec![0.0; 4];
        h.mixer.render(&mut out);
        for (expected, actual) in [0.0, 0.5, 1.0, 1.5].iter().zip(out.iter()) {
            assert_relative_eq!(*expected, *actual);
        }
    }

    #[test]
    fn test_stop_removes_voice() {
        let mut h = harness(1, 100);
        let buffer = DecodedBuffer::mono(vec![0.5; 100], 100);
        let voice = request(buffer, 0.0, 0.0, 1.0);
        let id = voice.id;
        h.commands.send(MixerCommand::Start(voice)).unwrap();

        let mut out = vec![0.0; 10];
        h.mixer.render(&mut out);
        assert!(calculate_rms(&out) > 0.0);

        h.commands.send(MixerCommand::Stop(id)).unwrap();
        h.mixer.render(&mut out);
        assert_eq!(0.0, calculate_rms(&out));
        assert_eq!(id, h.finished.try_recv().unwrap().id);

        // Stopping an unknown voice reports nothing.
        h.commands.send(MixerCommand::Stop(VoiceId::next())).unwrap();
        h.mixer.process_commands();
        assert!(h.finished.try_recv().is_err());
    }

    #[test]
    fn test_voices_are_summed() {
        let mut h = harness(1, 10);
        for _ in 0..3 {
            let buffer = DecodedBuffer::mono(vec![0.25; 10], 10);
            h.commands
                .send(MixerCommand::Start(request(buffer, 0.0, 0.0, 1.0)))
                .unwrap();
        }

        let mut out = vec![0.0; 2];
        h.mixer.render(&mut out);
        assert_eq!(vec![0.75, 0.75], out);
        assert_eq!(3, h.mixer.active_voices());
    }
}
