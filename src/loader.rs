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

//! Decodes audio files into memory.
//!
//! Everything symphonia can read (WAV, FLAC, MP3, OGG, ...) is decoded in full into a planar
//! f32 [DecodedBuffer] at the file's own sample rate.

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info};

use crate::sample::DecodedBuffer;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unable to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: SymphoniaError,
    },

    #[error("{0}: no audio track found")]
    NoTrack(PathBuf),

    #[error("{0}: sample rate not specified")]
    NoSampleRate(PathBuf),

    #[error("{0}: file contains no audio")]
    Empty(PathBuf),

    #[error("decoding task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Decodes the whole file at the given path.
pub fn load_file(path: &Path) -> Result<DecodedBuffer, LoadError> {
    info!(path = ?path, "Loading sample into memory");

    let decode_err = |source: SymphoniaError| LoadError::Decode {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Create a hint to help the format registry guess the format
    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .map_err(decode_err)?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| LoadError::NoTrack(path.to_path_buf()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| LoadError::NoSampleRate(path.to_path_buf()))?;

    let decoder_opts: DecoderOptions = Default::default();
    let mut decoder = get_codecs()
        .make(&params, &decoder_opts)
        .map_err(decode_err)?;

    let mut channels: Vec<Vec<f32>> = Vec::new();
    while let Some((samples, channel_count)) =
        decode_next_packet(format_reader.as_mut(), decoder.as_mut(), track_id)
            .map_err(decode_err)?
    {
        if channels.is_empty() {
            channels = vec![Vec::new(); channel_count];
        }
        deinterleave_into(&mut channels, &samples);
    }

    let buffer = DecodedBuffer::new(channels, sample_rate);
    if buffer.frames() == 0 {
        return Err(LoadError::Empty(path.to_path_buf()));
    }

    debug!(
        path = ?path,
        channels = buffer.channel_count(),
        sample_rate,
        duration = buffer.duration(),
        "Decoded sample"
    );
    Ok(buffer)
}

/// Reads the next packet, treating the various end of stream errors as end of stream.
fn read_next_packet(
    format_reader: &mut dyn FormatReader,
) -> Result<Option<Packet>, SymphoniaError> {
    match format_reader.next_packet() {
        Ok(packet) => Ok(Some(packet)),
        Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Ok(None)
        }
        // Some decoders return DecodeError at EOF instead of IoError
        Err(SymphoniaError::DecodeError(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Decodes the next packet belonging to the track into interleaved f32 samples. Returns the
/// samples and the channel count, or None at the end of the stream.
fn decode_next_packet(
    format_reader: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
    track_id: u32,
) -> Result<Option<(Vec<f32>, usize)>, SymphoniaError> {
    loop {
        let packet = match read_next_packet(format_reader) {
            Ok(Some(packet)) => packet,
            Ok(None) => return Ok(None),
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                decoder.decode(&packet)?
            }
            Err(e) => return Err(e),
        };

        let spec = *decoded.spec();
        let channel_count = spec.channels.count();
        if decoded.frames() == 0 || channel_count == 0 {
            continue;
        }

        let mut sample_buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buffer.copy_interleaved_ref(decoded);
        return Ok(Some((sample_buffer.samples().to_vec(), channel_count)));
    }
}

/// Appends interleaved samples to planar channels.
fn deinterleave_into(channels: &mut [Vec<f32>], interleaved: &[f32]) {
    let channel_count = channels.len();
    if channel_count == 0 {
        return;
    }
    for frame in interleaved.chunks_exact(channel_count) {
        for (channel, sample) in channels.iter_mut().zip(frame) {
            channel.push(*sample);
        }
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use approx::assert_relative_eq;

    use super::*;
    use crate::testutil::{audio::write_wav_with_bits, signals, write_wav};

    #[test]
    fn test_load_float_wav() -> Result<(), Box<dyn Error>> {
        let tempdir = tempfile::tempdir()?;
        let path = tempdir.path().join("ramp.wav");
        let ramp = signals::ramp(4410);
        write_wav(&path, vec![ramp.clone()], 44100)?;

        let buffer = load_file(&path)?;
        assert_eq!(1, buffer.channel_count());
        assert_eq!(44100, buffer.sample_rate());
        assert_eq!(4410, buffer.frames());
        assert_relative_eq!(0.1, buffer.duration(), epsilon = 1e-9);
        for (expected, actual) in ramp.iter().zip(buffer.channel(0)) {
            assert_relative_eq!(*expected, *actual, epsilon = 1e-6);
        }
        Ok(())
    }

    #[test]
    fn test_load_stereo_int_wav() -> Result<(), Box<dyn Error>> {
        let tempdir = tempfile::tempdir()?;
        let path = tempdir.path().join("stereo.wav");
        let left: Vec<i16> = vec![i16::MAX / 2; 1000];
        let right: Vec<i16> = vec![i16::MIN / 2; 1000];
        write_wav_with_bits(&path, vec![left, right], 8000, 16)?;

        let buffer = load_file(&path)?;
        assert_eq!(2, buffer.channel_count());
        assert_eq!(8000, buffer.sample_rate());
        assert_eq!(1000, buffer.frames());
        assert_relative_eq!(0.5, buffer.channel(0)[10], epsilon = 1e-3);
        assert_relative_eq!(-0.5, buffer.channel(1)[10], epsilon = 1e-3);
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let result = load_file(Path::new("/nonexistent/break.wav"));
        assert!(matches!(result, Err(LoadError::Io { .. })));
    }

    #[test]
    fn test_garbage_file() -> Result<(), Box<dyn Error>> {
        let tempdir = tempfile::tempdir()?;
        let path = tempdir.path().join("garbage.wav");
        std::fs::write(&path, b"this is not audio at all")?;

        assert!(load_file(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_empty_wav() -> Result<(), Box<dyn Error>> {
        let tempdir = tempfile::tempdir()?;
        let path = tempdir.path().join("empty.wav");
        write_wav::<f32>(&path, vec![vec![]], 44100)?;

        assert!(load_file(&path).is_err());
        Ok(())
    }
}
