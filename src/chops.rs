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

//! Turns decoded audio into chopped samples.
//!
//! Drum breaks are chopped at detected transients. Melodic samples are chopped by an external
//! chop point source with a linear fallback.

use std::path::Path;

use tracing::info;

use crate::loader::{self, LoadError};
use crate::sample::{DecodedBuffer, Sample, SampleKind, NUM_CHOPS};
use crate::util::filename_display;

pub mod onset;
pub mod provider;

use provider::{ChopPointSource, CommandChopPoints, FallbackChopPoints};

/// Builds [Sample]s from decoded buffers.
pub struct Chopper<P = CommandChopPoints> {
    melodic: FallbackChopPoints<P>,
    num_chops: usize,
}

impl Chopper<CommandChopPoints> {
    /// A chopper that uses linear chop points for melodic samples.
    pub fn linear() -> Chopper<CommandChopPoints> {
        Chopper::new(FallbackChopPoints::linear())
    }
}

impl<P: ChopPointSource> Chopper<P> {
    pub fn new(melodic: FallbackChopPoints<P>) -> Chopper<P> {
        Chopper {
            melodic,
            num_chops: NUM_CHOPS,
        }
    }

    /// Changes the number of chops produced per sample.
    pub fn with_num_chops(mut self, num_chops: usize) -> Chopper<P> {
        self.melodic = self.melodic.with_count(num_chops);
        self.num_chops = num_chops;
        self
    }

    /// Returns the chop start times for the given buffer.
    pub async fn chop_points(&self, kind: SampleKind, buffer: &DecodedBuffer) -> Vec<f64> {
        match kind {
            SampleKind::Drums => onset::detect_chop_points(
                buffer.channel(0),
                buffer.sample_rate(),
                self.num_chops,
            ),
            SampleKind::Melodic => self.melodic.chop_points(buffer.duration()).await,
        }
    }

    /// Chops the buffer and wraps it up as a sample.
    pub async fn chop(&self, name: &str, kind: SampleKind, buffer: DecodedBuffer) -> Sample {
        let points = self.chop_points(kind, &buffer).await;
        let sample = Sample::from_chop_points(name, kind, buffer, &points);
        info!(
            sample = name,
            kind = kind.to_string(),
            chops = sample.chops().len(),
            duration = sample.duration(),
            "Chopped sample"
        );
        sample
    }

    /// Decodes the file on a blocking thread and chops it. The sample is named after the file.
    pub async fn load(&self, kind: SampleKind, path: &Path) -> Result<Sample, LoadError> {
        let buffer = {
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || loader::load_file(&path)).await??
        };
        Ok(self.chop(filename_display(path), kind, buffer).await)
    }
}
