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
use tracing::debug;

use super::ScheduledVoice;
use crate::sample::SampleKind;

/// Where the pad sweep says the playhead is.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PadPosition {
    pub kind: SampleKind,
    /// Seconds into the sample.
    pub position: f64,
}

/// Display-only playhead derivation for manually triggered pads.
///
/// Entries are garbage collected by the sweep once their end time has passed, not when their
/// voices finish. The sweep reports itself idle once the queue empties so the caller can stop
/// polling.
#[derive(Debug, Default)]
pub struct PlayheadTracker {
    queue: Vec<ScheduledVoice>,
}

impl PlayheadTracker {
    /// Adds a triggered pad voice to the queue.
    pub fn push(&mut self, voice: ScheduledVoice) {
        self.queue.push(voice);
    }

    /// Drops queued entries of the given kind.
    pub fn clear_kind(&mut self, kind: SampleKind) {
        self.queue.retain(|voice| voice.kind != kind);
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns true while there is something left to sweep.
    pub fn is_sweeping(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Expires finished entries and reports the position of the most recently started entry
    /// that has begun playing.
    pub fn sweep(&mut self, now: f64) -> Option<PadPosition> {
        let before = self.queue.len();
        self.queue.retain(|voice| now < voice.end_time());
        if self.queue.is_empty() && before > 0 {
            debug!("Pad playhead sweep finished");
        }

        // Later entries win ties.
        let winner = self
            .queue
            .iter()
            .enumerate()
            .filter(|(_, voice)| voice.start_time <= now)
            .max_by(|(a_index, a), (b_index, b)| {
                a.start_time
                    .total_cmp(&b.start_time)
                    .then(a_index.cmp(b_index))
            })
            .map(|(_, voice)| voice)?;

        Some(PadPosition {
            kind: winner.kind,
            position: winner.chop.start + (now - winner.start_time),
        })
    }
}
