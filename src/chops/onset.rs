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

//! Transient based chop detection for drum breaks.
//!
//! The signal is high-pass filtered and rectified, peaks above a fixed threshold are picked in
//! non-overlapping windows, and the strongest peaks become chop boundaries. When there are not
//! enough peaks the largest remaining gaps are bisected until the requested count is reached.

use tracing::debug;

/// Coefficient of the first order high-pass filter `y[i] = x[i] - a * x[i - 1]`.
const HIGH_PASS_COEFFICIENT: f32 = 0.97;

/// Rectified filter output must exceed this to count as an onset.
const PEAK_THRESHOLD: f32 = 0.05;

/// Size of the window searched for a peak maximum once the threshold is crossed.
const PEAK_WINDOW_SECONDS: f64 = 0.05;

/// How far before the transient peak the chop marker is placed.
const PRE_ROLL_SECONDS: f64 = 0.02;

/// A candidate onset.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Peak {
    /// Sample index, already shifted by the pre-roll.
    index: usize,
    magnitude: f32,
}

/// Splits the signal into `num_chops` regions and returns their start times in seconds.
///
/// The result always has exactly `num_chops` entries, starts at 0, is non-decreasing and never
/// exceeds the duration of the signal.
pub fn detect_chop_points(signal: &[f32], sample_rate: u32, num_chops: usize) -> Vec<f64> {
    if num_chops == 0 {
        return Vec::new();
    }
    if sample_rate == 0 {
        return vec![0.0; num_chops];
    }

    let envelope = rectified_high_pass(signal);
    let peaks = pick_peaks(&envelope, sample_rate);
    let mut indices = select_indices(&peaks, num_chops);
    fill_gaps(&mut indices, signal.len(), num_chops);

    debug!(
        peaks = peaks.len(),
        indices = indices.len(),
        num_chops,
        "Detected chop boundaries"
    );

    let duration = signal.len() as f64 / sample_rate as f64;
    indices_to_seconds(&indices, sample_rate, duration, num_chops)
}

/// High-pass filter followed by absolute value.
fn rectified_high_pass(signal: &[f32]) -> Vec<f32> {
    let mut filtered = Vec::with_capacity(signal.len());
    let mut previous: Option<f32> = None;
    for &sample in signal {
        let value = match previous {
            Some(prev) => sample - HIGH_PASS_COEFFICIENT * prev,
            None => sample,
        };
        filtered.push(value.abs());
        previous = Some(sample);
    }
    filtered
}

/// Scans the envelope for threshold crossings. Each crossing opens a window whose maximum is
/// recorded as a peak; scanning resumes after the window.
fn pick_peaks(envelope: &[f32], sample_rate: u32) -> Vec<Peak> {
    let window = ((sample_rate as f64 * PEAK_WINDOW_SECONDS).floor() as usize).max(1);
    let pre_roll = (sample_rate as f64 * PRE_ROLL_SECONDS).floor() as usize;

    let mut peaks = Vec::new();
    let mut i = 0;
    while i < envelope.len() {
        if envelope[i] <= PEAK_THRESHOLD {
            i += 1;
            continue;
        }

        let window_end = (i + window).min(envelope.len());
        let mut max_index = i;
        let mut max_value = envelope[i];
        for (j, &value) in envelope.iter().enumerate().take(window_end).skip(i + 1) {
            if value > max_value {
                max_value = value;
                max_index = j;
            }
        }

        peaks.push(Peak {
            index: max_index.saturating_sub(pre_roll),
            magnitude: max_value,
        });
        i = window_end;
    }
    peaks
}

/// Keeps index 0 plus the strongest `num_chops - 1` peaks, sorted and deduplicated.
fn select_indices(peaks: &[Peak], num_chops: usize) -> Vec<usize> {
    let wanted = num_chops - 1;
    let mut selected: Vec<Peak> = peaks.to_vec();
    if selected.len() > wanted {
        // Stable, so equal magnitudes keep their discovery order.
        selected.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));
        selected.truncate(wanted);
    }

    let mut indices: Vec<usize> = std::iter::once(0)
        .chain(selected.iter().map(|peak| peak.index))
        .collect();
    indices.sort_unstable();
    indices.dedup();
    indices
}

/// Bisects the largest gap (interior or tail) until there are `num_chops` indices or no gap
/// is wide enough to split.
fn fill_gaps(indices: &mut Vec<usize>, len: usize, num_chops: usize) {
    while indices.len() < num_chops {
        let mut largest_interior: Option<(usize, usize)> = None;
        for (k, pair) in indices.windows(2).enumerate() {
            let gap = pair[1] - pair[0];
            if largest_interior.map_or(true, |(_, largest)| gap > largest) {
                largest_interior = Some((k, gap));
            }
        }

        let last = indices.last().copied().unwrap_or(0);
        let tail = len.saturating_sub(last);
        let interior = largest_interior.map_or(0, |(_, gap)| gap);

        if tail > interior && tail >= 2 {
            indices.push(last + tail / 2);
        } else if let Some((k, gap)) = largest_interior.filter(|(_, gap)| *gap >= 2) {
            indices.insert(k + 1, indices[k] + gap / 2);
        } else {
            break;
        }
    }
}

/// Converts sample indices to seconds, padding with even subdivisions of the remaining
/// duration if there are still too few.
fn indices_to_seconds(
    indices: &[usize],
    sample_rate: u32,
    duration: f64,
    num_chops: usize,
) -> Vec<f64> {
    let mut times: Vec<f64> = indices
        .iter()
        .take(num_chops)
        .map(|&index| index as f64 / sample_rate as f64)
        .collect();

    while times.len() < num_chops {
        let last = times.last().copied().unwrap_or(0.0);
        let step = (duration - last) / (num_chops - times.len() + 1) as f64;
        times.push(last + step);
    }

    times
        .into_iter()
        .map(|time| time.clamp(0.0, duration.max(0.0)))
        .collect()
}
