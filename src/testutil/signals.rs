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

//! Test signal generators.

use rand::{rngs::StdRng, Rng, SeedableRng};

fn frames(sample_rate: u32, duration_seconds: f64) -> usize {
    (sample_rate as f64 * duration_seconds).round() as usize
}

/// All zeros.
pub fn silence(sample_rate: u32, duration_seconds: f64) -> Vec<f32> {
    vec![0.0; frames(sample_rate, duration_seconds)]
}

/// Single sample impulses of the given level at each time in seconds.
pub fn click_train(
    sample_rate: u32,
    duration_seconds: f64,
    times: &[f64],
    level: f32,
) -> Vec<f32> {
    let levels: Vec<(f64, f32)> = times.iter().map(|time| (*time, level)).collect();
    click_train_with_levels(sample_rate, duration_seconds, &levels)
}

/// Single sample impulses, each with its own level.
pub fn click_train_with_levels(
    sample_rate: u32,
    duration_seconds: f64,
    clicks: &[(f64, f32)],
) -> Vec<f32> {
    let mut samples = silence(sample_rate, duration_seconds);
    for (time, level) in clicks {
        let index = (time * sample_rate as f64).round() as usize;
        if let Some(sample) = samples.get_mut(index) {
            *sample = *level;
        }
    }
    samples
}

/// Uniform white noise in [-amplitude, amplitude), reproducible for a given seed.
pub fn noise(sample_rate: u32, duration_seconds: f64, amplitude: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..frames(sample_rate, duration_seconds))
        .map(|_| rng.gen_range(-amplitude..amplitude))
        .collect()
}

/// A ramp from 0 up to (but not including) 1, handy for checking read positions.
pub fn ramp(len: usize) -> Vec<f32> {
    (0..len).map(|i| i as f32 / len as f32).collect()
}
