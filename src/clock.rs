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

//! Time references for scheduling. All times are seconds as f64.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// A monotonically increasing time reference.
pub trait Clock: Send + Sync {
    /// The current time in seconds.
    fn now(&self) -> f64;
}

/// A clock that only moves when told to. Used by the mock device and in tests.
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    /// Creates a clock at time zero.
    pub fn new() -> ManualClock {
        ManualClock::default()
    }

    /// Sets the current time. Attempts to move backwards are ignored.
    pub fn set(&self, now: f64) {
        let mut current = self.now.lock();
        if now > *current {
            *current = now;
        }
    }

    /// Moves the clock forward by the given number of seconds.
    pub fn advance(&self, seconds: f64) {
        let mut current = self.now.lock();
        if seconds > 0.0 {
            *current += seconds;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}

/// Wall clock time since creation.
pub struct SystemClock {
    #[cfg(not(feature = "quanta"))]
    start: std::time::Instant,
    #[cfg(feature = "quanta")]
    clock: quanta::Clock,
    #[cfg(feature = "quanta")]
    start: quanta::Instant,
}

impl SystemClock {
    pub fn new() -> SystemClock {
        #[cfg(not(feature = "quanta"))]
        {
            SystemClock {
                start: std::time::Instant::now(),
            }
        }
        #[cfg(feature = "quanta")]
        {
            let clock = quanta::Clock::new();
            let start = clock.now();
            SystemClock { clock, start }
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    #[cfg(not(feature = "quanta"))]
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    #[cfg(feature = "quanta")]
    fn now(&self) -> f64 {
        self.clock.now().duration_since(self.start).as_secs_f64()
    }
}

/// Audio-rate time derived from the number of frames rendered by an output stream.
pub struct FrameClock {
    frames: AtomicU64,
    sample_rate: u32,
}

impl FrameClock {
    pub fn new(sample_rate: u32) -> FrameClock {
        FrameClock {
            frames: AtomicU64::new(0),
            sample_rate,
        }
    }

    /// Records that the given number of frames has been rendered.
    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::Release);
    }

    /// The number of frames rendered so far.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Clock for FrameClock {
    fn now(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}
