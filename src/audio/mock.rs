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
use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread,
    time::Duration,
};

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{DeviceError, VoiceFinished, VoiceId, VoiceRequest};
use crate::clock::Clock;

#[derive(Default)]
struct State {
    /// Every voice ever started, in order.
    started: Vec<VoiceRequest>,
    /// Every voice ever stopped, in order.
    stopped: Vec<VoiceId>,
    /// Voices that have neither finished nor been stopped. With auto finish enabled, each has a
    /// sender that wakes its timer thread.
    active: HashMap<VoiceId, Option<mpsc::Sender<()>>>,
}

/// A mock device. Doesn't actually play anything.
///
/// By default voices only finish when [Device::finish] is called. With auto finish enabled a
/// timer thread per voice reports it finished once its playing time has elapsed.
pub struct Device {
    name: String,
    clock: Arc<dyn Clock>,
    finished_tx: Sender<VoiceFinished>,
    auto_finish: bool,
    /// While set, every start is refused as if the output had gone away.
    disconnected: AtomicBool,
    state: Arc<Mutex<State>>,
}

impl Device {
    /// Creates a mock device that reports time from the given clock.
    pub fn new(name: &str, clock: Arc<dyn Clock>, finished_tx: Sender<VoiceFinished>) -> Device {
        Device {
            name: name.to_string(),
            clock,
            finished_tx,
            auto_finish: false,
            disconnected: AtomicBool::new(false),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Makes voices finish on their own in real time.
    pub fn with_auto_finish(mut self) -> Device {
        self.auto_finish = true;
        self
    }

    /// Reports the given voice as finished, as if it reached its end. Returns false if the voice
    /// is not active.
    pub fn finish(&self, id: VoiceId) -> bool {
        finish_voice(&self.state, &self.finished_tx, id)
    }

    /// Makes the device refuse new voices, or accept them again.
    pub fn set_disconnected(&self, disconnected: bool) {
        self.disconnected.store(disconnected, Ordering::Relaxed);
    }

    /// All requests started so far.
    pub fn started(&self) -> Vec<VoiceRequest> {
        self.state.lock().started.clone()
    }

    /// The most recently started request.
    pub fn last_started(&self) -> Option<VoiceRequest> {
        self.state.lock().started.last().cloned()
    }

    /// All voices stopped so far.
    pub fn stopped(&self) -> Vec<VoiceId> {
        self.state.lock().stopped.clone()
    }

    /// Returns true if the voice has been started and has not finished or been stopped.
    pub fn is_active(&self, id: VoiceId) -> bool {
        self.state.lock().active.contains_key(&id)
    }

    /// The IDs of all currently active voices.
    pub fn active(&self) -> Vec<VoiceId> {
        let mut active: Vec<VoiceId> = self.state.lock().active.keys().copied().collect();
        active.sort();
        active
    }

    fn spawn_timer(&self, request: &VoiceRequest, cancel_rx: mpsc::Receiver<()>) {
        let remaining = (request.start_time + request.playing_time() - self.clock.now()).max(0.0);
        let state = self.state.clone();
        let finished_tx = self.finished_tx.clone();
        let id = request.id;

        thread::spawn(move || {
            // Wait for a stop or until the voice is done.
            if let Err(mpsc::RecvTimeoutError::Timeout) =
                cancel_rx.recv_timeout(Duration::from_secs_f64(remaining))
            {
                finish_voice(&state, &finished_tx, id);
            }
        });
    }
}

fn finish_voice(state: &Mutex<State>, finished_tx: &Sender<VoiceFinished>, id: VoiceId) -> bool {
    if state.lock().active.remove(&id).is_none() {
        return false;
    }
    debug!(voice = id.0, "Voice finished (mock)");
    let _ = finished_tx.send(VoiceFinished { id });
    true
}

impl super::Device for Device {
    fn start_voice(&self, request: VoiceRequest) -> Result<(), DeviceError> {
        if self.disconnected.load(Ordering::Relaxed) {
            return Err(DeviceError::Disconnected);
        }
        info!(
            device = self.name,
            voice = request.id.0,
            start_time = request.start_time,
            offset = request.offset,
            duration = request.duration,
            "Starting voice (mock)"
        );

        // The voice must be active before its timer can possibly fire.
        let cancel_rx = {
            let mut state = self.state.lock();
            let (cancel_tx, cancel_rx) = if self.auto_finish {
                let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
                (Some(cancel_tx), Some(cancel_rx))
            } else {
                (None, None)
            };
            state.active.insert(request.id, cancel_tx);
            state.started.push(request.clone());
            cancel_rx
        };

        if let Some(cancel_rx) = cancel_rx {
            self.spawn_timer(&request, cancel_rx);
        }
        Ok(())
    }

    fn stop_voice(&self, id: VoiceId) {
        let removed = {
            let mut state = self.state.lock();
            let removed = state.active.remove(&id);
            if removed.is_some() {
                state.stopped.push(id);
            }
            removed
        };

        if let Some(timer) = removed {
            debug!(voice = id.0, "Stopping voice (mock)");
            if let Some(timer) = timer {
                let _ = timer.send(());
            }
            let _ = self.finished_tx.send(VoiceFinished { id });
        }
    }

    fn now(&self) -> f64 {
        self.clock.now()
    }

    #[cfg(test)]
    fn to_mock(&self) -> Option<&Device> {
        Some(self)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
