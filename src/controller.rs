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
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinError;
use tokio::time::MissedTickBehavior;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{debug, error, info, span, Instrument, Level};

use crate::audio::VoiceFinished;
use crate::chops::Chopper;
use crate::engine::Engine;
use crate::sample::{PadId, Sample, SampleKind};
use crate::scheduler::track::{LoopMode, TrackMap};
use crate::scheduler::TransportState;
use crate::util;

pub mod keyboard;

/// How often playhead positions are recomputed while there is something to show.
const PLAYHEAD_INTERVAL: Duration = Duration::from_millis(16);

/// Controller events that will trigger behavior in the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Plays the chop bound to the pad.
    Pad(PadId),

    /// Starts both track loops. If already playing, does nothing.
    Play,

    /// Stops both track loops. If not playing, does nothing.
    Stop,

    /// Stops everything, including pad voices.
    Reset,

    /// Sets the tempo.
    Bpm(f64),

    /// Turns quantization on or off.
    Quantize(bool),

    /// Sets a track's volume percentage.
    Volume(SampleKind, i64),

    /// Sets a track's pitch shift in semitones.
    Pitch(SampleKind, i64),

    /// Sets what a track loops over.
    Mode(SampleKind, LoopMode),

    /// Sets a track's loop sequence text.
    Sequence(SampleKind, String),

    /// Loads and chops a file for a track.
    Load(SampleKind, PathBuf),

    /// Shuts the controller down.
    Quit,
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Observable engine state, published after every change.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Status {
    pub transport: TransportState,
    pub active_pads: BTreeSet<PadId>,
    /// Seconds into each track's sample, if something is sounding.
    pub playheads: TrackMap<Option<f64>>,
    pub bpm: f64,
    pub quantize: bool,
    /// Names of the loaded samples.
    pub samples: TrackMap<Option<String>>,
}

impl Status {
    fn from_engine(engine: &Engine, playheads: TrackMap<Option<f64>>) -> Status {
        Status {
            transport: engine.transport_state(),
            active_pads: engine.active_pads(),
            playheads,
            bpm: engine.bpm(),
            quantize: engine.quantize(),
            samples: TrackMap::from_fn(|kind| {
                engine.sample(kind).map(|sample| sample.name().to_string())
            }),
        }
    }
}

/// Drives an [Engine] from a [Driver]'s events and the device's finished events.
pub struct Controller {
    handle: JoinHandle<()>,
    status: watch::Receiver<Status>,
}

impl Controller {
    /// Creates a new controller with the given driver. Finished events from the engine's
    /// device are read from `finished_rx`.
    pub fn new(
        engine: Engine,
        chopper: Chopper,
        driver: Arc<dyn Driver>,
        finished_rx: crossbeam_channel::Receiver<VoiceFinished>,
    ) -> Controller {
        let (status_tx, status) = watch::channel(Status::from_engine(&engine, TrackMap::default()));
        Controller {
            handle: tokio::spawn(
                Controller::trigger_events(engine, Arc::new(chopper), driver, finished_rx, status_tx)
                    .instrument(span!(Level::INFO, "controller")),
            ),
            status,
        }
    }

    /// Subscribes to status updates.
    pub fn status(&self) -> watch::Receiver<Status> {
        self.status.clone()
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    /// Moves finished events from the device's channel onto the async side.
    fn forward_finished(
        finished_rx: crossbeam_channel::Receiver<VoiceFinished>,
    ) -> mpsc::UnboundedReceiver<VoiceFinished> {
        let (tx, rx) = mpsc::unbounded_channel();
        thread::spawn(move || {
            while let Ok(finished) = finished_rx.recv() {
                if tx.send(finished).is_err() {
                    return;
                }
            }
        });
        rx
    }

    /// Triggers engine behavior from driver events, device finished events and loaded samples.
    /// Playhead positions are polled only while the engine has something to show.
    async fn trigger_events(
        mut engine: Engine,
        chopper: Arc<Chopper>,
        driver: Arc<dyn Driver>,
        finished_rx: crossbeam_channel::Receiver<VoiceFinished>,
        status_tx: watch::Sender<Status>,
    ) {
        let (events_tx, mut events_rx) = mpsc::channel(16);
        let join_handle = driver.monitor_events(events_tx);
        let mut finished_rx = Controller::forward_finished(finished_rx);
        let (loaded_tx, mut loaded_rx) = mpsc::channel::<Sample>(2);

        let mut sweep = tokio::time::interval(PLAYHEAD_INTERVAL);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut playheads: TrackMap<Option<f64>> = TrackMap::default();

        info!(device = engine.device().to_string(), "Controller started.");

        loop {
            tokio::select! {
                event = events_rx.recv() => match event {
                    Some(Event::Quit) | None => break,
                    Some(event) => {
                        info!(event = format!("{:?}", event), "Received event.");
                        Controller::handle_event(&mut engine, &chopper, &loaded_tx, event);
                    }
                },
                Some(finished) = finished_rx.recv() => engine.on_voice_finished(finished.id),
                Some(sample) = loaded_rx.recv() => {
                    let sample = engine.load_sample(sample);
                    debug!("\n{}", util::chop_table(&sample));
                },
                _ = sweep.tick(), if engine.needs_playhead_sweep() => {
                    playheads = engine.tick_playheads();
                },
            }

            if !engine.needs_playhead_sweep() {
                playheads = TrackMap::default();
            }
            let status = Status::from_engine(&engine, playheads.clone());
            status_tx.send_if_modified(|current| {
                if *current == status {
                    return false;
                }
                *current = status;
                true
            });
        }

        info!("Controller closing.");
        engine.reset();
        join_handle.abort();
        if let Err(e) = join_handle.await {
            if !e.is_cancelled() {
                error!("Error waiting for event monitor to stop: {}", e);
            }
        }
    }

    fn handle_event(
        engine: &mut Engine,
        chopper: &Arc<Chopper>,
        loaded_tx: &Sender<Sample>,
        event: Event,
    ) {
        match event {
            Event::Pad(pad) => {
                engine.trigger_pad(pad);
            }
            Event::Play => {
                engine.play();
            }
            Event::Stop => engine.stop(),
            Event::Reset => engine.reset(),
            Event::Bpm(bpm) => engine.set_bpm(bpm),
            Event::Quantize(quantize) => engine.set_quantize(quantize),
            Event::Volume(kind, volume) => engine.set_volume(kind, volume),
            Event::Pitch(kind, pitch) => engine.set_pitch(kind, pitch),
            Event::Mode(kind, loop_mode) => engine.set_loop_mode(kind, loop_mode),
            Event::Sequence(kind, sequence) => engine.set_sequence(kind, &sequence),
            Event::Load(kind, path) => {
                // Decoding and chop detection can take a while, keep handling events meanwhile.
                let chopper = chopper.clone();
                let loaded_tx = loaded_tx.clone();
                tokio::spawn(async move {
                    match chopper.load(kind, &path).await {
                        Ok(sample) => {
                            if loaded_tx.send(sample).await.is_err() {
                                debug!("Controller gone, dropping loaded sample");
                            }
                        }
                        Err(e) => error!(
                            err = e.to_string(),
                            path = path.display().to_string(),
                            "Unable to load sample, keeping the previous one"
                        ),
                    }
                });
            }
            Event::Quit => {}
        }
    }
}
