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
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use autochop::audio;
use autochop::chops::Chopper;
use autochop::config::Session;
use autochop::controller::{keyboard, Controller, Status};
use autochop::engine::Engine;
use autochop::sample::SampleKind;
use autochop::util;
use clap::{crate_version, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "An automatic sample chopper and pad performer."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chops an audio file and prints the chop points.
    Chop {
        /// The path to the audio file.
        path: String,
        /// Treat the file as a melodic sample instead of a drum break.
        #[arg(short, long)]
        melodic: bool,
        /// The number of chops to produce.
        #[arg(short, long, default_value_t = autochop::sample::NUM_CHOPS)]
        chops: usize,
    },
    /// Lists the available audio output devices.
    Devices {},
    /// Start will start a performance session from the keyboard.
    Start {
        /// The path to the session config.
        session_path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Chop {
            path,
            melodic,
            chops,
        } => {
            let kind = if melodic {
                SampleKind::Melodic
            } else {
                SampleKind::Drums
            };
            let sample = Chopper::linear()
                .with_num_chops(chops)
                .load(kind, &PathBuf::from(path))
                .await?;
            print!("{}", util::chop_table(&sample));
        }
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Start { session_path } => {
            let session = Session::load(&PathBuf::from(session_path))?;
            let (finished_tx, finished_rx) = crossbeam_channel::unbounded();
            let device = audio::get_device(session.audio_device(), finished_tx)?;

            let mut engine = Engine::new(device);
            engine.set_bpm(session.bpm());
            engine.set_quantize(session.quantize());
            engine.set_tracks(session.tracks());

            let chopper = session.chopper()?;
            for kind in SampleKind::ALL {
                let Some(path) = session.sample_path(kind) else {
                    continue;
                };
                match chopper.load(kind, &path).await {
                    Ok(sample) => {
                        let sample = engine.load_sample(sample);
                        println!("{}", util::chop_table(&sample));
                    }
                    Err(e) => error!(
                        err = e.to_string(),
                        track = kind.to_string(),
                        "Unable to load sample"
                    ),
                }
            }

            let driver = Arc::new(keyboard::Driver::new());
            let mut controller = Controller::new(engine, chopper, driver, finished_rx);
            tokio::spawn(report_status(controller.status()));
            controller.join().await?;
        }
    }

    Ok(())
}

/// Logs the session's state whenever something other than a playhead position changes.
async fn report_status(mut status: watch::Receiver<Status>) {
    let mut last: Option<Status> = None;
    while status.changed().await.is_ok() {
        let current = status.borrow_and_update().clone();
        let unchanged = last.as_ref().is_some_and(|last| Status {
            playheads: current.playheads.clone(),
            ..last.clone()
        } == current);
        if unchanged {
            continue;
        }

        info!(
            transport = format!("{:?}", current.transport),
            pads = util::format_pads(&current.active_pads),
            drums = util::format_position(current.playheads.drums),
            melody = util::format_position(current.playheads.melody),
            bpm = current.bpm,
            quantize = current.quantize,
            "Status"
        );
        last = Some(current);
    }
}
