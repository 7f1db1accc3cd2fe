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
use std::io;
use std::path::PathBuf;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;
use crate::sample::{PadId, SampleKind};
use crate::scheduler::track::LoopMode;

const PLAY: &str = "play";
const STOP: &str = "stop";
const RESET: &str = "reset";
const QUIT: &str = "quit";
const BPM: &str = "bpm";
const QUANTIZE: &str = "quantize";
const VOLUME: &str = "volume";
const PITCH: &str = "pitch";
const MODE: &str = "mode";
const SEQUENCE: &str = "sequence";
const LOAD: &str = "load";

/// Keys for pads 0 through 15, four rows of four.
pub const PAD_KEYS: [char; 16] = [
    '1', '2', '3', '4', 'q', 'w', 'e', 'r', 'a', 's', 'd', 'f', 'z', 'x', 'c', 'v',
];

/// Returns the pad bound to the key, if any.
pub fn pad_for_key(key: char) -> Option<PadId> {
    PAD_KEYS
        .iter()
        .position(|k| *k == key.to_ascii_lowercase())
        .and_then(PadId::new)
}

/// Parses a line of input. A line made up entirely of pad keys triggers each pad in order, so
/// "qwer" plays four chops back to back. Returns None if the line isn't understood.
pub fn parse_line(input: &str) -> Option<Vec<Event>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let pads: Option<Vec<Event>> = input
        .chars()
        .map(|key| pad_for_key(key).map(Event::Pad))
        .collect();
    if let Some(pads) = pads {
        return Some(pads);
    }

    parse_command(input).map(|event| vec![event])
}

/// Splits off the first whitespace separated word.
fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(index) => (&input[..index], input[index..].trim()),
        None => (input, ""),
    }
}

fn parse_command(input: &str) -> Option<Event> {
    let (command, rest) = split_word(input);
    let command = command.to_lowercase();
    let (track, value) = split_word(rest);

    match command.as_str() {
        PLAY if rest.is_empty() => Some(Event::Play),
        STOP if rest.is_empty() => Some(Event::Stop),
        RESET if rest.is_empty() => Some(Event::Reset),
        QUIT | "exit" if rest.is_empty() => Some(Event::Quit),
        BPM => rest.parse::<f64>().ok().map(Event::Bpm),
        QUANTIZE => match rest.to_lowercase().as_str() {
            "on" | "true" => Some(Event::Quantize(true)),
            "off" | "false" => Some(Event::Quantize(false)),
            _ => None,
        },
        VOLUME => {
            let kind = track.parse::<SampleKind>().ok()?;
            value.parse::<i64>().ok().map(|v| Event::Volume(kind, v))
        }
        PITCH => {
            let kind = track.parse::<SampleKind>().ok()?;
            value.parse::<i64>().ok().map(|v| Event::Pitch(kind, v))
        }
        MODE => {
            let kind = track.parse::<SampleKind>().ok()?;
            value.parse::<LoopMode>().ok().map(|m| Event::Mode(kind, m))
        }
        SEQUENCE => {
            let kind = track.parse::<SampleKind>().ok()?;
            Some(Event::Sequence(kind, value.to_string()))
        }
        LOAD if !value.is_empty() => {
            let kind = track.parse::<SampleKind>().ok()?;
            Some(Event::Load(kind, PathBuf::from(value)))
        }
        _ => None,
    }
}

/// A controller that drives the engine from lines typed on the keyboard.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Reads and handles a single line. Returns false once the input is closed.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Pads ({}) or command ({}, {}, {}, {} <n>, {} on|off, {}|{}|{}|{}|{} <track> <value>, {}): ",
            PAD_KEYS.iter().collect::<String>(),
            PLAY,
            STOP,
            RESET,
            BPM,
            QUANTIZE,
            VOLUME,
            PITCH,
            MODE,
            SEQUENCE,
            LOAD,
            QUIT,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            events_tx
                .blocking_send(Event::Quit)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            return Ok(false);
        }

        match parse_line(&input) {
            Some(events) => {
                for event in events {
                    events_tx
                        .blocking_send(event)
                        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                }
            }
            None => warn!(input = input.trim(), "Unrecognized input"),
        }
        Ok(true)
    }
}

impl Default for Driver {
    fn default() -> Self {
        Driver::new()
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            info!("Keyboard input closed.");
            Ok(())
        })
    }
}
