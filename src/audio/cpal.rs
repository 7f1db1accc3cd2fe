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
use std::{fmt, sync::Arc, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use tracing::{error, info, span, Level};

use super::mixer::{Mixer, MixerCommand};
use super::{DeviceError, VoiceFinished, VoiceId, VoiceRequest};
use crate::clock::{Clock, FrameClock};

/// Describes an output device for listing.
pub struct DeviceDescription {
    pub name: String,
    pub max_channels: u16,
    pub host_id: cpal::HostId,
}

impl fmt::Display for DeviceDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// An output device driven by cpal. Voices are mixed inside the output callback and time is
/// the number of frames the callback has rendered.
pub struct Device {
    /// The name of the device.
    name: String,
    /// Number of output channels.
    channels: u16,
    /// Device time.
    clock: Arc<FrameClock>,
    /// Commands for the mixer living in the output callback.
    commands_tx: Sender<MixerCommand>,
    /// Dropping this stops the output thread.
    _shutdown_tx: Sender<()>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}, SampleRate={})",
            self.name,
            self.channels,
            self.clock.sample_rate()
        )
    }
}

/// f32 callback: mix directly into the cpal buffer.
fn create_f32_callback(
    mut mixer: Mixer,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        mixer.render(data);
    }
}

/// Integer callback: mix into a scratch buffer and convert.
fn create_converting_callback<T: cpal::SizedSample + cpal::FromSample<f32>>(
    mut mixer: Mixer,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut scratch: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        if scratch.len() != data.len() {
            scratch.resize(data.len(), 0.0);
        }
        mixer.render(&mut scratch);

        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

/// Builds and plays the output stream for the device.
fn build_stream(
    device: &cpal::Device,
    supported: cpal::SupportedStreamConfig,
    mixer: Mixer,
) -> Result<cpal::Stream, DeviceError> {
    let config: cpal::StreamConfig = supported.config();
    let err_fn = |err| error!("CPAL output stream error: {}", err);

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => {
            device.build_output_stream(&config, create_f32_callback(mixer), err_fn, None)?
        }
        cpal::SampleFormat::I16 => device.build_output_stream(
            &config,
            create_converting_callback::<i16>(mixer),
            err_fn,
            None,
        )?,
        cpal::SampleFormat::I32 => device.build_output_stream(
            &config,
            create_converting_callback::<i32>(mixer),
            err_fn,
            None,
        )?,
        other => return Err(DeviceError::UnsupportedFormat(format!("{:?}", other))),
    };
    stream.play()?;
    Ok(stream)
}

impl Device {
    /// Lists cpal output devices.
    pub fn list() -> Result<Vec<DeviceDescription>, DeviceError> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let output_configs = match device.supported_output_configs() {
                    Ok(output_configs) => output_configs,
                    Err(_) => continue,
                };
                let max_channels = output_configs
                    .map(|config| config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels > 0 {
                    devices.push(DeviceDescription {
                        name: device.name()?,
                        max_channels,
                        host_id,
                    });
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Finds a cpal output device by name. "default" is the host's default output device.
    fn find(name: &str) -> Result<cpal::Device, DeviceError> {
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let host = cpal::default_host();
        if name == "default" {
            return host
                .default_output_device()
                .ok_or(DeviceError::NoDefaultDevice);
        }

        for host_id in cpal::available_hosts() {
            let host = cpal::host_from_id(host_id)?;
            for device in host.output_devices()? {
                if device.name().map(|n| n.trim() == name).unwrap_or(false) {
                    return Ok(device);
                }
            }
        }
        Err(DeviceError::NotFound(name.to_string()))
    }

    /// Opens the named device and starts its output stream.
    pub fn get(name: &str, finished_tx: Sender<VoiceFinished>) -> Result<Device, DeviceError> {
        let device = Device::find(name)?;
        let supported = device.default_output_config()?;
        let sample_rate = supported.sample_rate();
        let channels = supported.channels();

        let clock = Arc::new(FrameClock::new(sample_rate));
        let (commands_tx, commands_rx) = crossbeam_channel::unbounded();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), DeviceError>>(1);

        let mixer = Mixer::new(channels, clock.clone(), commands_rx, finished_tx);
        let device_name = name.to_string();

        // The stream is created inside the thread and lives as long as it does.
        thread::spawn(move || {
            let span = span!(Level::INFO, "audio output");
            let _enter = span.enter();

            match build_stream(&device, supported, mixer) {
                Ok(stream) => {
                    info!(
                        device = device_name,
                        sample_rate, channels, "CPAL output stream started"
                    );
                    let _ = ready_tx.send(Ok(()));
                    wait_for_shutdown(shutdown_rx);
                    drop(stream);
                    info!(device = device_name, "CPAL output stream stopped");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            }
        });

        ready_rx.recv().map_err(|_| DeviceError::Disconnected)??;

        Ok(Device {
            name: name.to_string(),
            channels,
            clock,
            commands_tx,
            _shutdown_tx: shutdown_tx,
        })
    }
}

/// Blocks until the shutdown sender is dropped.
fn wait_for_shutdown(shutdown_rx: Receiver<()>) {
    while shutdown_rx.recv().is_ok() {}
}

impl super::Device for Device {
    fn start_voice(&self, request: VoiceRequest) -> Result<(), DeviceError> {
        self.commands_tx
            .send(MixerCommand::Start(request))
            .map_err(|_| DeviceError::Disconnected)
    }

    fn stop_voice(&self, id: VoiceId) {
        if self.commands_tx.send(MixerCommand::Stop(id)).is_err() {
            error!(voice = id.0, "Unable to stop voice, audio output is gone");
        }
    }

    fn now(&self) -> f64 {
        self.clock.now()
    }

    #[cfg(test)]
    fn to_mock(&self) -> Option<&super::mock::Device> {
        None
    }
}
