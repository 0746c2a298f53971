//! CPAL audio backend implementation
//!
//! Pull-callback model: the device thread asks for a block of samples on a
//! fixed schedule and the mixer scales them in software.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  Play / Pause / Close   ┌─────────────────────┐
//! │   CpalEndpoint   │────────────────────────►│   Stream Thread     │
//! │ (control thread) │◄────────────────────────│  (owns cpal Stream) │
//! └──────────────────┘        replies          └──────────┬──────────┘
//!                                                         │ build_output_stream
//!                                                         ▼
//!                                              ┌─────────────────────┐
//!                                              │  CPAL Audio Thread  │
//!                                              │ (owns RenderCallback)│
//!                                              └─────────────────────┘
//! ```
//!
//! `cpal::Stream` is not `Send` on every platform, so each endpoint keeps its
//! stream on a thread of its own and talks to it over a channel. Closing
//! the endpoint drops the stream on that thread and joins it.

use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SizedSample, Stream, StreamConfig, SupportedBufferSize};
use crossbeam::channel::{self, Receiver, Sender};

use super::backend::{
    AudioBackend, AudioEndpoint, DesiredFormat, GainStage, NegotiatedFormat, BITS_PER_SAMPLE,
};
use super::config::DeviceId;
use super::convert::{i16_to_f32, remap_frames};
use super::device::resolve_device;
use super::error::{AudioError, AudioResult};
use crate::mixer::{RenderCallback, Renderer};

/// Backend that opens one CPAL output stream per sound buffer
pub struct CpalBackend {
    device: Option<DeviceId>,
}

impl CpalBackend {
    /// Use `device`, or the default host's default output when `None`
    pub fn new(device: Option<DeviceId>) -> Self {
        Self { device }
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn open(
        &self,
        desired: &DesiredFormat,
        renderer: Renderer,
    ) -> AudioResult<Box<dyn AudioEndpoint>> {
        let (ready_tx, ready_rx) = channel::bounded(1);
        let (command_tx, command_rx) = channel::unbounded();
        let device = self.device.clone();
        let desired = *desired;

        let thread = thread::Builder::new()
            .name("ringmix-cpal".to_string())
            .spawn(move || run_stream(device, desired, renderer, ready_tx, command_rx))
            .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(format)) => Ok(Box::new(CpalEndpoint {
                format,
                commands: command_tx,
                thread: Some(thread),
            })),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AudioError::StreamBuildError(
                    "stream thread exited before the stream was built".to_string(),
                ))
            }
        }
    }
}

enum StreamCommand {
    Play(Sender<AudioResult<()>>),
    Pause(Sender<AudioResult<()>>),
    Close,
}

/// Body of the per-endpoint stream thread
fn run_stream(
    device: Option<DeviceId>,
    desired: DesiredFormat,
    renderer: Renderer,
    ready: Sender<AudioResult<NegotiatedFormat>>,
    commands: Receiver<StreamCommand>,
) {
    let (stream, format) = match open_stream(device.as_ref(), &desired, renderer) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(format)).is_err() {
        return;
    }

    for command in commands.iter() {
        match command {
            StreamCommand::Play(reply) => {
                let _ = reply.send(
                    stream
                        .play()
                        .map_err(|e| AudioError::StreamPlayError(e.to_string())),
                );
            }
            StreamCommand::Pause(reply) => {
                let _ = reply.send(
                    stream
                        .pause()
                        .map_err(|e| AudioError::StreamPauseError(e.to_string())),
                );
            }
            StreamCommand::Close => break,
        }
    }

    drop(stream);
    log::debug!("CPAL stream closed");
}

fn open_stream(
    device: Option<&DeviceId>,
    desired: &DesiredFormat,
    renderer: Renderer,
) -> AudioResult<(Stream, NegotiatedFormat)> {
    let device = resolve_device(device)?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let (stream_config, sample_format) = get_output_config(&device, desired)?;
    let buffer_frames = match stream_config.buffer_size {
        BufferSize::Fixed(frames) => frames,
        BufferSize::Default => desired.buffer_frames,
    };
    // Describes the buffer side; the callback maps to the device's channels
    let format = NegotiatedFormat {
        sample_rate: stream_config.sample_rate.0,
        channels: desired.channels,
        bits_per_sample: BITS_PER_SAMPLE,
        silence: 0,
        buffer_frames,
    };

    log::info!(
        "Using audio device: {} ({} channels for {}, {}Hz, {:?}, {} frames, ~{:.1}ms)",
        device_name,
        stream_config.channels,
        format.channels,
        format.sample_rate,
        sample_format,
        buffer_frames,
        buffer_frames as f32 / format.sample_rate as f32 * 1000.0
    );

    let callback = renderer.bind(format, GainStage::Mixer);
    let stream = match sample_format {
        SampleFormat::I16 if stream_config.channels == format.channels => {
            build_i16_stream(&device, &stream_config, callback)?
        }
        SampleFormat::I16 => build_mapped_stream(&device, &stream_config, callback, |s: i16| s)?,
        _ => build_mapped_stream(&device, &stream_config, callback, i16_to_f32)?,
    };
    Ok((stream, format))
}

/// Ranking for a device channel count: exact first, then the closest
/// count that is not smaller, then the closest smaller one
fn channel_rank(offered: u16, wanted: u16) -> (bool, bool, u16) {
    (offered != wanted, offered < wanted, offered.abs_diff(wanted))
}

/// Pick a device configuration that plays the buffer without resampling
///
/// The rate must match exactly. An exact channel match is preferred, but
/// any channel count is accepted and remapped in the callback. Signed
/// 16-bit is preferred over f32 at the same channel rank. The buffer size
/// is clamped into the device's supported range.
fn get_output_config(
    device: &cpal::Device,
    desired: &DesiredFormat,
) -> AudioResult<(StreamConfig, SampleFormat)> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    let best_config = supported_configs
        .iter()
        .filter(|c| {
            matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::F32)
                && c.channels() > 0
                && desired.sample_rate >= c.min_sample_rate().0
                && desired.sample_rate <= c.max_sample_rate().0
        })
        .min_by_key(|c| {
            (
                channel_rank(c.channels(), desired.channels),
                c.sample_format() != SampleFormat::I16,
            )
        })
        .ok_or_else(|| AudioError::UnsupportedFormat {
            sample_rate: desired.sample_rate,
            channels: desired.channels,
            reason: "no i16 or f32 output configuration at this rate".to_string(),
        })?;

    if best_config.channels() != desired.channels {
        log::info!(
            "Device has no {}-channel output, remapping to {} channels",
            desired.channels,
            best_config.channels()
        );
    }

    let buffer_size = match best_config.buffer_size() {
        SupportedBufferSize::Range { min, max } => {
            BufferSize::Fixed(desired.buffer_frames.max(*min).min(*max))
        }
        SupportedBufferSize::Unknown => BufferSize::Fixed(desired.buffer_frames),
    };
    log::debug!(
        "Requested {} frames, using {:?}",
        desired.buffer_frames,
        buffer_size
    );

    Ok((
        StreamConfig {
            channels: best_config.channels(),
            sample_rate: cpal::SampleRate(desired.sample_rate),
            buffer_size,
        },
        best_config.sample_format(),
    ))
}

/// Device takes our PCM as is: render straight into its buffer
fn build_i16_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut callback: RenderCallback,
) -> AudioResult<Stream> {
    device
        .build_output_stream(
            config,
            move |data: &mut [i16], _info: &cpal::OutputCallbackInfo| {
                callback.render(bytemuck::cast_slice_mut(data));
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

/// Render into an i16 scratch buffer, then convert and remap to the device
///
/// Handles f32 devices and devices whose channel count differs from the
/// buffer's.
fn build_mapped_stream<T: SizedSample + Send + 'static>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut callback: RenderCallback,
    convert: fn(i16) -> T,
) -> AudioResult<Stream> {
    let buffer_channels = callback.format().channels as usize;
    let device_channels = config.channels as usize;
    let mut pcm: Vec<i16> = Vec::with_capacity(callback.format().buffer_bytes());

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _info: &cpal::OutputCallbackInfo| {
                let frames = data.len() / device_channels;
                pcm.resize(frames * buffer_channels, 0);
                callback.render(bytemuck::cast_slice_mut(&mut pcm[..]));
                remap_frames(&pcm, buffer_channels, data, device_channels, convert);
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

/// Handle to an open CPAL stream
///
/// Dropping it closes the stream and waits for the stream thread to exit.
struct CpalEndpoint {
    format: NegotiatedFormat,
    commands: Sender<StreamCommand>,
    thread: Option<JoinHandle<()>>,
}

impl CpalEndpoint {
    fn request(
        &self,
        command: impl FnOnce(Sender<AudioResult<()>>) -> StreamCommand,
    ) -> AudioResult<()> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        self.commands
            .send(command(reply_tx))
            .map_err(|_| AudioError::StreamError("stream thread has exited".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| AudioError::StreamError("stream thread has exited".to_string()))?
    }
}

impl AudioEndpoint for CpalEndpoint {
    fn format(&self) -> &NegotiatedFormat {
        &self.format
    }

    fn start(&mut self) -> AudioResult<()> {
        self.request(StreamCommand::Play)
    }

    fn pause(&mut self) -> AudioResult<()> {
        self.request(StreamCommand::Pause)
    }
}

impl Drop for CpalEndpoint {
    fn drop(&mut self) {
        let _ = self.commands.send(StreamCommand::Close);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("CPAL stream thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferHandle, PcmRingBuffer};
    use crate::mixer::SoundGenerator;
    use std::sync::Arc;

    #[test]
    fn test_open_on_default_device_or_fail_cleanly() {
        // Machines without audio hardware must fail with an error, not hang
        let backend = CpalBackend::new(None);
        let buffer = Arc::new(PcmRingBuffer::with_duration(44100, 2, 200));
        buffer.play();
        let generator = SoundGenerator::new(BufferHandle::new(&buffer));

        match generator.write_audio(30, &backend, 8192) {
            Ok(opened) => {
                assert!(opened);
                generator.stop();
                assert!(!generator.is_running());
            }
            Err(e) => println!("No CPAL output available: {}", e),
        }
    }

    #[test]
    fn test_channel_rank_prefers_exact_then_wider() {
        let mut offered = vec![1u16, 2, 6, 8];
        offered.sort_by_key(|c| channel_rank(*c, 2));
        assert_eq!(offered, vec![2, 6, 8, 1]);

        // A mono buffer on a stereo-only device still finds a config
        let mut offered = vec![2u16, 4];
        offered.sort_by_key(|c| channel_rank(*c, 1));
        assert_eq!(offered[0], 2);

        let mut offered = vec![1u16, 2];
        offered.sort_by_key(|c| channel_rank(*c, 6));
        assert_eq!(offered, vec![2, 1]);
    }

    #[test]
    fn test_unknown_device_is_an_error() {
        let backend = CpalBackend::new(Some(DeviceId::with_host("no-such-device", "NoSuchHost")));
        let buffer = Arc::new(PcmRingBuffer::with_duration(44100, 2, 200));
        buffer.play();
        let generator = SoundGenerator::new(BufferHandle::new(&buffer));
        assert!(generator.write_audio(30, &backend, 8192).is_err());
    }
}
