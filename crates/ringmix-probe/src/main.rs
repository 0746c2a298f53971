//! Ringmix probe - plays a test tone through the mixer
//!
//! Stands in for an emulator: a producer thread writes a 440 Hz stereo sine
//! into a ring buffer while the main loop pumps the mixer every 30 ms and
//! logs buffer diagnostics once a second.
//!
//! ## Command line flags
//!
//! - `--list-devices`: List output devices on every audio host and exit
//! - `--backend <cpal|jack|null>`: Override the configured backend
//! - `--device <name>`: Output device for the CPAL backend
//! - `--max-frames <n>`: Cap on the device buffer size in frames
//! - `--seconds <n>`: How long to play (default 5)
//! - `--volume <0..1>`: Linear output gain (default 0.5)
//! - `--config <path>`: Mixer config file (default `~/.config/ringmix/mixer.yaml`)

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use ringmix_core::audio::{get_output_devices, BackendKind, DeviceId};
use ringmix_core::config::load_mixer_config;
use ringmix_core::{BufferHandle, PcmRingBuffer, SoundMixer};

const SAMPLE_RATE: u32 = 44100;
const CHANNELS: u16 = 2;
const TONE_HZ: f32 = 440.0;
/// Ring buffer length, like a typical emulated sound card buffer
const BUFFER_MS: u32 = 250;
const WRITE_INTERVAL_MS: u32 = 30;

struct Args {
    list_devices: bool,
    backend: Option<BackendKind>,
    device: Option<DeviceId>,
    max_frames: Option<u32>,
    seconds: u64,
    volume: f32,
    config: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        list_devices: false,
        backend: None,
        device: None,
        max_frames: None,
        seconds: 5,
        volume: 0.5,
        config: None,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| iter.next().with_context(|| format!("{} needs a value", flag));
        match arg.as_str() {
            "--list-devices" => args.list_devices = true,
            "--backend" => {
                let name = value("--backend")?;
                args.backend = Some(
                    BackendKind::from_name(&name)
                        .with_context(|| format!("Unknown backend '{}'", name))?,
                );
            }
            "--device" => args.device = Some(DeviceId::new(value("--device")?)),
            "--max-frames" => {
                args.max_frames = Some(
                    value("--max-frames")?
                        .parse()
                        .context("--max-frames expects a whole number")?,
                );
            }
            "--seconds" => {
                args.seconds = value("--seconds")?
                    .parse()
                    .context("--seconds expects a whole number")?;
            }
            "--volume" => {
                args.volume = value("--volume")?
                    .parse::<f32>()
                    .context("--volume expects a number between 0 and 1")?
                    .clamp(0.0, 1.0);
            }
            "--config" => args.config = Some(PathBuf::from(value("--config")?)),
            other => bail!("Unknown argument '{}'", other),
        }
    }
    Ok(args)
}

fn list_devices() {
    let devices = match get_output_devices() {
        Ok(devices) => devices,
        Err(e) => {
            println!("No audio output devices found: {}", e);
            return;
        }
    };
    for device in devices {
        let marker = if device.is_default { "*" } else { " " };
        let sample = if device.native_i16 { "i16" } else { "f32" };
        let note = if device.supports(SAMPLE_RATE, CHANNELS) {
            ""
        } else {
            " (tone format not native)"
        };
        println!(
            "{} {}  up to {} ch, {}, rates {:?}{}",
            marker,
            device.id.display_label(),
            device.max_channels,
            sample,
            device.sample_rates,
            note
        );
    }
}

/// Keep `buffer` topped up with a sine tone until `running` clears
fn spawn_tone(buffer: Arc<PcmRingBuffer>, running: Arc<AtomicBool>) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("ringmix-tone".to_string())
        .spawn(move || {
            let step = TONE_HZ * std::f32::consts::TAU / SAMPLE_RATE as f32;
            let mut phase = 0.0f32;
            let mut samples: Vec<i16> = Vec::new();

            while running.load(Ordering::Relaxed) {
                let frames = buffer.free_bytes() / (CHANNELS as usize * 2);
                samples.clear();
                for _ in 0..frames {
                    let sample = (phase.sin() * i16::MAX as f32 * 0.8) as i16;
                    samples.extend(std::iter::repeat(sample).take(CHANNELS as usize));
                    phase = (phase + step) % std::f32::consts::TAU;
                }
                buffer.write_samples(&samples);
                thread::sleep(Duration::from_millis(5));
            }
        })
        .context("Failed to spawn tone thread")
}

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;
    if args.list_devices {
        list_devices();
        return Ok(());
    }

    let mut config = load_mixer_config(args.config.as_deref());
    if let Some(backend) = args.backend {
        config = config.with_backend(backend);
    }
    if let Some(device) = args.device {
        config = config.with_device(device);
    }
    if let Some(frames) = args.max_frames {
        config = config.with_max_buffer_frames(frames);
    }
    let mixer = SoundMixer::from_config(&config)?;
    log::info!(
        "ringmix-probe: {} Hz tone for {}s at volume {:.2} ({} backend)",
        TONE_HZ,
        args.seconds,
        args.volume,
        mixer.backend_name()
    );

    let buffer = Arc::new(PcmRingBuffer::with_duration(SAMPLE_RATE, CHANNELS, BUFFER_MS));
    buffer.set_linear_volume(args.volume);
    let handle = BufferHandle::new(&buffer);
    mixer.register(handle.clone())?;

    let running = Arc::new(AtomicBool::new(true));
    let tone = spawn_tone(buffer.clone(), running.clone())?;
    buffer.play();

    let start = Instant::now();
    let mut last_report = start;
    while start.elapsed() < Duration::from_secs(args.seconds) {
        mixer.write_all(WRITE_INTERVAL_MS);
        if last_report.elapsed() >= Duration::from_secs(1) {
            mixer.print_diagnostics();
            last_report = Instant::now();
        }
        thread::sleep(Duration::from_millis(WRITE_INTERVAL_MS as u64));
    }

    buffer.stop();
    for info in mixer.collect_info() {
        log::info!(
            "{}: {} callbacks, {} bytes rendered, {} underruns",
            info.id,
            info.callbacks,
            info.bytes_rendered,
            info.underruns
        );
    }
    mixer.unregister(&handle);

    running.store(false, Ordering::Relaxed);
    if tone.join().is_err() {
        log::error!("Tone thread panicked");
    }
    Ok(())
}
