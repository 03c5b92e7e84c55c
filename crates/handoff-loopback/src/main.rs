//! Handoff Loopback - play what a capture device hears, through filters
//!
//! ```text
//!  capture device ─▶ [barrier] ─▶ filters ─▶ [barrier] ─▶ playback device
//! ```
//!
//! The filter chain comes from the config file (`~/.config/handoff/loopback.yaml`
//! by default). Channel mapping and resampling are added automatically when
//! the two devices disagree.
//!
//! ## Command line flags
//!
//! - `--config <path>`: read this config file instead of the default one
//! - `--list-devices`: print every capture and playback device and exit
//! - `--seconds <n>`: run for n seconds instead of until Enter is pressed
//! - `--tone <hz>`: play a sine tone instead of opening a capture device
//! - `--save-config`: write the effective config back to its file

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use handoff_core::audio::{
    AudioDevice, AudioDeviceManager, CpalCaptureDevice, DEFAULT_SAMPLE_RATE,
};
use handoff_core::config::{
    default_config_path, load_config, save_config, EngineConfig, DEFAULT_CONFIG_FILE,
};
use handoff_core::filter::FilterRegistry;
use handoff_core::packet::AudioFormat;
use handoff_core::task::{Pipeline, TaskReport, ToneSource, DEFAULT_DRAIN_TIMEOUT};

const TONE_AMPLITUDE: f64 = 0.25;

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    list_devices: bool,
    seconds: Option<u64>,
    tone: Option<f64>,
    save_config: bool,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut parsed = Args::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let path = args.next().context("--config needs a path")?;
                    parsed.config = Some(PathBuf::from(path));
                }
                "--list-devices" => parsed.list_devices = true,
                "--seconds" => {
                    let value = args.next().context("--seconds needs a value")?;
                    parsed.seconds = Some(
                        value
                            .parse()
                            .with_context(|| format!("Invalid --seconds value: {}", value))?,
                    );
                }
                "--tone" => {
                    let value = args.next().context("--tone needs a frequency")?;
                    let hz: f64 = value
                        .parse()
                        .with_context(|| format!("Invalid --tone frequency: {}", value))?;
                    if !hz.is_finite() || hz <= 0.0 {
                        bail!("--tone frequency must be positive, got {}", hz);
                    }
                    parsed.tone = Some(hz);
                }
                "--save-config" => parsed.save_config = true,
                other => bail!("Unknown argument: {}", other),
            }
        }
        Ok(parsed)
    }
}

fn main() -> Result<()> {
    // RUST_LOG=debug for negotiation details
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse(std::env::args().skip(1))?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| default_config_path(DEFAULT_CONFIG_FILE));
    let config: EngineConfig = load_config(&config_path);
    if args.save_config {
        save_config(&config, &config_path)?;
    }

    let mut manager = AudioDeviceManager::new();
    manager
        .initialize()
        .context("Could not enumerate audio devices")?;

    if args.list_devices {
        list_devices(&manager);
        return Ok(());
    }

    run(&args, &config, &manager)
}

fn list_devices(manager: &AudioDeviceManager) {
    println!("Capture devices:");
    for device in manager.capture_devices() {
        print_device(device);
    }
    println!();
    println!("Playback devices:");
    for device in manager.playback_devices() {
        print_device(device);
    }
}

fn print_device(device: &handoff_core::audio::DeviceInfo) {
    let marker = if device.is_default { "*" } else { " " };
    println!(
        " {} {} ({} ch, {:?} Hz)",
        marker, device, device.max_channels, device.sample_rates
    );
}

fn run(args: &Args, config: &EngineConfig, manager: &AudioDeviceManager) -> Result<()> {
    let registry = FilterRegistry::with_builtin();
    let mut playback = manager
        .open_playback(config.playback_device.as_ref())
        .context("Could not open playback device")?;

    // Negotiate capture first so playback can be asked for the same format
    let mut capture: Option<CpalCaptureDevice> = None;
    let input = match args.tone {
        Some(_) => match config.format {
            Some(format) => format,
            None => AudioFormat::pcm_f32(2, DEFAULT_SAMPLE_RATE)?,
        },
        None => {
            let mut device = manager
                .open_capture(config.capture_device.as_ref())
                .context("Could not open capture device")?;
            let format = device.initialize(&config.capture_request())?;
            capture = Some(device);
            format
        }
    };
    let output = playback.initialize(&config.playback_request(&input))?;
    log::info!("Capture format {}, playback format {}", input, output);

    let mut builder = Pipeline::builder(input)
        .packet_frames(config.packet_frames)
        .prefill_packets(config.prefill_packets)
        .barrier(config.barrier);
    for filter in config
        .build_filters(&registry, &input, &output)
        .context("Could not build the filter chain")?
    {
        builder = builder.filter(filter);
    }
    if let Some(hz) = args.tone {
        builder = builder.source(Box::new(ToneSource::new(
            input,
            hz,
            TONE_AMPLITUDE,
            config.packet_frames,
        )));
    }
    let mut pipeline = builder.build()?;
    log::info!("Stages: {}", pipeline.stage_names().join(" -> "));

    if let Some(device) = capture.as_mut() {
        let endpoint = pipeline
            .take_capture_endpoint()
            .context("Pipeline has no capture endpoint")?;
        device.attach(endpoint)?;
    }
    let endpoint = pipeline
        .take_playback_endpoint()
        .context("Pipeline has no playback endpoint")?;
    playback.attach(endpoint)?;

    pipeline.start()?;
    playback.start()?;
    if let Some(device) = capture.as_mut() {
        device.start()?;
    }

    wait(args.seconds)?;

    // Stopping capture closes the first barrier; the rest drains behind it
    if let Some(device) = capture.as_mut() {
        device.stop()?;
    }
    let reports = pipeline.shutdown(DEFAULT_DRAIN_TIMEOUT)?;
    playback.stop()?;

    print_summary(&reports, &pipeline);
    Ok(())
}

fn wait(seconds: Option<u64>) -> Result<()> {
    match seconds {
        Some(seconds) => {
            println!("Running for {}s", seconds);
            let deadline = Instant::now() + Duration::from_secs(seconds);
            while Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(100));
            }
        }
        None => {
            println!("Running, press Enter to stop");
            let mut line = String::new();
            std::io::stdin()
                .read_line(&mut line)
                .context("Failed to read stdin")?;
        }
    }
    Ok(())
}

fn print_summary(reports: &[TaskReport], pipeline: &Pipeline) {
    println!();
    for report in reports {
        println!(
            "{:<24} processed {:>8}  idle {:>8}  late {:>4}  max {:?}",
            report.name, report.processed, report.idle, report.deadline_misses, report.max_step
        );
        if let Some(error) = &report.error {
            println!("{:<24} ended with: {}", "", error);
        }
    }
    for (index, stats) in pipeline.barrier_stats().iter().enumerate() {
        println!(
            "barrier {:<16} pushed {:>8}  popped {:>8}  overruns {:>4}  underruns {:>4}",
            index, stats.pushed, stats.popped, stats.overruns, stats.underruns
        );
    }
}
