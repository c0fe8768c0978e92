//! Application entry point for Audio Jack Streamer.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] (first CLI argument, or the platform settings file;
//!    defaults when missing) and validate it.
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Open the cpal input device and build the [`PipelineController`].
//! 5. Spawn the spectral worker (worker mode) and the update presenter.
//! 6. Read console commands from stdin on the main thread until `quit` or
//!    end of input.  The controller, and with it the device, stays on this
//!    thread for its whole lifetime.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;

use audio_jack_streamer::{
    audio::{AudioDevice, CpalDevice, SpectralEstimator},
    config::{AppConfig, EstimationMode},
    console::Command,
    pipeline::{ChannelSink, PipelineController, PipelineUpdate, UpdateSink},
};

/// Updates buffered between the pipeline and the presenter.
const UPDATE_QUEUE: usize = 4;

/// Minimum stream time between two info-level update summaries.
const SUMMARY_INTERVAL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Presenter
// ---------------------------------------------------------------------------

/// Consumes published updates and prints a compact summary: elapsed stream
/// time, window size, peak amplitude and the dominant frequency below
/// `max_frequency`.
async fn present_updates(mut rx: mpsc::Receiver<PipelineUpdate>, max_frequency: f64) {
    let mut last_summary: Option<Duration> = None;

    while let Some(update) = rx.recv().await {
        let due = match last_summary {
            Some(last) => update.elapsed < last || update.elapsed - last >= SUMMARY_INTERVAL,
            None => true,
        };
        let peak = update.spectrum.up_to(max_frequency).peak();
        let line = match peak {
            Some((freq, power)) => format!(
                "t={:>8.2}s  window={:>6}  |x|max={:>5}  peak {:>7.1} Hz ({:.3e})",
                update.elapsed_secs(),
                update.time_window.len(),
                update.peak_amplitude(),
                freq,
                power
            ),
            None => format!(
                "t={:>8.2}s  window={:>6}  |x|max={:>5}",
                update.elapsed_secs(),
                update.time_window.len(),
                update.peak_amplitude()
            ),
        };

        if due {
            log::info!("{line}");
            last_summary = Some(update.elapsed);
        } else {
            log::debug!("{line}");
        }
    }

    log::info!("presenter: update channel closed");
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

fn execute<D: AudioDevice>(controller: &mut PipelineController<D>, command: Command) {
    match command {
        Command::Start => match controller.start() {
            Ok(()) => println!("running"),
            Err(e) => println!("start failed: {e}"),
        },
        Command::Stop => match controller.stop() {
            Ok(()) => println!("stopped"),
            Err(e) => println!("stop: {e}"),
        },
        Command::SetUpdateRate(hz) => match controller.set_update_rate(hz) {
            Ok(chunk) => println!("update rate {hz} Hz, chunk size {chunk}"),
            Err(e) => println!("rate: {e}"),
        },
        Command::SetHistoryLength(n) => match controller.set_history_length(n) {
            Ok(()) => println!("history length {n}"),
            Err(e) => println!("history: {e}"),
        },
        Command::Status => {
            let cfg = controller.current_config();
            let fill = controller.history_fill();
            println!(
                "{}  sample rate {} Hz  update rate {} Hz ({:.2} Hz effective)  chunk {} ({:.1} ms)  overruns {}",
                controller.state().label(),
                cfg.sample_rate,
                cfg.update_rate,
                cfg.effective_update_rate(),
                cfg.chunk_size,
                cfg.block_period_secs() * 1_000.0,
                controller.overrun_count()
            );
            println!(
                "history {}/{} samples ({:.3} s){}",
                fill.len,
                fill.capacity,
                fill.span_secs,
                if fill.full { ", full" } else { "" }
            );
        }
        Command::Help => println!("{}", Command::HELP),
        Command::Quit => {}
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Audio Jack Streamer starting up");

    // 2. Configuration
    let config = match std::env::args_os().nth(1) {
        Some(path) => AppConfig::load_from(Path::new(&path))
            .with_context(|| format!("loading {}", Path::new(&path).display()))?,
        None => AppConfig::load().unwrap_or_else(|e| {
            log::warn!("Failed to load config ({e}); using defaults");
            AppConfig::default()
        }),
    };
    config.validate()?;

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4. Device + controller
    let device = CpalDevice::new(config.device.input_device.as_deref())
        .context("no usable audio input device")?;

    let (update_tx, update_rx) = mpsc::channel::<PipelineUpdate>(UPDATE_QUEUE);
    let sink: Arc<dyn UpdateSink> = Arc::new(ChannelSink::new(update_tx));
    let estimator = SpectralEstimator::new(config.spectrum.detrend, config.spectrum.scaling);
    log::info!(
        "spectrum: {:?} detrend, {:?} scaling, {:?} mode",
        estimator.detrend(),
        estimator.scaling(),
        config.spectrum.mode
    );

    let mut controller = match config.spectrum.mode {
        EstimationMode::Inline => {
            PipelineController::inline(device, &config.stream, estimator, sink)?
        }
        EstimationMode::Worker => {
            let (controller, worker) =
                PipelineController::with_worker(device, &config.stream, estimator, sink)?;
            rt.spawn(worker.run());
            controller
        }
    };

    // 5. Presenter
    rt.spawn(present_updates(update_rx, config.display.max_frequency));

    if config.stream.autostart {
        execute(&mut controller, Command::Start);
    }

    // 6. Console loop
    println!("{}", Command::HELP);
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => execute(&mut controller, command),
            Err(e) => println!("{e}"),
        }
    }

    drop(controller);
    rt.shutdown_timeout(Duration::from_secs(1));
    log::info!("Audio Jack Streamer shut down");
    Ok(())
}
