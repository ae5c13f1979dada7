//! Replays a recorded session through the full acquisition pipeline.
//!
//! ```text
//! replay-session <RECORDING | --synthetic N> --export-dir DIR
//!     [--exposure MS] [--auto-exposure] [--fps FPS] [--frames N] [--bulk]
//! ```
//!
//! Live mode plays the recording through an `AcquisitionContext` in
//! continuous capture, feeds it to a `Worker` and prints every result. Bulk
//! mode hands the recording straight to `Worker::replay_session`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use clap::Parser;
use thiserror::Error;

use acquisition_core::models::state::HardwareSnapshot;
use acquisition_core::{
    load_recording, AcquisitionConfig, AcquisitionContext, AcquisitionError, ExportSettings,
    FileExporter, OperationMode, PipelineResult, Recording, SessionInfo, Settable, Setting,
    StateObserver, Worker, WorkerConfig,
};
use acquisition_sim::{generate_recording, DarkSubtraction, GeneratorSettings, PreviewViewer};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
const ONLINE_TIMEOUT: Duration = Duration::from_secs(10);
/// Give up once the source is exhausted and nothing arrived for this long.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
const FPS_WINDOW: usize = 200;
const FPS_TOLERANCE: f64 = 0.5;
const DARK_LEVEL: u16 = 16;

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error("hardware stayed offline for {0:?}")]
    Offline(Duration),
}

#[derive(Debug)]
enum Input {
    Directory(PathBuf),
    Synthetic(usize),
}

/// Command-line arguments for the session replay driver.
#[derive(Parser, Debug)]
#[command(author, version, about = "Replays a recorded session through the acquisition pipeline", long_about = None)]
struct Args {
    /// Recording directory written by `save_recording`.
    #[arg(required_unless_present = "synthetic")]
    recording: Option<PathBuf>,

    /// Generate a synthetic recording with this many frames instead.
    #[arg(long, conflicts_with = "recording")]
    synthetic: Option<usize>,

    /// Directory the exported frames are written to.
    #[arg(short = 'o', long)]
    export_dir: PathBuf,

    /// Integration time in milliseconds.
    #[arg(long = "exposure", default_value_t = 20.0)]
    exposure_ms: f64,

    #[arg(long)]
    auto_exposure: bool,

    /// Target frame rate.
    #[arg(long, default_value_t = 10.0, value_parser = positive_rate)]
    fps: f64,

    /// Stop after this many results (loops the recording if needed).
    #[arg(long = "frames")]
    max_frames: Option<usize>,

    /// Feed the recording straight to the worker instead of a replay context.
    #[arg(long)]
    bulk: bool,
}

impl Args {
    fn input(&self) -> Input {
        match (&self.recording, self.synthetic) {
            (Some(dir), _) => Input::Directory(dir.clone()),
            (None, count) => Input::Synthetic(count.unwrap_or_default()),
        }
    }
}

fn positive_rate(value: &str) -> Result<f64, String> {
    let rate: f64 = value.parse().map_err(|e| format!("{}", e))?;
    if rate <= 0.0 {
        return Err(format!("{} is not a positive rate", rate));
    }
    Ok(rate)
}

/// Rolling frame-rate estimate over arrival times.
struct FpsMeter {
    window: usize,
    started: Option<DateTime<Utc>>,
    frames: usize,
}

impl FpsMeter {
    fn new(window: usize) -> Self {
        Self {
            window: window.max(2),
            started: None,
            frames: 0,
        }
    }

    /// Record one arrival; returns the average rate once a window closes.
    fn tick(&mut self, now: DateTime<Utc>) -> Option<f64> {
        let started = *self.started.get_or_insert(now);
        self.frames += 1;
        if self.frames < self.window {
            return None;
        }
        let elapsed = (now - started).num_microseconds()? as f64 / 1_000_000.0;
        self.started = Some(now);
        self.frames = 1;
        (elapsed > 0.0).then(|| (self.window - 1) as f64 / elapsed)
    }
}

fn print_state(snapshot: &HardwareSnapshot) {
    println!("hardware state: {:?}", snapshot.state);
    for (id, component) in snapshot.components.iter().enumerate() {
        println!(
            "  component {} '{}': {}",
            id,
            component.display_name,
            if component.is_online { "online" } else { "offline" }
        );
    }
}

fn print_result(result: &PipelineResult) {
    match result.error() {
        None => println!("frame {} processed", result.sequence_number()),
        Some(err) => println!("frame {} failed: {}", result.sequence_number(), err),
    }
}

fn load_input(input: &Input) -> Result<Recording, AcquisitionError> {
    match input {
        Input::Directory(dir) => load_recording(dir),
        Input::Synthetic(count) => generate_recording(&GeneratorSettings {
            frame_count: *count,
            ..Default::default()
        }),
    }
}

fn exporter(export_dir: &Path) -> Result<Arc<FileExporter>, AcquisitionError> {
    Ok(Arc::new(FileExporter::new(ExportSettings {
        export_dir: export_dir.to_path_buf(),
        allow_overwrite: true,
        write_sidecar: true,
    })?))
}

fn worker(with_drop: bool) -> Result<Worker, AcquisitionError> {
    let worker = Worker::new(WorkerConfig {
        worker_count: 0,
        poll_interval_ms: 10,
        keep_out_of_sequence: false,
        queue_soft_limit: 10,
        queue_hard_limit: 10,
        can_drop: with_drop,
    })?;
    worker.set_processing_stage(Arc::new(DarkSubtraction::new(DARK_LEVEL)));
    worker.set_view_generator(Arc::new(PreviewViewer));
    Ok(worker)
}

fn run_live(args: &Args, recording: Recording) -> Result<(), AppError> {
    let expected = args
        .max_frames
        .unwrap_or_else(|| recording.replay_len(true));
    let looping = expected > recording.replay_len(true);

    let context = Arc::new(AcquisitionContext::replay(
        recording,
        looping,
        AcquisitionConfig::default(),
    )?);
    context.set_session_info(SessionInfo {
        name: "video".into(),
        session_number: 1,
    });
    let exporter = exporter(&args.export_dir)?;

    let observer = StateObserver::default();
    observer.register(context.clone(), Arc::new(print_state), true)?;

    let waiting_since = Instant::now();
    while context.state().is_offline() {
        if waiting_since.elapsed() > ONLINE_TIMEOUT {
            return Err(AppError::Offline(ONLINE_TIMEOUT));
        }
        thread::sleep(Duration::from_millis(100));
    }

    context.set_integration_time(args.exposure_ms).wait(COMMAND_TIMEOUT)?;
    context.set_operation_mode(OperationMode::Internal).wait(COMMAND_TIMEOUT)?;
    context.set_fps(args.fps).wait(COMMAND_TIMEOUT)?;
    context
        .set_async(Setting::AUTO_EXPOSURE, args.auto_exposure)
        .wait(COMMAND_TIMEOUT)?;
    context.capture_continuous_start()?;

    let worker = worker(true)?;
    worker.set_source(context.clone());
    worker.set_exporter(exporter.clone());

    let mut meter = FpsMeter::new(FPS_WINDOW.min(expected));
    let mut received = 0usize;
    let mut last_arrival = Instant::now();
    while received < expected {
        let Some(result) = worker.get_next_result() else {
            let exhausted = !context.link().has_remaining() && !context.has_next_measurement();
            if exhausted && last_arrival.elapsed() > DRAIN_TIMEOUT {
                log::warn!("source exhausted after {} of {} results", received, expected);
                break;
            }
            thread::sleep(Duration::from_millis(1));
            continue;
        };
        received += 1;
        last_arrival = Instant::now();
        print_result(&result);

        if let Some(fps) = meter.tick(Utc::now()) {
            println!("average fps: {:.2}", fps);
            if (fps - args.fps).abs() > FPS_TOLERANCE {
                log::warn!("measured {:.2} fps, expected {:.2}", fps, args.fps);
            }
        }
        if worker.queue_used() >= worker.queue_limits().hard {
            log::warn!("worker result queue is full");
        }
        if context.queue_used() >= context.queue_size() {
            log::warn!("acquisition frame queue is full");
        }
    }

    context.capture_continuous_stop();
    observer.reset();
    worker.clear_source();

    let diagnostics = worker.diagnostics();
    println!(
        "received {} results, exported {} frames, {} evicted, {} acquisition frames dropped",
        received,
        exporter.frames_written(),
        diagnostics.results_evicted,
        context.frames_dropped()
    );
    Ok(())
}

fn run_bulk(args: &Args, recording: Recording) -> Result<(), AppError> {
    let exporter = exporter(&args.export_dir)?;
    let worker = worker(false)?;
    worker.set_exporter(exporter.clone());

    let handle = worker.replay_session(recording, false)?;
    let mut received = 0usize;
    while !handle.is_finished() || worker.has_next_result() {
        match worker.get_next_result() {
            Some(result) => {
                received += 1;
                print_result(&result);
                if received % 10 == 0 {
                    let progress = handle.progress();
                    println!(
                        "replay progress: {}/{}",
                        progress.frames_delivered, progress.frames_total
                    );
                }
            }
            None => thread::sleep(Duration::from_millis(1)),
        }
    }

    let delivered = handle.wait()?;
    println!(
        "replayed {} frames, received {} results, exported {}",
        delivered,
        received,
        exporter.frames_written()
    );
    Ok(())
}

fn run() -> Result<(), AppError> {
    let args = Args::parse();
    let recording = load_input(&args.input())?;
    log::info!(
        "loaded recording '{}' ({} frames, {} dropped)",
        recording.name,
        recording.len(),
        recording.dropped_count()
    );

    if args.bulk {
        run_bulk(&args, recording)
    } else {
        run_live(&args, recording)
    }
}

fn main() {
    env_logger::init();

    if let Err(err) = run() {
        eprintln!("replay-session: {}", err);
        std::process::exit(1);
    }
}
