//! vidtools - batch video transcoding on top of ffmpeg
//!
//! Command line front end: resolves the encoder, builds the requested job,
//! runs it on a background task and draws its progress in the terminal.

use anyhow::Result;
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use vidtools::batch::{BatchController, BatchJob};
use vidtools::capabilities::CapabilityDetector;
use vidtools::cli::{Args, Commands};
use vidtools::config::Config;
use vidtools::error::VidtoolsError;
use vidtools::media::{estimate_total_seconds, probe};
use vidtools::observer::{BatchEvent, BatchOutcome, ChannelObserver, FileStatus};
use vidtools::operations::{self, CodecPreset, ConcatList, CropRegion, Rotation};
use vidtools::size::human_size;
use vidtools::timecode::{parse_clock, seconds_to_clock};

const LOG_FILE: &str = "vidtools.log";
const BAR_SCALE: u64 = 1000;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = load_config(args.config.as_deref())?;
    let _guard = setup_logging(args.verbose, &config.logging.directory)?;

    if let Commands::InitConfig { path, force } = &args.command {
        if path.exists() && !force {
            return Err(VidtoolsError::Config(format!(
                "{} already exists, use --force to overwrite",
                path.display()
            ))
            .into());
        }
        Config::default().save_to_file(path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    // Configuration errors stop here, before any batch begins
    let controller = BatchController::new(&config)?;
    let detector = CapabilityDetector::for_binary(controller.binary());
    let log_path = config.logging.directory.join(LOG_FILE);

    // The concat list has to outlive the batch that reads it
    let mut _concat_list = None;
    let jobs = match args.command {
        Commands::Features { has } => {
            let flags = detector.flags().await?;
            return Ok(match has {
                Some(token) => {
                    let present = flags.has(&token);
                    println!("{}: {}", token, if present { "yes" } else { "no" });
                    if present { ExitCode::SUCCESS } else { ExitCode::FAILURE }
                }
                None => {
                    for token in flags.iter() {
                        println!("{}", token);
                    }
                    println!("\nAvailable formats:");
                    for preset in operations::available_presets(flags) {
                        println!("  {:<6} {}", preset.name(), preset.description());
                    }
                    ExitCode::SUCCESS
                }
            });
        }
        Commands::Probe { json, inputs } => {
            return probe_files(&config, controller.binary(), &inputs, json).await;
        }
        Commands::InitConfig { .. } => unreachable!("handled before encoder resolution"),
        Commands::Convert { codec, inputs } => {
            let preset: CodecPreset = codec.parse()?;
            vec![operations::convert(preset, detector.flags().await?)?.with_inputs(inputs)]
        }
        Commands::Concat { codec, output, inputs } => {
            let preset: CodecPreset = codec.parse()?;
            let output = output.unwrap_or_else(|| sibling_of_first(&inputs, "concatenated.mp4"));
            let list = ConcatList::write(&inputs)?;
            let job = operations::concatenate(&list, &output, preset, detector.flags().await?)?;
            _concat_list = Some(list);
            vec![job.with_inputs(inputs)]
        }
        Commands::Extract { start, end, input } => {
            vec![operations::extract_interval(&start, &end)?.with_inputs(vec![input])]
        }
        Commands::Crop { width, height, x, y, inputs } => {
            vec![operations::crop(CropRegion { width, height, x, y }).with_inputs(inputs)]
        }
        Commands::Deshake { shakiness, zoom, vectors, inputs } => {
            let flags = detector.flags().await?;
            // Each input needs its own analysis pass right before its transform
            let mut jobs = Vec::new();
            for input in inputs {
                let vectors_path = vectors_path_for(&input, vectors.as_deref());
                for job in operations::deshake(shakiness, zoom, &vectors_path, flags)? {
                    jobs.push(job.with_inputs(vec![input.clone()]));
                }
            }
            jobs
        }
        Commands::Resize { size, inputs } => vec![operations::resize(&size)?.with_inputs(inputs)],
        Commands::Rotate { rotation, inputs } => {
            let rotation: Rotation = rotation.parse()?;
            vec![operations::rotate(rotation).with_inputs(inputs)]
        }
        Commands::Run { inputs, suffix, output, label, template } => {
            let mut job = BatchJob::new(label, template).with_inputs(inputs);
            job.destination_suffix = suffix;
            job.fixed_destination = output;
            vec![job]
        }
    };

    let fixed_estimate = match &args.estimate {
        Some(text) => Some(parse_clock(text).ok_or_else(|| {
            VidtoolsError::InvalidArgument(format!("Invalid estimate '{}', expected HH:MM:SS", text))
        })?),
        None => None,
    };

    let mut failed = false;
    for job in jobs {
        let estimate = match fixed_estimate {
            Some(seconds) => seconds,
            None => estimate_total_seconds(&config.encoder, controller.binary(), &job.inputs).await,
        };
        info!("Estimated duration of '{}': {}", job.label, seconds_to_clock(estimate as f64));

        match execute(&controller, job.with_estimate(estimate as f64)).await? {
            BatchOutcome::Completed => {}
            BatchOutcome::CompletedWithFailures => failed = true,
            BatchOutcome::Cancelled => {
                println!("Cancelled.");
                return Ok(ExitCode::SUCCESS);
            }
        }
    }

    if failed {
        eprintln!(
            "Some files failed to process, see {} for details.",
            log_path.display()
        );
        Ok(ExitCode::FAILURE)
    } else {
        println!("Done.");
        Ok(ExitCode::SUCCESS)
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    Ok(match path {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new("vidtools.toml").exists() {
                Config::from_file("vidtools.toml")?
            } else {
                Config::default()
            }
        }
    })
}

/// Run one job on a background task, drawing its events until it finishes.
/// Ctrl-C requests cancellation.
async fn execute(controller: &BatchController, job: BatchJob) -> Result<BatchOutcome> {
    let (observer, mut events) = ChannelObserver::new();
    let handle = controller.clone().spawn(job, Arc::new(observer));
    let cancel = handle.cancel_handle();
    let display = ProgressDisplay::new();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => display.handle(event),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                warn!("Interrupted, stopping the batch");
                cancel.cancel();
            }
        }
    }

    let report = handle.join().await?;
    display.finish();

    for file in report.files.iter().filter(|f| f.is_failure()) {
        eprintln!("Failed: {}", file.source.display());
    }

    Ok(report.outcome)
}

/// Two bars: the whole batch and the file being encoded
struct ProgressDisplay {
    _multi: MultiProgress,
    batch: ProgressBar,
    file: ProgressBar,
}

impl ProgressDisplay {
    fn new() -> Self {
        let style = ProgressStyle::with_template("{prefix:>8} [{bar:40.cyan/blue}] {percent:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");

        let multi = MultiProgress::new();
        let batch = multi.add(ProgressBar::new(BAR_SCALE).with_style(style.clone()).with_prefix("batch"));
        let file = multi.add(ProgressBar::new(BAR_SCALE).with_style(style).with_prefix("file"));

        Self { _multi: multi, batch, file }
    }

    fn handle(&self, event: BatchEvent) {
        match event {
            BatchEvent::FileStarted { file_index, source, destination } => {
                self.file.reset();
                self.file.set_message(format!(
                    "{} -> {}",
                    display_name(&source),
                    display_name(&destination)
                ));
                info!("File {}: {}", file_index + 1, source.display());
            }
            BatchEvent::Progress(update) => {
                self.batch.set_position(scaled(update.batch_fraction));
                self.batch.set_message(format!(
                    "{} [{} / {}]",
                    update.batch_label,
                    seconds_to_clock(update.completed_seconds + update.cursor_seconds),
                    seconds_to_clock(update.estimated_total_seconds)
                ));

                self.file.set_position(scaled(update.file_fraction));
                let size = update
                    .destination_bytes
                    .map(|bytes| format!(" ({})", human_size(bytes)))
                    .unwrap_or_default();
                self.file.set_message(format!(
                    "{} {} / {}{}",
                    update.file_label,
                    seconds_to_clock(update.cursor_seconds),
                    seconds_to_clock(update.file_total_seconds),
                    size
                ));
            }
            BatchEvent::FileFinished(result) => {
                if let FileStatus::Failed(reason) = &result.status {
                    self.file.println(format!("{}: {}", display_name(&result.source), reason));
                }
            }
            BatchEvent::Finished(outcome) => {
                if outcome == BatchOutcome::Completed {
                    self.batch.set_position(BAR_SCALE);
                }
            }
        }
    }

    fn finish(&self) {
        self.file.finish_and_clear();
        self.batch.finish();
    }
}

fn scaled(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * BAR_SCALE as f64) as u64
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn sibling_of_first(inputs: &[PathBuf], name: &str) -> PathBuf {
    inputs
        .first()
        .and_then(|p| p.parent())
        .unwrap_or_else(|| Path::new("."))
        .join(name)
}

/// `<stem>.trf` in `dir`, or next to the input
fn vectors_path_for(input: &Path, dir: Option<&Path>) -> PathBuf {
    let name = format!(
        "{}.trf",
        input.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
    );
    match dir {
        Some(dir) => dir.join(name),
        None => input.parent().unwrap_or_else(|| Path::new(".")).join(name),
    }
}

async fn probe_files(config: &Config, binary: &Path, inputs: &[PathBuf], json: bool) -> Result<ExitCode> {
    let mut infos = Vec::new();
    let mut any_missing = false;
    for input in inputs {
        match probe(&config.encoder, binary, input).await {
            Ok(info) => infos.push(info),
            Err(e) => {
                warn!("Could not probe {}: {}", input.display(), e);
                eprintln!("{}: {}", input.display(), e);
                any_missing = true;
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
    } else {
        println!("{:<40} {:<10} {:<10} {:<12} {:<8} {:<10}", "File", "Duration", "Video", "Resolution", "Audio", "Size");
        println!("{}", "-".repeat(95));
        let mut total = 0;
        for info in &infos {
            let duration = info.duration_seconds.unwrap_or(0);
            total += duration;
            println!(
                "{:<40} {:<10} {:<10} {:<12} {:<8} {:<10}",
                display_name(&info.path),
                seconds_to_clock(duration as f64),
                info.video_codec.as_deref().unwrap_or("-"),
                info.resolution.map(|(w, h)| format!("{}x{}", w, h)).unwrap_or_else(|| "-".to_string()),
                info.audio_codec.as_deref().unwrap_or("-"),
                human_size(info.size_bytes),
            );
        }
        println!("\nTotal duration: {}", seconds_to_clock(total as f64));
    }

    Ok(if any_missing { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool, log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(log_dir, LOG_FILE);
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Keep the console quiet unless asked, progress bars share it
    let console_level = if verbose { LevelFilter::DEBUG } else { LevelFilter::WARN };
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_level);

    // Create file layer
    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - level: {}, file: {}", log_level, log_dir.join(LOG_FILE).display());

    Ok(guard)
}
