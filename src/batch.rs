//! Sequential batch encoding.
//!
//! One encoder process at a time; a failing file is logged and flagged but
//! never stops the files after it. Cancellation is checked before each launch
//! and while reading encoder output, where it kills the running process.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{Config, EncoderConfig};
use crate::error::{Result, VidtoolsError};
use crate::media::{EncoderCommand, RunningEncoder};
use crate::observer::{BatchObserver, BatchOutcome, FileResult, FileStatus, ProgressUpdate};
use crate::progress::ProgressParser;
use crate::size::human_size;
use crate::template::{expand, Bindings, EXT};
use crate::timecode::seconds_to_clock;

/// Unit of work submitted to the controller
#[derive(Debug, Clone, PartialEq)]
pub struct BatchJob {
    pub label: String,
    pub inputs: Vec<PathBuf>,
    /// Encoder arguments with `${SOURCE}`, `${DEST}` and `${EXT}` placeholders
    pub command_template: Vec<String>,
    /// Appended to the input's stem to name the output; may contain `${EXT}`
    pub destination_suffix: Option<String>,
    /// Forces a single job writing to this path, whatever `inputs` holds
    pub fixed_destination: Option<PathBuf>,
    /// Denominator for batch progress, fixed before the batch starts
    pub estimated_total_seconds: f64,
}

impl BatchJob {
    pub fn new<S: Into<String>>(label: S, command_template: Vec<String>) -> Self {
        Self {
            label: label.into(),
            inputs: Vec::new(),
            command_template,
            destination_suffix: None,
            fixed_destination: None,
            estimated_total_seconds: 0.0,
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<PathBuf>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_suffix<S: Into<String>>(mut self, suffix: S) -> Self {
        self.destination_suffix = Some(suffix.into());
        self
    }

    pub fn with_fixed_destination<P: Into<PathBuf>>(mut self, destination: P) -> Self {
        self.fixed_destination = Some(destination.into());
        self
    }

    pub fn with_estimate(mut self, seconds: f64) -> Self {
        self.estimated_total_seconds = seconds;
        self
    }

    /// The files the batch walks: the fixed destination alone when set
    pub fn effective_inputs(&self) -> Vec<PathBuf> {
        match &self.fixed_destination {
            Some(destination) => vec![destination.clone()],
            None => self.inputs.clone(),
        }
    }

    /// Output path for `source`.
    ///
    /// `<stem><suffix>` with `${EXT}` bound to the source extension, or
    /// `<stem>.<ext>` without a suffix. Placed in `output_dir` when given,
    /// next to the source otherwise.
    pub fn destination_for(&self, source: &Path, output_dir: Option<&Path>) -> PathBuf {
        if let Some(destination) = &self.fixed_destination {
            return destination.clone();
        }

        let ext = extension_of(source);
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let suffix = match &self.destination_suffix {
            Some(suffix) => suffix.replace(EXT, &ext),
            None if ext.is_empty() => String::new(),
            None => format!(".{}", ext),
        };

        let dir = output_dir
            .map(Path::to_path_buf)
            .or_else(|| source.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        dir.join(format!("{}{}", stem, suffix))
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Cooperative stop flag shared between the batch worker and its caller
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request a stop; callable from any thread, any number of times
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable state of one batch execution. Never reused.
#[derive(Debug)]
pub struct BatchRun {
    pub cancel: CancelHandle,
    pub completed_seconds: f64,
    pub any_failure: bool,
    pub files: Vec<FileResult>,
}

impl BatchRun {
    pub fn new(cancel: CancelHandle) -> Self {
        Self {
            cancel,
            completed_seconds: 0.0,
            any_failure: false,
            files: Vec::new(),
        }
    }

    fn record(&mut self, result: FileResult, observer: &dyn BatchObserver) {
        if result.is_failure() {
            self.any_failure = true;
        }
        observer.on_file_finished(&result);
        self.files.push(result);
    }
}

/// Summary returned once a batch has finished
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub outcome: BatchOutcome,
    pub files: Vec<FileResult>,
    pub completed_seconds: f64,
}

/// A batch running on its own task
pub struct BatchHandle {
    cancel: CancelHandle,
    task: JoinHandle<Result<BatchReport>>,
}

impl BatchHandle {
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn join(self) -> Result<BatchReport> {
        self.task
            .await
            .map_err(|e| VidtoolsError::Worker(format!("Batch task failed: {}", e)))?
    }
}

enum Step {
    Line(String),
    Eof,
    Cancelled,
}

/// Outcome of encoding one file, before it becomes a [`FileResult`]
struct EncodeResult {
    status: FileStatus,
    exit_code: Option<i32>,
    cursor_seconds: f64,
    last_line: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BatchController {
    binary: PathBuf,
    encoder: EncoderConfig,
    output_dir: Option<PathBuf>,
}

impl BatchController {
    /// Resolve the encoder from configuration. A missing binary is fatal here,
    /// before any batch begins.
    pub fn new(config: &Config) -> Result<Self> {
        let binary = config.encoder.resolve_binary()?;
        info!("Using encoder {}", binary.display());

        Ok(Self {
            binary,
            encoder: config.encoder.clone(),
            output_dir: config.output.directory.clone(),
        })
    }

    pub fn with_binary<P: Into<PathBuf>>(binary: P, encoder: EncoderConfig) -> Self {
        Self {
            binary: binary.into(),
            encoder,
            output_dir: None,
        }
    }

    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Run `job` on a dedicated task; progress flows through `observer`.
    pub fn spawn(self, job: BatchJob, observer: Arc<dyn BatchObserver>) -> BatchHandle {
        let cancel = CancelHandle::new();
        let worker_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            self.run(&job, observer.as_ref(), worker_cancel).await
        });

        BatchHandle { cancel, task }
    }

    /// Process every file of `job` in order.
    ///
    /// Only an unusable encoder binary is returned as an error; everything
    /// that goes wrong with individual files ends up in the report.
    pub async fn run(
        &self,
        job: &BatchJob,
        observer: &dyn BatchObserver,
        cancel: CancelHandle,
    ) -> Result<BatchReport> {
        if !self.binary.is_file() {
            error!("Encoder binary is missing: {}", self.binary.display());
            return Err(VidtoolsError::EncoderNotFound(self.binary.display().to_string()));
        }

        let inputs = job.effective_inputs();
        info!(
            "Starting batch '{}': {} file(s), estimated {}",
            job.label,
            inputs.len(),
            seconds_to_clock(job.estimated_total_seconds)
        );

        let mut run = BatchRun::new(cancel);
        let mut cancelled = false;

        for (index, source) in inputs.iter().enumerate() {
            if job.fixed_destination.is_none() && !source.is_file() {
                warn!("Skipping missing input: {}", source.display());
                run.record(
                    FileResult {
                        file_index: index,
                        source: source.clone(),
                        destination: None,
                        status: FileStatus::Skipped,
                        exit_code: None,
                        cursor_seconds: 0.0,
                        last_line: None,
                    },
                    observer,
                );
                continue;
            }

            let destination = job.destination_for(source, self.output_dir.as_deref());
            let guard_source = job.fixed_destination.is_none();
            if let Err(e) = prepare_destination(source, &destination, guard_source).await {
                error!("Failed to prepare {}: {}", destination.display(), e);
                run.record(
                    FileResult {
                        file_index: index,
                        source: source.clone(),
                        destination: Some(destination),
                        status: FileStatus::Failed(e.to_string()),
                        exit_code: None,
                        cursor_seconds: 0.0,
                        last_line: None,
                    },
                    observer,
                );
                continue;
            }

            if run.cancel.is_cancelled() {
                info!("Batch '{}' cancelled before {}", job.label, source.display());
                cancelled = true;
                break;
            }

            observer.on_file_started(index, source, &destination);
            let encoded = match self
                .encode_file(job, index, inputs.len(), source, &destination, &run, observer)
                .await
            {
                Ok(encoded) => encoded,
                Err(e) => {
                    error!("Failed to process {}: {}", source.display(), e);
                    EncodeResult {
                        status: FileStatus::Failed(e.to_string()),
                        exit_code: None,
                        cursor_seconds: 0.0,
                        last_line: None,
                    }
                }
            };

            run.completed_seconds += encoded.cursor_seconds;
            log_sizes(source, &destination).await;

            let was_cancelled = encoded.status == FileStatus::Cancelled;
            run.record(
                FileResult {
                    file_index: index,
                    source: source.clone(),
                    destination: Some(destination),
                    status: encoded.status,
                    exit_code: encoded.exit_code,
                    cursor_seconds: encoded.cursor_seconds,
                    last_line: encoded.last_line,
                },
                observer,
            );

            if was_cancelled {
                cancelled = true;
                break;
            }
        }

        let outcome = if cancelled {
            BatchOutcome::Cancelled
        } else if run.any_failure {
            BatchOutcome::CompletedWithFailures
        } else {
            BatchOutcome::Completed
        };
        info!("Batch '{}' finished: {:?}", job.label, outcome);
        observer.on_finished(outcome);

        Ok(BatchReport {
            outcome,
            files: run.files,
            completed_seconds: run.completed_seconds,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn encode_file(
        &self,
        job: &BatchJob,
        index: usize,
        count: usize,
        source: &Path,
        destination: &Path,
        run: &BatchRun,
        observer: &dyn BatchObserver,
    ) -> Result<EncodeResult> {
        let bindings = Bindings::new(
            source.to_string_lossy(),
            destination.to_string_lossy(),
            extension_of(source),
        );
        let command = EncoderCommand::new(&self.binary, job.label.clone())
            .args(self.encoder.fixed_flags.iter().cloned())
            .args(expand(&job.command_template, &bindings));
        info!("Executing: {}", command.command_line());

        let mut encoder = command.spawn_merged()?;
        let mut parser = ProgressParser::new(job.estimated_total_seconds);
        let mut last_line = None;
        let file_label = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        loop {
            let step = tokio::select! {
                biased;
                _ = run.cancel.cancelled() => Step::Cancelled,
                line = encoder.next_line() => match line {
                    Some(line) => Step::Line(line),
                    None => Step::Eof,
                },
            };

            match step {
                Step::Line(line) => {
                    if let Some(observation) = parser.feed(&line) {
                        let destination_bytes = tokio::fs::metadata(destination).await.ok().map(|m| m.len());
                        observer.on_progress(&ProgressUpdate {
                            batch_label: job.label.clone(),
                            file_label: file_label.clone(),
                            file_index: index,
                            file_count: count,
                            file_fraction: observation.file_fraction(),
                            batch_fraction: observation
                                .batch_fraction(run.completed_seconds, job.estimated_total_seconds),
                            cursor_seconds: observation.cursor_seconds,
                            file_total_seconds: observation.total_seconds,
                            completed_seconds: run.completed_seconds,
                            estimated_total_seconds: job.estimated_total_seconds,
                            destination_bytes,
                        });
                    }
                    last_line = Some(line);
                }
                Step::Eof => break,
                Step::Cancelled => {
                    info!("Cancelling encoder for {}", source.display());
                    encoder.kill().await;
                    return Ok(EncodeResult {
                        status: FileStatus::Cancelled,
                        exit_code: None,
                        cursor_seconds: parser.cursor_seconds(),
                        last_line,
                    });
                }
            }
        }

        finish(encoder, parser, last_line, source).await
    }
}

async fn finish(
    mut encoder: RunningEncoder,
    parser: ProgressParser,
    last_line: Option<String>,
    source: &Path,
) -> Result<EncodeResult> {
    let status = encoder.wait().await?;
    let exit_code = status.code();

    let status = if status.success() {
        FileStatus::Succeeded
    } else {
        let diagnostic = last_line.clone().unwrap_or_default();
        error!(
            "Encoder failed on {} ({}): {}",
            source.display(),
            status,
            diagnostic
        );
        FileStatus::Failed(format!("encoder exited with {}: {}", status, diagnostic))
    };

    Ok(EncodeResult {
        status,
        exit_code,
        cursor_seconds: parser.cursor_seconds(),
        last_line,
    })
}

/// Create the destination directory and clear a previous output.
///
/// With `guard_source` the source itself is never removed, even when the
/// destination resolves to it. Fixed-destination jobs walk the destination as
/// their input, so they clear it unconditionally.
async fn prepare_destination(source: &Path, destination: &Path, guard_source: bool) -> Result<()> {
    if let Some(dir) = destination.parent().filter(|d| !d.as_os_str().is_empty()) {
        if !dir.exists() {
            debug!("Creating directory {}", dir.display());
            tokio::fs::create_dir_all(dir).await?;
        }
    }

    if destination.is_file() {
        if guard_source && same_file(source, destination) {
            warn!("Destination is the input itself, leaving it in place: {}", destination.display());
        } else {
            debug!("Removing existing destination {}", destination.display());
            tokio::fs::remove_file(destination).await?;
        }
    }

    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

async fn log_sizes(source: &Path, destination: &Path) {
    if let Ok(meta) = tokio::fs::metadata(source).await {
        debug!("Source {} ({})", source.display(), human_size(meta.len()));
    }
    if let Ok(meta) = tokio::fs::metadata(destination).await {
        debug!("Output {} ({})", destination.display(), human_size(meta.len()));
    }
}
