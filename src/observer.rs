use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Terminal state of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Completed,
    CompletedWithFailures,
    Cancelled,
}

impl BatchOutcome {
    /// Headless exit status: only a batch that finished with failures is an error
    pub fn is_failure(&self) -> bool {
        matches!(self, BatchOutcome::CompletedWithFailures)
    }
}

/// Progress reading forwarded for every measurable encoder line
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub batch_label: String,
    pub file_label: String,
    /// Zero-based position of the file in the batch
    pub file_index: usize,
    pub file_count: usize,
    /// `[0, 1]`
    pub file_fraction: f64,
    /// `[0, 1]`
    pub batch_fraction: f64,
    pub cursor_seconds: f64,
    pub file_total_seconds: f64,
    pub completed_seconds: f64,
    pub estimated_total_seconds: f64,
    /// Size of the destination written so far, when it exists
    pub destination_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Succeeded,
    /// Input did not exist
    Skipped,
    /// Setup error, launch error or non-zero exit
    Failed(String),
    /// Encoder killed by a cancellation request
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileResult {
    pub file_index: usize,
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub status: FileStatus,
    pub exit_code: Option<i32>,
    pub cursor_seconds: f64,
    /// Last encoder line, kept as the diagnostic for failures
    pub last_line: Option<String>,
}

impl FileResult {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, FileStatus::Failed(_) | FileStatus::Skipped)
    }
}

/// Receiver of batch progress.
///
/// Called from the batch worker, so implementations must not block: hand the
/// data to whatever owns the presentation and return.
pub trait BatchObserver: Send + Sync {
    fn on_file_started(&self, _file_index: usize, _source: &Path, _destination: &Path) {}

    fn on_progress(&self, update: &ProgressUpdate);

    fn on_file_finished(&self, _result: &FileResult) {}

    fn on_finished(&self, outcome: BatchOutcome);
}

/// Everything a [`ChannelObserver`] forwards
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    FileStarted {
        file_index: usize,
        source: PathBuf,
        destination: PathBuf,
    },
    Progress(ProgressUpdate),
    FileFinished(FileResult),
    Finished(BatchOutcome),
}

/// Observer that turns every callback into a [`BatchEvent`] on an unbounded channel,
/// so the consumer drains them on its own schedule.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<BatchEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: BatchEvent) {
        // A consumer that went away simply stops listening
        let _ = self.tx.send(event);
    }
}

impl BatchObserver for ChannelObserver {
    fn on_file_started(&self, file_index: usize, source: &Path, destination: &Path) {
        self.send(BatchEvent::FileStarted {
            file_index,
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
        });
    }

    fn on_progress(&self, update: &ProgressUpdate) {
        self.send(BatchEvent::Progress(update.clone()));
    }

    fn on_file_finished(&self, result: &FileResult) {
        self.send(BatchEvent::FileFinished(result.clone()));
    }

    fn on_finished(&self, outcome: BatchOutcome) {
        self.send(BatchEvent::Finished(outcome));
    }
}
