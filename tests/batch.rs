#![cfg(unix)]

//! End-to-end batches against a shell script posing as the encoder.
//!
//! Each fake input file drives the script: line 1 is the announced duration
//! (`-` for none), line 2 the exit code (or `hang` to block until killed), and
//! every further line a cursor time printed as a `frame= ... time=` status line.
//! Like ffmpeg without `-y`, the script refuses to overwrite an existing output.

use assert_fs::prelude::*;
use assert_fs::TempDir;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

use vidtools::batch::{BatchController, BatchJob, BatchReport, CancelHandle};
use vidtools::config::EncoderConfig;
use vidtools::observer::{BatchEvent, BatchOutcome, ChannelObserver, FileStatus};

const FAKE_ENCODER: &str = r#"src="$1"
dest="$2"
duration=$(sed -n 1p "$src")
mode=$(sed -n 2p "$src")
if [ -e "$dest" ]; then
  echo "File '$dest' already exists. Exiting." >&2
  exit 1
fi
echo "encoded $src" > "$dest"
echo "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from '$src':" >&2
if [ "$duration" != "-" ]; then
  echo "  Duration: $duration, start: 0.000000, bitrate: 1000 kb/s" >&2
fi
sed -n '3,$p' "$src" | while read -r t; do
  printf 'frame=  100 fps=25 q=28.0 size=     256kB time=%s bitrate= 512.0kbits/s speed=2x\r' "$t" >&2
done
if [ "$mode" = "hang" ]; then
  exec sleep 30
fi
if [ "${mode:-0}" != "0" ]; then
  echo "Conversion failed!" >&2
fi
exit "${mode:-0}"
"#;

fn controller(temp: &TempDir) -> BatchController {
    let script = temp.child("fake-encoder.sh");
    script.write_str(FAKE_ENCODER).unwrap();

    let encoder = EncoderConfig {
        fixed_flags: vec![script.path().to_string_lossy().into_owned()],
        ..EncoderConfig::default()
    };
    BatchController::with_binary("/bin/sh", encoder)
}

fn clip(temp: &TempDir, name: &str, duration: &str, mode: &str, times: &[&str]) -> PathBuf {
    let mut contents = format!("{}\n{}\n", duration, mode);
    for time in times {
        contents.push_str(time);
        contents.push('\n');
    }
    let child = temp.child(name);
    child.write_str(&contents).unwrap();
    child.path().to_path_buf()
}

fn job(label: &str, inputs: Vec<PathBuf>, estimate: f64) -> BatchJob {
    BatchJob::new(label, vec!["${SOURCE}".to_string(), "${DEST}".to_string()])
        .with_inputs(inputs)
        .with_suffix("_out.${EXT}")
        .with_estimate(estimate)
}

async fn run(controller: &BatchController, job: &BatchJob) -> (BatchReport, Vec<BatchEvent>) {
    let (observer, mut rx) = ChannelObserver::new();
    let report = assert_ok!(controller.run(job, &observer, CancelHandle::new()).await);
    drop(observer);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    (report, events)
}

fn output_of(source: &Path) -> PathBuf {
    let stem = source.file_stem().unwrap().to_string_lossy();
    let ext = source.extension().unwrap().to_string_lossy();
    source.with_file_name(format!("{}_out.{}", stem, ext))
}

#[tokio::test]
async fn test_batch_progress_spans_files() {
    let temp = TempDir::new().unwrap();
    let controller = controller(&temp);
    let first = clip(&temp, "first.mov", "00:00:10.00", "0", &["00:00:05.00", "00:00:10.00"]);
    let second = clip(&temp, "second.mov", "00:00:20.00", "0", &["00:00:10.00", "00:00:20.00"]);

    let (report, events) = run(&controller, &job("Converting", vec![first.clone(), second.clone()], 30.0)).await;

    assert_eq!(report.outcome, BatchOutcome::Completed);
    assert_eq!(report.completed_seconds, 30.0);
    assert!(output_of(&first).is_file());
    assert!(output_of(&second).is_file());

    let updates: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::Progress(update) => Some(update),
            _ => None,
        })
        .collect();

    let halfway = updates
        .iter()
        .find(|u| u.file_index == 0 && u.cursor_seconds == 5.0)
        .expect("progress for the first file");
    assert_eq!(halfway.file_fraction, 0.5);
    assert!((halfway.batch_fraction - 5.0 / 30.0).abs() < 1e-9);
    assert_eq!(halfway.file_count, 2);
    assert_eq!(halfway.batch_label, "Converting");
    assert_eq!(halfway.file_label, "first.mov");

    let later = updates
        .iter()
        .find(|u| u.file_index == 1)
        .expect("progress for the second file");
    assert_eq!(later.completed_seconds, 10.0);
    assert_eq!(later.file_fraction, 0.5);
    assert!((later.batch_fraction - 20.0 / 30.0).abs() < 1e-9);

    assert!(updates.iter().all(|u| (0.0..=1.0).contains(&u.batch_fraction)));
    assert_eq!(events.last(), Some(&BatchEvent::Finished(BatchOutcome::Completed)));
}

#[tokio::test]
async fn test_failed_file_does_not_stop_batch() {
    let temp = TempDir::new().unwrap();
    let controller = controller(&temp);
    let inputs = vec![
        clip(&temp, "a.mp4", "00:00:04.00", "0", &["00:00:04.00"]),
        clip(&temp, "b.mp4", "00:00:04.00", "1", &["00:00:02.00"]),
        clip(&temp, "c.mp4", "00:00:04.00", "0", &["00:00:04.00"]),
    ];

    let (report, events) = run(&controller, &job("Converting", inputs.clone(), 12.0)).await;

    assert_eq!(report.outcome, BatchOutcome::CompletedWithFailures);
    assert!(report.outcome.is_failure());
    assert_eq!(report.files.len(), 3);
    assert_eq!(report.files[0].status, FileStatus::Succeeded);
    assert_eq!(report.files[2].status, FileStatus::Succeeded);

    let failed = &report.files[1];
    assert!(matches!(failed.status, FileStatus::Failed(_)));
    assert_eq!(failed.exit_code, Some(1));
    assert_eq!(failed.last_line.as_deref(), Some("Conversion failed!"));

    assert!(output_of(&inputs[0]).is_file());
    assert!(output_of(&inputs[2]).is_file());
    assert_eq!(
        events.last(),
        Some(&BatchEvent::Finished(BatchOutcome::CompletedWithFailures))
    );
}

#[tokio::test]
async fn test_missing_input_is_skipped() {
    let temp = TempDir::new().unwrap();
    let controller = controller(&temp);
    let present = clip(&temp, "present.mkv", "00:00:03.00", "0", &["00:00:03.00"]);
    let missing = temp.path().join("missing.mkv");

    let (report, events) = run(&controller, &job("Converting", vec![missing.clone(), present.clone()], 3.0)).await;

    assert_eq!(report.outcome, BatchOutcome::CompletedWithFailures);
    assert_eq!(report.files[0].status, FileStatus::Skipped);
    assert_eq!(report.files[0].destination, None);
    assert_eq!(report.files[1].status, FileStatus::Succeeded);
    assert!(output_of(&present).is_file());
    assert!(!output_of(&missing).exists());

    let started: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            BatchEvent::FileStarted { file_index, .. } => Some(*file_index),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec![1]);
}

#[tokio::test]
async fn test_output_directory_and_previous_output() {
    let temp = TempDir::new().unwrap();
    let out = temp.child("out");
    let controller = controller(&temp).output_dir(out.path().join("nested"));
    let source = clip(&temp, "clip.avi", "00:00:02.00", "0", &["00:00:02.00"]);

    out.child("nested").create_dir_all().unwrap();
    let stale = out.child("nested").child("clip_out.avi");
    stale.write_str("stale").unwrap();

    let (report, _) = run(&controller, &job("Converting", vec![source.clone()], 2.0)).await;

    assert_eq!(report.outcome, BatchOutcome::Completed);
    assert_eq!(report.files[0].destination.as_deref(), Some(stale.path()));
    let written = std::fs::read_to_string(stale.path()).unwrap();
    assert!(written.starts_with("encoded "));
    assert!(source.is_file());
}

#[tokio::test]
async fn test_fixed_destination_runs_once() {
    let temp = TempDir::new().unwrap();
    let controller = controller(&temp);
    let list = clip(&temp, "list.txt", "00:00:08.00", "0", &["00:00:08.00"]);
    let destination = temp.path().join("joined").join("all.mp4");

    let job = BatchJob::new(
        "Concatenating videos",
        vec![list.to_string_lossy().into_owned(), "${DEST}".to_string()],
    )
    .with_inputs(vec![temp.path().join("a.mp4"), temp.path().join("b.mp4")])
    .with_fixed_destination(&destination)
    .with_estimate(8.0);

    let (report, events) = run(&controller, &job).await;

    assert_eq!(report.outcome, BatchOutcome::Completed);
    assert_eq!(report.files.len(), 1);
    assert!(destination.is_file());
    assert!(events.contains(&BatchEvent::FileStarted {
        file_index: 0,
        source: destination.clone(),
        destination: destination.clone(),
    }));
}

#[tokio::test]
async fn test_rerun_replaces_fixed_destination() {
    let temp = TempDir::new().unwrap();
    let controller = controller(&temp);
    let list = clip(&temp, "list.txt", "00:00:08.00", "0", &["00:00:08.00"]);
    let destination = temp.child("joined.mp4");
    destination.write_str("old output").unwrap();

    let job = BatchJob::new(
        "Concatenating videos",
        vec![list.to_string_lossy().into_owned(), "${DEST}".to_string()],
    )
    .with_inputs(vec![temp.path().join("a.mp4")])
    .with_fixed_destination(destination.path())
    .with_estimate(8.0);

    let (report, _) = run(&controller, &job).await;

    assert_eq!(report.outcome, BatchOutcome::Completed);
    assert_eq!(report.files[0].status, FileStatus::Succeeded);
    let written = std::fs::read_to_string(destination.path()).unwrap();
    assert!(written.starts_with("encoded "));
}

#[tokio::test]
async fn test_unknown_duration_uses_batch_estimate() {
    let temp = TempDir::new().unwrap();
    let controller = controller(&temp);
    let source = clip(&temp, "stream.ts", "N/A", "0", &["00:00:15.00"]);

    let (report, events) = run(&controller, &job("Converting", vec![source], 60.0)).await;

    assert_eq!(report.outcome, BatchOutcome::Completed);
    let update = events
        .iter()
        .find_map(|e| match e {
            BatchEvent::Progress(update) => Some(update),
            _ => None,
        })
        .expect("progress with the estimate as duration");
    assert_eq!(update.file_total_seconds, 60.0);
    assert_eq!(update.file_fraction, 0.25);
    assert_eq!(update.batch_fraction, 0.25);
}

#[tokio::test]
async fn test_silent_encoder_still_succeeds() {
    let temp = TempDir::new().unwrap();
    let controller = controller(&temp);
    let source = clip(&temp, "quiet.wav", "-", "0", &[]);

    let (report, events) = run(&controller, &job("Converting", vec![source.clone()], 10.0)).await;

    assert_eq!(report.outcome, BatchOutcome::Completed);
    assert_eq!(report.files[0].status, FileStatus::Succeeded);
    assert_eq!(report.files[0].cursor_seconds, 0.0);
    assert_eq!(report.completed_seconds, 0.0);
    assert!(output_of(&source).is_file());
    assert!(!events.iter().any(|e| matches!(e, BatchEvent::Progress(_))));
}

#[tokio::test]
async fn test_cancel_kills_running_encoder() {
    let temp = TempDir::new().unwrap();
    let controller = controller(&temp);
    let inputs = vec![
        clip(&temp, "one.mov", "00:00:05.00", "0", &["00:00:05.00"]),
        clip(&temp, "two.mov", "00:01:00.00", "hang", &["00:00:07.00"]),
        clip(&temp, "three.mov", "00:00:05.00", "0", &["00:00:05.00"]),
    ];

    let (observer, mut rx) = ChannelObserver::new();
    let handle = controller.spawn(job("Converting", inputs.clone(), 70.0), Arc::new(observer));

    let mut events = Vec::new();
    let drained = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(event) = rx.recv().await {
            if matches!(&event, BatchEvent::Progress(u) if u.file_index == 1) {
                handle.cancel();
            }
            events.push(event);
        }
    })
    .await;
    assert!(drained.is_ok(), "batch did not stop after cancel");

    let report = assert_ok!(handle.join().await);
    assert_eq!(report.outcome, BatchOutcome::Cancelled);
    assert!(!report.outcome.is_failure());
    assert_eq!(report.files.len(), 2);
    assert_eq!(report.files[1].status, FileStatus::Cancelled);
    assert_eq!(report.completed_seconds, 12.0);

    assert!(!events
        .iter()
        .any(|e| matches!(e, BatchEvent::FileStarted { file_index: 2, .. })));
    assert_eq!(events.last(), Some(&BatchEvent::Finished(BatchOutcome::Cancelled)));

    // partial output stays where the encoder left it
    assert!(output_of(&inputs[1]).is_file());
    assert!(!output_of(&inputs[2]).exists());
}

#[tokio::test]
async fn test_cancel_before_start_launches_nothing() {
    let temp = TempDir::new().unwrap();
    let controller = controller(&temp);
    let source = clip(&temp, "clip.mov", "00:00:05.00", "0", &["00:00:05.00"]);

    let cancel = CancelHandle::new();
    cancel.cancel();
    let (observer, mut rx) = ChannelObserver::new();
    let report = assert_ok!(controller.run(&job("Converting", vec![source.clone()], 5.0), &observer, cancel).await);
    drop(observer);

    assert_eq!(report.outcome, BatchOutcome::Cancelled);
    assert!(report.files.is_empty());
    assert!(!output_of(&source).exists());
    assert_eq!(rx.recv().await, Some(BatchEvent::Finished(BatchOutcome::Cancelled)));
    assert_eq!(rx.recv().await, None);
}
