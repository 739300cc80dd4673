use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, VidtoolsError};
use super::stream::{pump_lines, LINE_CHANNEL_CAPACITY};

/// Encoder invocation: binary plus ordered arguments.
///
/// Also doubles as a template builder when the arguments carry `${SOURCE}` /
/// `${DEST}` placeholders instead of real paths.
#[derive(Debug, Clone)]
pub struct EncoderCommand {
    pub binary_path: PathBuf,
    pub args: Vec<String>,
    pub description: String,
}

impl EncoderCommand {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(binary_path: P, description: S) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Start an argument list with no binary attached
    pub fn template<S: Into<String>>(description: S) -> Self {
        Self::new(PathBuf::new(), description)
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Add video filter
    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    /// Allow experimental encoders (older builds gate the native AAC encoder behind this)
    pub fn allow_experimental(self) -> Self {
        self.arg("-strict").arg("-2")
    }

    /// Highest quality for quantizer-driven encoders
    pub fn max_quality(self) -> Self {
        self.arg("-q:a").arg("0").arg("-q:v").arg("0")
    }

    pub fn command_line(&self) -> String {
        let mut line = self.binary_path.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Launch with stdout and stderr merged into one line stream
    pub fn spawn_merged(&self) -> Result<RunningEncoder> {
        debug!("Executing encoder command: {}", self.command_line());
        debug!("Description: {}", self.description);

        let mut child = Command::new(&self.binary_path)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VidtoolsError::Encoder(format!(
                "Failed to launch {}: {}",
                self.binary_path.display(),
                e
            )))?;

        let (tx, lines) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines(stderr, tx));
        }

        Ok(RunningEncoder { child, lines })
    }

    /// Run to completion and return every merged output line with the exit status
    pub async fn capture(&self) -> Result<(Vec<String>, ExitStatus)> {
        let mut running = self.spawn_merged()?;
        let mut collected = Vec::new();
        while let Some(line) = running.next_line().await {
            collected.push(line);
        }
        let status = running.wait().await?;
        Ok((collected, status))
    }
}

/// A launched encoder whose merged output is being read line by line
pub struct RunningEncoder {
    child: Child,
    lines: mpsc::Receiver<String>,
}

impl RunningEncoder {
    /// Next output line, `None` once both streams have closed
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    pub async fn wait(&mut self) -> Result<ExitStatus> {
        Ok(self.child.wait().await?)
    }

    /// Forcefully terminate and reap the child. A child that already exited is not an error.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!("Encoder already gone when killing: {}", e);
        }
        if let Err(e) = self.child.wait().await {
            debug!("Failed to reap killed encoder: {}", e);
        }
        self.lines.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{DEST, SOURCE};

    #[test]
    fn test_template_builder() {
        let cmd = EncoderCommand::template("Crop")
            .input(SOURCE)
            .video_filter("crop=640:480:0:0")
            .allow_experimental()
            .output(DEST);
        assert_eq!(
            cmd.args,
            vec!["-i", "${SOURCE}", "-vf", "crop=640:480:0:0", "-strict", "-2", "${DEST}"]
        );
    }

    #[test]
    fn test_command_line() {
        let cmd = EncoderCommand::new("ffmpeg", "Version").arg("-version");
        assert_eq!(cmd.command_line(), "ffmpeg -version");
    }

    #[tokio::test]
    async fn test_launch_failure_is_encoder_error() {
        let cmd = EncoderCommand::new("/definitely/not/here/ffmpeg", "Missing");
        assert!(matches!(cmd.spawn_merged(), Err(VidtoolsError::Encoder(_))));
    }
}
