use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::config::EncoderConfig;
use crate::error::{Result, VidtoolsError};
use crate::timecode::parse_clock;
use super::EncoderCommand;

static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Duration:\s*(\d{2,}:\d{2}:\d{2})").expect("valid regex"));
static VIDEO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Video:\s*([^\s,]+)").expect("valid regex"));
static RESOLUTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{2,})x(\d{2,})\b").expect("valid regex"));
static FPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\d.]+)\s+fps").expect("valid regex"));
static AUDIO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Audio:\s*([^\s,]+)").expect("valid regex"));
static SAMPLE_RATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s+Hz").expect("valid regex"));

/// What the encoder banner reveals about an input file
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub duration_seconds: Option<u64>,
    pub video_codec: Option<String>,
    pub resolution: Option<(u32, u32)>,
    pub frame_rate: Option<f64>,
    pub audio_codec: Option<String>,
    pub sample_rate: Option<u32>,
}

/// Scan an `-i <file>` banner. Only the first video and audio streams are described.
pub fn parse_media_info<S: AsRef<str>>(lines: &[S]) -> MediaInfo {
    let mut info = MediaInfo::default();

    for line in lines {
        let line = line.as_ref();

        if info.duration_seconds.is_none() {
            if let Some(caps) = DURATION_RE.captures(line) {
                info.duration_seconds = parse_clock(&caps[1]);
            }
        }

        if info.video_codec.is_none() {
            if let Some(caps) = VIDEO_RE.captures(line) {
                info.video_codec = Some(caps[1].to_string());
                info.resolution = RESOLUTION_RE.captures(line).and_then(|r| {
                    Some((r[1].parse().ok()?, r[2].parse().ok()?))
                });
                info.frame_rate = FPS_RE.captures(line).and_then(|f| f[1].parse().ok());
            }
        }

        if info.audio_codec.is_none() {
            if let Some(caps) = AUDIO_RE.captures(line) {
                info.audio_codec = Some(caps[1].to_string());
                info.sample_rate = SAMPLE_RATE_RE.captures(line).and_then(|h| h[1].parse().ok());
            }
        }
    }

    info
}

/// Probe one file. The encoder exits non-zero when given no output, so the
/// exit status is ignored and only the banner matters.
pub async fn probe(encoder: &EncoderConfig, binary: &Path, path: &Path) -> Result<MediaInfo> {
    if !path.is_file() {
        return Err(VidtoolsError::FileNotFound(path.display().to_string()));
    }

    let command = EncoderCommand::new(binary, format!("Probe {}", path.display()))
        .args(encoder.probe_flags.iter().cloned())
        .input(path);
    let (lines, _status) = command.capture().await?;

    let mut info = parse_media_info(&lines);
    info.path = path.to_path_buf();
    info.size_bytes = tokio::fs::metadata(path).await?.len();
    debug!("Probed {}: {:?}", path.display(), info);

    Ok(info)
}

/// Sum of probed durations. Files that cannot be probed count as zero.
pub async fn estimate_total_seconds(encoder: &EncoderConfig, binary: &Path, paths: &[PathBuf]) -> u64 {
    let mut total = 0;
    for path in paths {
        match probe(encoder, binary, path).await {
            Ok(info) => total += info.duration_seconds.unwrap_or(0),
            Err(e) => warn!("Could not probe {}: {}", path.display(), e),
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANNER: &[&str] = &[
        "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'clip.mp4':",
        "  Duration: 00:02:05.48, start: 0.000000, bitrate: 2185 kb/s",
        "    Stream #0:0(und): Video: h264 (High) (avc1 / 0x31637661), yuv420p, 1920x1080 [SAR 1:1 DAR 16:9], 2051 kb/s, 29.97 fps, 29.97 tbr",
        "    Stream #0:1(und): Audio: aac (LC) (mp4a / 0x6134706D), 48000 Hz, stereo, fltp, 128 kb/s",
        "At least one output file must be specified",
    ];

    #[test]
    fn test_parse_media_info() {
        let info = parse_media_info(BANNER);
        assert_eq!(info.duration_seconds, Some(125));
        assert_eq!(info.video_codec.as_deref(), Some("h264"));
        assert_eq!(info.resolution, Some((1920, 1080)));
        assert_eq!(info.frame_rate, Some(29.97));
        assert_eq!(info.audio_codec.as_deref(), Some("aac"));
        assert_eq!(info.sample_rate, Some(48000));
    }

    #[test]
    fn test_audio_only_banner() {
        let info = parse_media_info(&[
            "  Duration: N/A, bitrate: N/A",
            "    Stream #0:0: Audio: flac, 44100 Hz, stereo, s16",
        ]);
        assert_eq!(info.duration_seconds, None);
        assert_eq!(info.video_codec, None);
        assert_eq!(info.resolution, None);
        assert_eq!(info.sample_rate, Some(44100));
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let result = probe(
            &EncoderConfig::default(),
            Path::new("ffmpeg"),
            Path::new("/no/such/clip.mp4"),
        )
        .await;
        assert!(matches!(result, Err(VidtoolsError::FileNotFound(_))));
    }
}
