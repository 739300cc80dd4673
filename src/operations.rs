// Catalogue of encoder operations offered to callers
//
// Each builder returns a BatchJob with the command template and destination
// suffix filled in; the caller adds inputs and the progress estimate.
// Operations that need an optional encoder feature take the detected
// CapabilityFlags and refuse to build when the token is missing.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::batch::BatchJob;
use crate::capabilities::CapabilityFlags;
use crate::error::{Result, VidtoolsError};
use crate::media::EncoderCommand;
use crate::template::{DEST, SOURCE};
use crate::timecode::{parse_clock, seconds_to_clock};

pub const FEATURE_VIDSTAB: &str = "--enable-libvidstab";

/// Target formats for conversion and concatenation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecPreset {
    H264,
    H265,
    Vp8,
    Vp9,
    Mp3,
    Aac,
    Flac,
    Ogg,
}

impl CodecPreset {
    pub const ALL: [CodecPreset; 8] = [
        CodecPreset::H264,
        CodecPreset::H265,
        CodecPreset::Vp8,
        CodecPreset::Vp9,
        CodecPreset::Mp3,
        CodecPreset::Aac,
        CodecPreset::Flac,
        CodecPreset::Ogg,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CodecPreset::H264 => "h264",
            CodecPreset::H265 => "h265",
            CodecPreset::Vp8 => "vp8",
            CodecPreset::Vp9 => "vp9",
            CodecPreset::Mp3 => "mp3",
            CodecPreset::Aac => "aac",
            CodecPreset::Flac => "flac",
            CodecPreset::Ogg => "ogg",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CodecPreset::H264 => "Video H264",
            CodecPreset::H265 => "Video H265",
            CodecPreset::Vp8 => "Video VP8",
            CodecPreset::Vp9 => "Video VP9",
            CodecPreset::Mp3 => "Extract audio - MP3",
            CodecPreset::Aac => "Extract audio - AAC",
            CodecPreset::Flac => "Extract audio - FLAC",
            CodecPreset::Ogg => "Extract audio - Ogg Vorbis",
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(
            self,
            CodecPreset::H264 | CodecPreset::H265 | CodecPreset::Vp8 | CodecPreset::Vp9
        )
    }

    /// Encoder arguments placed between the input and the output
    pub fn arguments(&self) -> Vec<String> {
        let cmd = EncoderCommand::template(self.description());
        let cmd = match self {
            CodecPreset::H264 => cmd.video_codec("libx264").arg("-acodec").arg("aac").allow_experimental(),
            CodecPreset::H265 => cmd.video_codec("libx265").arg("-acodec").arg("aac").allow_experimental(),
            CodecPreset::Vp8 => cmd.video_codec("libvpx").arg("-b:v").arg("1M").audio_codec("libvorbis"),
            CodecPreset::Vp9 => cmd.video_codec("libvpx-vp9").arg("-b:v").arg("2M").audio_codec("libopus"),
            CodecPreset::Mp3 => cmd.no_video().arg("-f").arg("mp3").arg("-ab").arg("192000"),
            CodecPreset::Aac => cmd.no_video().arg("-acodec").arg("aac").allow_experimental(),
            CodecPreset::Flac => cmd.no_video().arg("-acodec").arg("flac"),
            CodecPreset::Ogg => cmd.no_video().arg("-acodec").arg("libvorbis"),
        };
        cmd.args
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            CodecPreset::H264 => "_H264.mp4",
            CodecPreset::H265 => "_H265.mp4",
            CodecPreset::Vp8 => "_VP8.webm",
            CodecPreset::Vp9 => "_VP9.webm",
            CodecPreset::Mp3 => "_MP3.mp3",
            CodecPreset::Aac => "_AAC.m4a",
            CodecPreset::Flac => "_FLAC.flac",
            CodecPreset::Ogg => "_Vorbis.ogg",
        }
    }

    /// Capability token the encoder build must report, if any
    pub fn required_feature(&self) -> Option<&'static str> {
        match self {
            CodecPreset::H264 => Some("--enable-libx264"),
            CodecPreset::H265 => Some("--enable-libx265"),
            CodecPreset::Vp8 | CodecPreset::Vp9 => Some("--enable-libvpx"),
            CodecPreset::Mp3 => Some("--enable-libmp3lame"),
            CodecPreset::Ogg => Some("--enable-libvorbis"),
            CodecPreset::Aac | CodecPreset::Flac => None,
        }
    }

    pub fn is_available(&self, flags: &CapabilityFlags) -> bool {
        self.required_feature().is_none_or(|token| flags.has(token))
    }

    fn ensure_available(&self, flags: &CapabilityFlags) -> Result<()> {
        match self.required_feature() {
            Some(token) if !flags.has(token) => Err(VidtoolsError::UnsupportedFeature(format!(
                "{} requires {}",
                self.description(),
                token
            ))),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for CodecPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CodecPreset {
    type Err = VidtoolsError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        CodecPreset::ALL
            .into_iter()
            .find(|preset| preset.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = CodecPreset::ALL.iter().map(|p| p.name()).collect();
                VidtoolsError::InvalidArgument(format!(
                    "Unknown codec '{}'. Valid codecs: {}",
                    s,
                    names.join(", ")
                ))
            })
    }
}

/// Presets this encoder build can actually run
pub fn available_presets(flags: &CapabilityFlags) -> Vec<CodecPreset> {
    CodecPreset::ALL
        .into_iter()
        .filter(|preset| preset.is_available(flags))
        .collect()
}

/// Re-encode each input with `preset`
pub fn convert(preset: CodecPreset, flags: &CapabilityFlags) -> Result<BatchJob> {
    preset.ensure_available(flags)?;

    let template = EncoderCommand::template(preset.description())
        .input(SOURCE)
        .args(preset.arguments())
        .output(DEST);

    Ok(BatchJob::new(format!("Converting to {}", preset.description()), template.args)
        .with_suffix(preset.suffix()))
}

/// Input list for the concat demuxer, kept on disk for as long as this value lives
pub struct ConcatList {
    file: NamedTempFile,
}

impl ConcatList {
    pub fn write(inputs: &[PathBuf]) -> Result<Self> {
        let mut file = NamedTempFile::new()?;
        file.write_all(concat_list_contents(inputs).as_bytes())?;
        file.flush()?;
        debug!("Wrote concat list with {} entries to {}", inputs.len(), file.path().display());
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// `file '<path>'` lines; single quotes inside paths are escaped for the concat demuxer
pub fn concat_list_contents(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|path| format!("file '{}'\n", path.to_string_lossy().replace('\'', r"'\''")))
        .collect()
}

/// Join every file named in `list` into `destination`
pub fn concatenate(
    list: &ConcatList,
    destination: &Path,
    preset: CodecPreset,
    flags: &CapabilityFlags,
) -> Result<BatchJob> {
    preset.ensure_available(flags)?;

    let template = EncoderCommand::template("Concatenate")
        .arg("-f").arg("concat")
        .arg("-safe").arg("0")
        .input(list.path())
        .args(preset.arguments())
        .output(DEST);

    Ok(BatchJob::new("Concatenating videos", template.args).with_fixed_destination(destination))
}

/// Cut `[start, end)` out of each input; both bounds are `HH:MM:SS`
pub fn extract_interval(start: &str, end: &str) -> Result<BatchJob> {
    let from = parse_clock(start)
        .ok_or_else(|| VidtoolsError::InvalidArgument(format!("Invalid start time '{}'", start)))?;
    let to = parse_clock(end)
        .ok_or_else(|| VidtoolsError::InvalidArgument(format!("Invalid end time '{}'", end)))?;
    if to <= from {
        return Err(VidtoolsError::InvalidArgument(format!(
            "End time {} must be after start time {}",
            end, start
        )));
    }

    let template = EncoderCommand::template("Extract interval")
        .input(SOURCE)
        .arg("-ss").arg(seconds_to_clock(from as f64))
        .arg("-t").arg(seconds_to_clock((to - from) as f64))
        .allow_experimental()
        .output(DEST);

    Ok(BatchJob::new("Extracting an interval of the video", template.args)
        .with_suffix("_section.${EXT}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

pub fn crop(region: CropRegion) -> BatchJob {
    let template = EncoderCommand::template("Crop")
        .input(SOURCE)
        .video_filter(format!(
            "crop={}:{}:{}:{}",
            region.width, region.height, region.x, region.y
        ))
        .allow_experimental()
        .output(DEST);

    BatchJob::new("Extracting a region of the video", template.args).with_suffix("_cropped.${EXT}")
}

/// Two passes: motion analysis into `vectors`, then the stabilizing transform
pub fn deshake(
    shakiness: u8,
    zoom: u8,
    vectors: &Path,
    flags: &CapabilityFlags,
) -> Result<Vec<BatchJob>> {
    if !flags.has(FEATURE_VIDSTAB) {
        return Err(VidtoolsError::UnsupportedFeature(format!(
            "Stabilization requires {}",
            FEATURE_VIDSTAB
        )));
    }
    if !(1..=10).contains(&shakiness) {
        return Err(VidtoolsError::InvalidArgument(format!(
            "Shakiness must be between 1 and 10, got {}",
            shakiness
        )));
    }
    if !(1..=10).contains(&zoom) {
        return Err(VidtoolsError::InvalidArgument(format!(
            "Zoom must be between 1 and 10, got {}",
            zoom
        )));
    }

    let vectors = vectors.to_string_lossy();
    let detect = EncoderCommand::template("Stabilization analysis")
        .input(SOURCE)
        .video_filter(format!(
            "vidstabdetect=stepsize=6:shakiness={}:result={}",
            shakiness, vectors
        ))
        .arg("-f").arg("null")
        .arg("-");
    let transform = EncoderCommand::template("Stabilization transform")
        .input(SOURCE)
        .video_filter(format!(
            "vidstabtransform=input={}:zoom={}:smoothing=30,unsharp=5:5:0.8:3:3:0.4",
            vectors, zoom
        ))
        .allow_experimental()
        .output(DEST);

    Ok(vec![
        BatchJob::new("Computing stabilization vectors", detect.args),
        BatchJob::new("Stabilizing the video", transform.args).with_suffix("_stab.${EXT}"),
    ])
}

/// Parse `WxH`, e.g. `1280x720`
pub fn parse_resolution(text: &str) -> Result<(u32, u32)> {
    let invalid = || {
        VidtoolsError::InvalidArgument(format!(
            "Invalid resolution '{}', expected a size like 800x600",
            text
        ))
    };
    let (w, h) = text.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
    let width: u32 = w.parse().map_err(|_| invalid())?;
    let height: u32 = h.parse().map_err(|_| invalid())?;
    if width == 0 || height == 0 {
        return Err(invalid());
    }
    Ok((width, height))
}

pub fn resize(size: &str) -> Result<BatchJob> {
    let (width, height) = parse_resolution(size)?;
    let template = EncoderCommand::template("Resize")
        .input(SOURCE)
        .video_filter(format!("scale=w={}:h={}", width, height))
        .max_quality()
        .allow_experimental()
        .output(DEST);

    Ok(BatchJob::new("Resizing the video", template.args).with_suffix("_resized.${EXT}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Clockwise,
    CounterClockwise,
    HalfTurn,
    CounterClockwiseFlip,
    ClockwiseFlip,
    FlipHorizontal,
    FlipVertical,
}

impl Rotation {
    pub const ALL: [Rotation; 7] = [
        Rotation::Clockwise,
        Rotation::CounterClockwise,
        Rotation::HalfTurn,
        Rotation::CounterClockwiseFlip,
        Rotation::ClockwiseFlip,
        Rotation::FlipHorizontal,
        Rotation::FlipVertical,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Rotation::Clockwise => "cw",
            Rotation::CounterClockwise => "ccw",
            Rotation::HalfTurn => "180",
            Rotation::CounterClockwiseFlip => "ccw-flip",
            Rotation::ClockwiseFlip => "cw-flip",
            Rotation::FlipHorizontal => "hflip",
            Rotation::FlipVertical => "vflip",
        }
    }

    pub fn filter(&self) -> &'static str {
        match self {
            Rotation::Clockwise => "transpose=1",
            Rotation::CounterClockwise => "transpose=2",
            Rotation::HalfTurn => "transpose=2,transpose=2",
            Rotation::CounterClockwiseFlip => "transpose=0",
            Rotation::ClockwiseFlip => "transpose=3",
            Rotation::FlipHorizontal => "hflip",
            Rotation::FlipVertical => "vflip",
        }
    }
}

impl FromStr for Rotation {
    type Err = VidtoolsError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Rotation::ALL
            .into_iter()
            .find(|rotation| rotation.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Rotation::ALL.iter().map(|r| r.name()).collect();
                VidtoolsError::InvalidArgument(format!(
                    "Unknown rotation '{}'. Valid rotations: {}",
                    s,
                    names.join(", ")
                ))
            })
    }
}

pub fn rotate(rotation: Rotation) -> BatchJob {
    let template = EncoderCommand::template("Rotate")
        .input(SOURCE)
        .video_filter(rotation.filter())
        .max_quality()
        .allow_experimental()
        .output(DEST);

    BatchJob::new("Rotating the video", template.args).with_suffix("_rotated.${EXT}")
}
