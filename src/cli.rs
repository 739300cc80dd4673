use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Total duration of the batch (HH:MM:SS) instead of probing the inputs
    #[arg(long, global = true)]
    pub estimate: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert files to another video or audio format
    Convert {
        /// Target format (h264, h265, vp8, vp9, mp3, aac, flac, ogg)
        #[arg(long)]
        codec: String,

        /// Input files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Join files, in the given order, into a single output
    Concat {
        /// Target format of the joined file
        #[arg(long, default_value = "h264")]
        codec: String,

        /// Output file (default: concatenated.mp4 next to the first input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Input files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Cut an interval out of a file
    Extract {
        /// Start time (HH:MM:SS)
        #[arg(long, default_value = "00:00:00")]
        start: String,

        /// End time (HH:MM:SS)
        #[arg(long)]
        end: String,

        /// Input file
        input: PathBuf,
    },

    /// Keep only a rectangular region of the picture
    Crop {
        #[arg(long)]
        width: u32,

        #[arg(long)]
        height: u32,

        /// Left edge of the region
        #[arg(short, long, default_value = "0")]
        x: u32,

        /// Top edge of the region
        #[arg(short, long, default_value = "0")]
        y: u32,

        /// Input files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Stabilize shaky footage (needs an encoder built with libvidstab)
    Deshake {
        /// How shaky the footage is (1-10)
        #[arg(long, default_value = "3")]
        shakiness: u8,

        /// Zoom applied to hide moving borders, in pixels (1-10)
        #[arg(long, default_value = "6")]
        zoom: u8,

        /// Directory for the motion vector files (default: next to each input)
        #[arg(long)]
        vectors: Option<PathBuf>,

        /// Input files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Scale the picture to a new resolution
    Resize {
        /// New size, e.g. 1280x720
        #[arg(long)]
        size: String,

        /// Input files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Rotate or flip the picture
    Rotate {
        /// cw, ccw, 180, ccw-flip, cw-flip, hflip or vflip
        #[arg(long)]
        rotation: String,

        /// Input files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Run a custom argument template over the inputs
    ///
    /// The template follows `--` and may use ${SOURCE}, ${DEST} and ${EXT}.
    Run {
        /// Input files
        #[arg(short, long)]
        inputs: Vec<PathBuf>,

        /// Output name suffix, may contain ${EXT}
        #[arg(long)]
        suffix: Option<String>,

        /// Single output file; turns the batch into one job
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Label shown in progress output
        #[arg(long, default_value = "Custom job")]
        label: String,

        /// Encoder arguments
        #[arg(last = true, required = true)]
        template: Vec<String>,
    },

    /// List the encoder's compile-time features
    Features {
        /// Only check for one token, e.g. --enable-libx265; exits non-zero when absent
        #[arg(long, allow_hyphen_values = true)]
        has: Option<String>,
    },

    /// Show duration, streams and size of media files
    Probe {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Input files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Write a configuration file with default values
    InitConfig {
        /// Destination path
        #[arg(default_value = "vidtools.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
