use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{Result, VidtoolsError};

fn default_fixed_flags() -> Vec<String> {
    vec!["-hide_banner".to_string()]
}

fn default_log_directory() -> PathBuf {
    PathBuf::from(".vidtools").join("log")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Path to the ffmpeg binary, or a bare name looked up on PATH
    pub binary_path: String,
    /// Flags placed before the expanded template on every invocation
    #[serde(default = "default_fixed_flags")]
    pub fixed_flags: Vec<String>,
    /// Flags placed before `-i <file>` when probing media
    #[serde(default = "default_fixed_flags")]
    pub probe_flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory receiving the daily rolling log file
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// When set, suffix-derived destinations land here instead of next to the input
    pub directory: Option<PathBuf>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            fixed_flags: default_fixed_flags(),
            probe_flags: default_fixed_flags(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VidtoolsError::Config(format!("Failed to read config file: {}", e)))?;

        Ok(toml::from_str(&content)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| VidtoolsError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| VidtoolsError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}

impl EncoderConfig {
    /// Resolve `binary_path` to an existing executable.
    ///
    /// A value containing a path separator must point at an executable file; a
    /// bare name is searched on `PATH`.
    pub fn resolve_binary(&self) -> Result<PathBuf> {
        which::which(&self.binary_path).map_err(|e| {
            VidtoolsError::EncoderNotFound(format!("{} ({})", self.binary_path, e))
        })
    }
}
