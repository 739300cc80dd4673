use thiserror::Error;

#[derive(Error, Debug)]
pub enum VidtoolsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Encoder not found: {0}")]
    EncoderNotFound(String),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Encoder build does not support: {0}")]
    UnsupportedFeature(String),

    #[error("Batch worker error: {0}")]
    Worker(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, VidtoolsError>;
