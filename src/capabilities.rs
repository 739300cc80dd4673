use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::LazyLock;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::Result;
use crate::media::EncoderCommand;

static FEATURE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--enable-[^\s]+|disable-[^\s]+").expect("valid regex"));

/// Source of the encoder's self-report banner
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BannerSource: Send + Sync {
    async fn banner(&self) -> Result<Vec<String>>;
}

/// Runs the encoder with no arguments; ffmpeg prints its build configuration and exits.
pub struct EncoderBanner {
    binary: PathBuf,
}

impl EncoderBanner {
    pub fn new<P: Into<PathBuf>>(binary: P) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl BannerSource for EncoderBanner {
    async fn banner(&self) -> Result<Vec<String>> {
        let command = EncoderCommand::new(&self.binary, "Capability probe");
        let (lines, status) = command.capture().await?;
        debug!("Capability probe exited with {}", status);
        Ok(lines)
    }
}

/// Compile-time feature tokens reported by the encoder build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityFlags {
    tokens: BTreeSet<String>,
}

impl CapabilityFlags {
    pub fn from_lines<S: AsRef<str>>(lines: &[S]) -> Self {
        let tokens = lines
            .iter()
            .filter(|line| line.as_ref().contains("--"))
            .flat_map(|line| {
                FEATURE_RE
                    .find_iter(line.as_ref())
                    .map(|m| m.as_str().to_string())
                    .collect::<Vec<_>>()
            })
            .collect();
        Self { tokens }
    }

    pub fn has(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for CapabilityFlags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Probes the encoder once and keeps the answer for the life of the detector.
///
/// A failed probe is not cached; the next query tries again.
pub struct CapabilityDetector {
    source: Box<dyn BannerSource>,
    flags: OnceCell<CapabilityFlags>,
}

impl CapabilityDetector {
    pub fn new(source: Box<dyn BannerSource>) -> Self {
        Self {
            source,
            flags: OnceCell::new(),
        }
    }

    pub fn for_binary<P: Into<PathBuf>>(binary: P) -> Self {
        Self::new(Box::new(EncoderBanner::new(binary)))
    }

    pub async fn flags(&self) -> Result<&CapabilityFlags> {
        self.flags
            .get_or_try_init(|| async {
                let lines = self.source.banner().await?;
                let flags = CapabilityFlags::from_lines(&lines);
                info!("Encoder reports {} capability tokens", flags.len());
                Ok(flags)
            })
            .await
    }

    pub async fn has_feature(&self, token: &str) -> Result<bool> {
        Ok(self.flags().await?.has(token))
    }
}
