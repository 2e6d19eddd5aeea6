//! Quality tiers and the closed set of media signatures they resolve to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Configured quality tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Quality {
    #[default]
    Lossless,
    High,
    Medium,
    /// Segmented HLS stream, available without a download entitlement.
    MediumHls,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lossless => "lossless",
            Self::High => "high",
            Self::Medium => "medium",
            Self::MediumHls => "medium-hls",
        }
    }

    /// The tier that always goes through the segmented transfer.
    pub fn is_segmented(&self) -> bool {
        matches!(self, Self::MediumHls)
    }
}

impl FromStr for Quality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lossless" => Ok(Self::Lossless),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "medium-hls" => Ok(Self::MediumHls),
            other => Err(Error::validation(format!(
                "unknown quality `{other}`, expected lossless, high, medium or medium-hls"
            ))),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container and bitrate of the bits actually delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaSignature {
    Aac128,
    Aac256,
    Flac,
    /// AAC 128 kbps reassembled from the HLS stream.
    Aac128Hls,
}

impl MediaSignature {
    /// Classify the `stream_quality` of a download descriptor.
    ///
    /// Unknown signatures are rejected, never guessed.
    pub fn classify(signature: &str) -> Result<Self> {
        match signature {
            ".128k.aac.mp4" => Ok(Self::Aac128),
            ".256k.aac.mp4" => Ok(Self::Aac256),
            ".flac" => Ok(Self::Flac),
            other => Err(Error::UnknownSignature(other.to_string())),
        }
    }

    /// Extension of the final file, dot included.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Flac => ".flac",
            Self::Aac128 | Self::Aac256 | Self::Aac128Hls => ".m4a",
        }
    }

    /// Container format key used to select a tag mapping table.
    pub fn format(&self) -> &'static str {
        match self {
            Self::Flac => "flac",
            Self::Aac128 | Self::Aac256 | Self::Aac128Hls => "m4a",
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            Self::Aac128 => "AAC 128kbps",
            Self::Aac256 => "AAC 256kbps",
            Self::Flac => "FLAC",
            Self::Aac128Hls => "AAC 128kbps - HLS",
        }
    }
}

impl fmt::Display for MediaSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display())
    }
}
