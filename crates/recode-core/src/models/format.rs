use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::error::ConvertError;

/// Media formats the encoder subprocess supports as conversion endpoints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Mp3,
    Wav,
    Flac,
    Ogg,
    Aac,
    M4a,
    Mp4,
    Webm,
}

impl Display for MediaFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaFormat::Mp3 => write!(f, "mp3"),
            MediaFormat::Wav => write!(f, "wav"),
            MediaFormat::Flac => write!(f, "flac"),
            MediaFormat::Ogg => write!(f, "ogg"),
            MediaFormat::Aac => write!(f, "aac"),
            MediaFormat::M4a => write!(f, "m4a"),
            MediaFormat::Mp4 => write!(f, "mp4"),
            MediaFormat::Webm => write!(f, "webm"),
        }
    }
}

impl FromStr for MediaFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp3" => Ok(MediaFormat::Mp3),
            "wav" => Ok(MediaFormat::Wav),
            "flac" => Ok(MediaFormat::Flac),
            "ogg" => Ok(MediaFormat::Ogg),
            "aac" => Ok(MediaFormat::Aac),
            "m4a" => Ok(MediaFormat::M4a),
            "mp4" => Ok(MediaFormat::Mp4),
            "webm" => Ok(MediaFormat::Webm),
            other => Err(ConvertError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl MediaFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            MediaFormat::Mp3 => "audio/mpeg",
            MediaFormat::Wav => "audio/wav",
            MediaFormat::Flac => "audio/flac",
            MediaFormat::Ogg => "audio/ogg",
            MediaFormat::Aac => "audio/aac",
            MediaFormat::M4a => "audio/mp4",
            MediaFormat::Mp4 => "video/mp4",
            MediaFormat::Webm => "video/webm",
        }
    }

    /// The ffmpeg muxer name for `-f` when writing to a pipe, where the
    /// format cannot be inferred from a file extension.
    pub fn muxer(&self) -> &'static str {
        match self {
            MediaFormat::Mp3 => "mp3",
            MediaFormat::Wav => "wav",
            MediaFormat::Flac => "flac",
            MediaFormat::Ogg => "ogg",
            MediaFormat::Aac => "adts",
            MediaFormat::M4a => "ipod",
            MediaFormat::Mp4 => "mp4",
            MediaFormat::Webm => "webm",
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, MediaFormat::Mp4 | MediaFormat::Webm)
    }

    pub fn extension(&self) -> &'static str {
        // Display already matches the conventional file extension.
        self.muxer_extension()
    }

    fn muxer_extension(&self) -> &'static str {
        match self {
            MediaFormat::Mp3 => "mp3",
            MediaFormat::Wav => "wav",
            MediaFormat::Flac => "flac",
            MediaFormat::Ogg => "ogg",
            MediaFormat::Aac => "aac",
            MediaFormat::M4a => "m4a",
            MediaFormat::Mp4 => "mp4",
            MediaFormat::Webm => "webm",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_round_trip() {
        for fmt in [
            MediaFormat::Mp3,
            MediaFormat::Wav,
            MediaFormat::Flac,
            MediaFormat::Ogg,
            MediaFormat::Aac,
            MediaFormat::M4a,
            MediaFormat::Mp4,
            MediaFormat::Webm,
        ] {
            assert_eq!(fmt.to_string().parse::<MediaFormat>().unwrap(), fmt);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("MP3".parse::<MediaFormat>().unwrap(), MediaFormat::Mp3);
    }

    #[test]
    fn test_unknown_format_rejected() {
        let err = "xyz".parse::<MediaFormat>().unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_video_classification() {
        assert!(MediaFormat::Mp4.is_video());
        assert!(MediaFormat::Webm.is_video());
        assert!(!MediaFormat::Flac.is_video());
    }
}
