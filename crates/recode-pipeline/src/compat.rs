//! Format-pair compatibility table.
//!
//! Decides, per (input, output) pair, whether the conversion can be wired
//! through the encoder's standard streams or must go through the file-based
//! path. The check is pure and runs before any subprocess is spawned.

use recode_core::models::MediaFormat;
use serde::Serialize;

/// Outcome of the compatibility check for one format pair.
#[derive(Debug, Clone, Serialize)]
pub struct Compatibility {
    pub supports_streaming: bool,
    /// Human-readable reason when streaming is not supported.
    pub reason: Option<String>,
    pub fallback_recommended: bool,
}

/// Formats the encoder cannot reliably read from a pipe. Seek-dependent
/// containers make the demuxer rewind to locate sample tables or stream
/// metadata, which a pipe cannot satisfy.
fn input_needs_seek(format: MediaFormat) -> bool {
    matches!(
        format,
        MediaFormat::M4a | MediaFormat::Mp4 | MediaFormat::Flac
    )
}

/// Formats whose muxer writes a trailing index (moov atom) and therefore
/// needs a seekable output.
fn output_needs_seek(format: MediaFormat) -> bool {
    matches!(format, MediaFormat::M4a | MediaFormat::Mp4)
}

/// Looks up whether an (input, output) pair is eligible for the streaming
/// path. Non-streamable pairs carry a reason and recommend the fallback.
pub fn check_compatibility(input: MediaFormat, output: MediaFormat) -> Compatibility {
    if input_needs_seek(input) {
        return Compatibility {
            supports_streaming: false,
            reason: Some(format!(
                "{} input requires a seekable source and cannot be read from a pipe",
                input
            )),
            fallback_recommended: true,
        };
    }

    if output_needs_seek(output) {
        return Compatibility {
            supports_streaming: false,
            reason: Some(format!(
                "{} output writes a trailing index and requires a seekable destination",
                output
            )),
            fallback_recommended: true,
        };
    }

    Compatibility {
        supports_streaming: true,
        reason: None,
        fallback_recommended: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mp3_to_wav_streams() {
        let compat = check_compatibility(MediaFormat::Mp3, MediaFormat::Wav);
        assert!(compat.supports_streaming);
        assert!(compat.reason.is_none());
        assert!(!compat.fallback_recommended);
    }

    #[test]
    fn test_flac_input_does_not_stream() {
        let compat = check_compatibility(MediaFormat::Flac, MediaFormat::Wav);
        assert!(!compat.supports_streaming);
        assert!(compat.fallback_recommended);
        assert!(compat.reason.unwrap().contains("flac"));
    }

    #[test]
    fn test_seek_dependent_outputs_do_not_stream() {
        for output in [MediaFormat::M4a, MediaFormat::Mp4] {
            let compat = check_compatibility(MediaFormat::Mp3, output);
            assert!(!compat.supports_streaming);
            assert!(compat.fallback_recommended);
            assert!(compat.reason.is_some());
        }
    }

    #[test]
    fn test_ogg_to_mp3_streams() {
        let compat = check_compatibility(MediaFormat::Ogg, MediaFormat::Mp3);
        assert!(compat.supports_streaming);
    }
}
