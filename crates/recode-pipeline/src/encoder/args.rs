use std::path::Path;

use recode_core::models::MediaFormat;

/// Audio codec for a target format.
fn audio_codec(format: MediaFormat) -> &'static str {
    match format {
        MediaFormat::Mp3 => "libmp3lame",
        MediaFormat::Wav => "pcm_s16le",
        MediaFormat::Flac => "flac",
        MediaFormat::Ogg => "libvorbis",
        MediaFormat::Aac | MediaFormat::M4a | MediaFormat::Mp4 => "aac",
        MediaFormat::Webm => "libopus",
    }
}

fn push_codec_args(args: &mut Vec<String>, output: MediaFormat, bitrate_kbps: Option<u32>) {
    if output.is_video() {
        let video_codec = match output {
            MediaFormat::Mp4 => "libx264",
            _ => "libvpx-vp9",
        };
        args.extend_from_slice(&["-c:v".to_string(), video_codec.to_string()]);
    } else {
        args.extend_from_slice(&["-vn".to_string()]);
    }

    args.extend_from_slice(&["-acodec".to_string(), audio_codec(output).to_string()]);

    if let Some(kbps) = bitrate_kbps {
        args.extend_from_slice(&["-b:a".to_string(), format!("{}k", kbps)]);
    }
}

/// Arguments for the streaming mode: input from stdin, output to stdout.
/// The muxer must be named explicitly because a pipe has no file
/// extension to infer it from.
pub fn build_streaming_args(output: MediaFormat, bitrate_kbps: Option<u32>) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-i".to_string(),
        "pipe:0".to_string(),
    ];
    push_codec_args(&mut args, output, bitrate_kbps);
    args.extend_from_slice(&[
        "-f".to_string(),
        output.muxer().to_string(),
        "pipe:1".to_string(),
    ]);
    args
}

/// Arguments for the file-based fallback mode.
pub fn build_file_args(
    input_path: &Path,
    output_path: &Path,
    output: MediaFormat,
    bitrate_kbps: Option<u32>,
) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-i".to_string(),
        input_path.to_string_lossy().to_string(),
    ];
    push_codec_args(&mut args, output, bitrate_kbps);
    args.extend_from_slice(&["-f".to_string(), output.muxer().to_string()]);
    args.push("-y".to_string());
    args.push(output_path.to_string_lossy().to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_streaming_args_use_pipes() {
        let args = build_streaming_args(MediaFormat::Wav, None);
        assert!(args.contains(&"pipe:0".to_string()));
        assert_eq!(args.last().unwrap(), "pipe:1");
        let f = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f + 1], "wav");
    }

    #[test]
    fn test_bitrate_flag() {
        let args = build_streaming_args(MediaFormat::Mp3, Some(192));
        let b = args.iter().position(|a| a == "-b:a").unwrap();
        assert_eq!(args[b + 1], "192k");

        let args = build_streaming_args(MediaFormat::Mp3, None);
        assert!(!args.contains(&"-b:a".to_string()));
    }

    #[test]
    fn test_audio_targets_drop_video_streams() {
        let args = build_streaming_args(MediaFormat::Ogg, None);
        assert!(args.contains(&"-vn".to_string()));

        let args = build_streaming_args(MediaFormat::Webm, None);
        assert!(!args.contains(&"-vn".to_string()));
        assert!(args.contains(&"libvpx-vp9".to_string()));
    }

    #[test]
    fn test_file_args_overwrite_output() {
        let args = build_file_args(
            &PathBuf::from("/tmp/in.flac"),
            &PathBuf::from("/tmp/out.wav"),
            MediaFormat::Wav,
            None,
        );
        assert!(args.contains(&"-y".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/out.wav");
        assert!(args.contains(&"/tmp/in.flac".to_string()));
    }

    #[test]
    fn test_aac_pipe_muxer_is_adts() {
        let args = build_streaming_args(MediaFormat::Aac, None);
        let f = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f + 1], "adts");
    }
}
