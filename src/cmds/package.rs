//! Subcommand that drives `LivePackager` over init/media segment files on
//! disk: reads an input init segment and media segment, repackages them per
//! the given format and protection options, and writes the results back out.

use base::{bail, Error, ResultExt};
use bpaf::Bpaf;
use packager::config::{OutputFormat, ProtectionScheme};
use packager::model::TrackType;
use packager::{Config, LivePackager};
use std::path::PathBuf;

use super::{parse_hex, parse_hex16};

/// Repackages a media segment into the container/protection scheme a client needs.
#[derive(Bpaf, Debug)]
#[bpaf(command("package"))]
pub struct Args {
    /// Input initialization segment.
    #[bpaf(long, argument("PATH"))]
    init: PathBuf,

    /// Input media segment.
    #[bpaf(long, argument("PATH"))]
    media: PathBuf,

    /// Where to write the output initialization segment (if the output
    /// format has one).
    #[bpaf(long, argument("PATH"))]
    out_init: PathBuf,

    /// Where to write the output media segment.
    #[bpaf(long, argument("PATH"))]
    out_media: PathBuf,

    /// Output container: fmp4, ts, packed-audio, vtt-mp4, ttml-mp4, ttml.
    #[bpaf(long, argument("FORMAT"), fallback("fmp4".to_string()))]
    format: String,

    /// Track type of the input: video, audio, text.
    #[bpaf(long, argument("TYPE"), fallback("video".to_string()))]
    track_type: String,

    /// Target segment duration, for muxers that consult it.
    #[bpaf(long, argument("SECONDS"), fallback(6.0))]
    segment_duration_sec: f64,

    /// Output encryption scheme: none, sample-aes, aes128, cbcs, cenc.
    #[bpaf(long, argument("SCHEME"), fallback("none".to_string()))]
    protection_scheme: String,

    /// 16-byte encryption key, hex-encoded.
    #[bpaf(long, argument("HEX"))]
    key: Option<String>,

    /// 16-byte key id, hex-encoded.
    #[bpaf(long, argument("HEX"))]
    key_id: Option<String>,

    /// Initialization vector, hex-encoded.
    #[bpaf(long, argument("HEX"))]
    iv: Option<String>,

    /// Sequence number of the first emitted segment.
    #[bpaf(long, argument("N"), fallback(1))]
    segment_number: u64,

    /// MPEG-2 TS `m2ts_offset_ms`, added to PCR/PTS/DTS values.
    #[bpaf(long, argument("MS"), fallback(0))]
    m2ts_offset_ms: i64,

    /// Base decode time for timed-text segments.
    #[bpaf(long, argument("TICKS"), fallback(0))]
    timed_text_decode_time: i64,

    /// Process emsg boxes into manifest-level signaling instead of passing them through.
    #[bpaf(long)]
    emsg_processing: bool,

    /// Decrypt samples using --decryption-key/--decryption-key-id before repackaging.
    #[bpaf(long)]
    enable_decryption: bool,

    /// Decryption key, hex-encoded. Requires --enable-decryption.
    #[bpaf(long, argument("HEX"))]
    decryption_key: Option<String>,

    /// Decryption key id, hex-encoded. Requires --enable-decryption.
    #[bpaf(long, argument("HEX"))]
    decryption_key_id: Option<String>,
}

fn parse_format(s: &str) -> Result<OutputFormat, Error> {
    Ok(match s {
        "fmp4" => OutputFormat::Fmp4,
        "ts" => OutputFormat::Ts,
        "packed-audio" => OutputFormat::Fmp4, // dispatched separately below
        "vtt-mp4" => OutputFormat::VttMp4,
        "ttml-mp4" => OutputFormat::TtmlMp4,
        "ttml" => OutputFormat::Ttml,
        other => bail!(InvalidArgument, msg("unknown --format {}", other)),
    })
}

fn parse_track_type(s: &str) -> Result<TrackType, Error> {
    Ok(match s {
        "video" => TrackType::Video,
        "audio" => TrackType::Audio,
        "text" => TrackType::Text,
        other => bail!(InvalidArgument, msg("unknown --track-type {}", other)),
    })
}

fn parse_protection_scheme(s: &str) -> Result<ProtectionScheme, Error> {
    Ok(match s {
        "none" => ProtectionScheme::None,
        "sample-aes" => ProtectionScheme::SampleAes,
        "aes128" => ProtectionScheme::Aes128,
        "cbcs" => ProtectionScheme::Cbcs,
        "cenc" => ProtectionScheme::Cenc,
        other => bail!(InvalidArgument, msg("unknown --protection-scheme {}", other)),
    })
}

pub fn run(args: Args) -> Result<i32, Error> {
    let packed_audio = args.format == "packed-audio";
    let format = parse_format(&args.format)?;
    let track_type = parse_track_type(&args.track_type)?;
    let protection_scheme = parse_protection_scheme(&args.protection_scheme)?;

    let cfg = Config {
        format,
        track_type,
        segment_duration_sec: args.segment_duration_sec,
        iv: args.iv.as_deref().map(parse_hex).transpose()?.unwrap_or_default(),
        key: args.key.as_deref().map(parse_hex16).transpose()?,
        key_id: args.key_id.as_deref().map(parse_hex16).transpose()?,
        protection_scheme,
        segment_number: args.segment_number,
        m2ts_offset_ms: args.m2ts_offset_ms,
        timed_text_decode_time: args.timed_text_decode_time,
        emsg_processing: args.emsg_processing,
        enable_decryption: args.enable_decryption,
        decryption_key: args.decryption_key.as_deref().map(parse_hex16).transpose()?,
        decryption_key_id: args.decryption_key_id.as_deref().map(parse_hex16).transpose()?,
        ..Config::default()
    };

    let init_bytes = std::fs::read(&args.init).err_kind(base::ErrorKind::FileFailure)?;
    let media_bytes = std::fs::read(&args.media).err_kind(base::ErrorKind::FileFailure)?;

    let mut pkg = LivePackager::new(cfg);
    let out = if packed_audio {
        pkg.package_packed_audio(&init_bytes, &media_bytes)?
    } else {
        match track_type {
            TrackType::Text => pkg.package_timedtext(&init_bytes, &media_bytes)?,
            _ => pkg.package(&init_bytes, &media_bytes)?,
        }
    };

    if !out.init_segment_data().is_empty() {
        std::fs::write(&args.out_init, out.init_segment_data()).err_kind(base::ErrorKind::FileFailure)?;
    }
    std::fs::write(&args.out_media, out.segment_data()).err_kind(base::ErrorKind::FileFailure)?;

    tracing::info!(
        init_bytes = out.init_segment_size(),
        media_bytes = out.segment_size(),
        "wrote segment"
    );
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use packager::isobmff::writer;
    use packager::model::{AudioInfo, CodecTag, MediaSample, StreamInfo};

    fn audio_info() -> StreamInfo {
        StreamInfo {
            track_type: TrackType::Audio,
            codec: CodecTag::Aac,
            codec_config: vec![0x12, 0x10],
            track_id: 1,
            timescale: 48_000,
            duration: None,
            language: "und".to_string(),
            video: None,
            audio: Some(AudioInfo {
                sample_rate: 48_000,
                channel_count: 2,
                bits_per_sample: 16,
                seek_preroll_ns: 0,
                codec_delay_ns: 0,
            }),
        }
    }

    #[test]
    fn round_trips_fmp4_files_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let info = audio_info();
        let cfg = Config::default();
        let init_bytes = writer::build_init_segment(&info, &cfg).unwrap();
        let media_bytes = writer::build_media_segment(
            &[MediaSample {
                dts: 0,
                pts: 0,
                duration: 1024,
                is_key_frame: true,
                data: vec![0xAA; 10],
                side_data: None,
                decrypt_config: None,
            }],
            &writer::MediaSegmentParams {
                info: &info,
                cfg: &cfg,
                sequence_number: 1,
                base_decode_time: 0,
            },
        )
        .unwrap();

        let init_path = dir.path().join("init.mp4");
        let media_path = dir.path().join("media.m4s");
        std::fs::write(&init_path, &init_bytes).unwrap();
        std::fs::write(&media_path, &media_bytes).unwrap();

        let out_init = dir.path().join("out_init.mp4");
        let out_media = dir.path().join("out_media.m4s");

        let args = Args {
            init: init_path,
            media: media_path,
            out_init: out_init.clone(),
            out_media: out_media.clone(),
            format: "fmp4".to_string(),
            track_type: "audio".to_string(),
            segment_duration_sec: 6.0,
            protection_scheme: "none".to_string(),
            key: None,
            key_id: None,
            iv: None,
            segment_number: 1,
            m2ts_offset_ms: 0,
            timed_text_decode_time: 0,
            emsg_processing: false,
            enable_decryption: false,
            decryption_key: None,
            decryption_key_id: None,
        };

        assert_eq!(run(args).unwrap(), 0);
        let out_init_bytes = std::fs::read(&out_init).unwrap();
        assert_eq!(&out_init_bytes[4..8], b"ftyp");
        assert!(std::fs::read(&out_media).unwrap().len() > 0);
    }

    #[test]
    fn rejects_unknown_format() {
        assert!(parse_format("quux").is_err());
    }
}
