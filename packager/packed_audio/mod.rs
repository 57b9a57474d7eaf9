//! "MPEG-Packed Audio" segmenter for HLS: an ID3v2.4 tag carrying a PTS
//! (and optional codec setup info) followed by back-to-back ADTS/AC-3/MP3
//! frames.

use base::bail;

use crate::codec::Codec;
use crate::model::{CodecTag, MediaSample};

const ID3V2_IDENTIFIER: &[u8; 3] = b"ID3";
const ID3V2_VERSION: u16 = 0x0400;
const MAX_SYNCHSAFE_SIZE: u32 = 0x0FFF_FFFF;
const FOURCC_PRIV: &[u8; 4] = b"PRIV";

const TIMESTAMP_OWNER: &str = "com.apple.streaming.transportStreamTimestamp";
const AUDIO_DESCRIPTION_OWNER: &str = "com.apple.streaming.audioDescription";

fn encode_synchsafe(size: u32) -> [u8; 4] {
    [
        ((size >> 21) & 0x7F) as u8,
        ((size >> 14) & 0x7F) as u8,
        ((size >> 7) & 0x7F) as u8,
        (size & 0x7F) as u8,
    ]
}

struct PrivateFrame {
    owner: &'static str,
    data: Vec<u8>,
}

fn write_private_frame(frame: &PrivateFrame, out: &mut Vec<u8>) -> Result<(), base::Error> {
    let frame_size = frame.owner.len() as u32 + 1 + frame.data.len() as u32;
    if frame_size > MAX_SYNCHSAFE_SIZE {
        bail!(MuxerFailure, msg("ID3 PRIV frame size {} exceeds synchsafe range", frame_size));
    }
    out.extend_from_slice(FOURCC_PRIV);
    out.extend_from_slice(&encode_synchsafe(frame_size));
    out.extend_from_slice(&0u16.to_be_bytes()); // frame flags
    out.extend_from_slice(frame.owner.as_bytes());
    out.push(0); // NUL terminator between owner and value
    out.extend_from_slice(&frame.data);
    Ok(())
}

/// Builds the 8-byte PRIV timestamp payload: high 31 bits zero, low 33
/// bits carry the PTS in 90 kHz.
fn timestamp_payload(pts_90k: u64) -> [u8; 8] {
    (pts_90k & 0x1_FFFF_FFFF).to_be_bytes()
}

fn audio_description_payload(codec: CodecTag, codec_config: &[u8]) -> Vec<u8> {
    let tag = match codec {
        CodecTag::Aac => *b"mp4a",
        CodecTag::Ac3 => *b"ac-3",
        CodecTag::Mp3 => *b"mp3 ",
        _ => *b"unkn",
    };
    let mut out = Vec::with_capacity(4 + codec_config.len());
    out.extend_from_slice(&tag);
    out.extend_from_slice(codec_config);
    out
}

/// Writes an ID3v2.4 tag with a transportStreamTimestamp PRIV frame and an
/// optional audioDescription PRIV frame.
pub fn write_id3_tag(
    pts_90k: u64,
    audio_setup: Option<(CodecTag, &[u8])>,
    out: &mut Vec<u8>,
) -> Result<(), base::Error> {
    let mut frames = Vec::new();
    write_private_frame(
        &PrivateFrame {
            owner: TIMESTAMP_OWNER,
            data: timestamp_payload(pts_90k).to_vec(),
        },
        &mut frames,
    )?;
    if let Some((codec, codec_config)) = audio_setup {
        write_private_frame(
            &PrivateFrame {
                owner: AUDIO_DESCRIPTION_OWNER,
                data: audio_description_payload(codec, codec_config),
            },
            &mut frames,
        )?;
    }

    if frames.len() as u32 > MAX_SYNCHSAFE_SIZE {
        bail!(MuxerFailure, msg("ID3 tag body {} bytes exceeds synchsafe range", frames.len()));
    }
    out.extend_from_slice(ID3V2_IDENTIFIER);
    out.extend_from_slice(&ID3V2_VERSION.to_be_bytes());
    out.push(0); // flags
    out.extend_from_slice(&encode_synchsafe(frames.len() as u32));
    out.extend_from_slice(&frames);
    Ok(())
}

/// Encodes one packed-audio segment: ID3 tag followed by each sample's
/// codec-native frame (ADTS-wrapped for AAC, raw for AC-3/MP3). A positive
/// `transport_stream_timestamp_offset_ms` is added to every sample's PTS
/// before encoding; a resulting negative timestamp is rejected.
pub fn build_segment(
    codec: &mut Codec,
    codec_tag: CodecTag,
    codec_config: &[u8],
    timescale: u32,
    transport_stream_timestamp_offset_ms: i64,
    samples: &[MediaSample],
) -> Result<Vec<u8>, base::Error> {
    let first_pts_90k = match samples.first() {
        Some(s) => adjust_pts(s.pts, timescale, transport_stream_timestamp_offset_ms)?,
        None => bail!(ChunkingError, msg("packed-audio segment has no samples")),
    };

    let mut out = Vec::new();
    write_id3_tag(first_pts_90k, Some((codec_tag, codec_config)), &mut out)?;

    for sample in samples {
        let frame = codec.rewrite_sample(&sample.data, sample.is_key_frame)?;
        out.extend_from_slice(&frame);
    }
    Ok(out)
}

fn adjust_pts(pts: i64, timescale: u32, offset_ms: i64) -> Result<u64, base::Error> {
    let offset_ticks = offset_ms * timescale as i64 / 1000;
    let adjusted = pts + offset_ticks;
    if adjusted < 0 {
        bail!(MuxerFailure, msg("transport_stream_timestamp_offset_ms produced a negative PTS"));
    }
    let adjusted_90k = base::time::rescale(adjusted, timescale, 90_000);
    Ok(adjusted_90k as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id3_tag_starts_with_identifier_and_version() {
        let mut out = Vec::new();
        write_id3_tag(12345, None, &mut out).unwrap();
        assert_eq!(&out[0..3], b"ID3");
        assert_eq!(u16::from_be_bytes([out[3], out[4]]), 0x0400);
    }

    #[test]
    fn priv_frame_carries_owner_and_timestamp() {
        let mut out = Vec::new();
        write_id3_tag(90_000, None, &mut out).unwrap();
        let priv_pos = out.windows(4).position(|w| w == b"PRIV").unwrap();
        let owner_start = priv_pos + 4 + 4 + 2;
        assert_eq!(
            &out[owner_start..owner_start + TIMESTAMP_OWNER.len()],
            TIMESTAMP_OWNER.as_bytes()
        );
    }

    #[test]
    fn negative_offset_past_zero_is_rejected() {
        assert!(adjust_pts(100, 90_000, -100_000).is_err());
    }

    #[test]
    fn synchsafe_round_trip_for_small_size() {
        let bytes = encode_synchsafe(200);
        let decoded = ((bytes[0] as u32) << 21)
            | ((bytes[1] as u32) << 14)
            | ((bytes[2] as u32) << 7)
            | (bytes[3] as u32);
        assert_eq!(decoded, 200);
    }
}
