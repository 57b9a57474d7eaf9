//! Codec bitstream adapters: per-codec byte-stream rewriting and
//! configuration-record synthesis, dispatched through a tagged enum
//! rather than virtual dispatch -- each codec keeps its own state struct
//! and the adapter surface is the same five-ish methods for all of them.

pub mod aac;
pub mod ac3;
mod byte_to_unit;
pub mod avc;
pub mod dovi;
pub mod eac3;
pub mod hevc;
pub mod opus;
pub mod vp8vp9;
pub mod webm;

use crate::model::{CodecTag, StreamInfo};

/// Per-track codec adapter state, one variant per supported codec. Adding
/// a codec means adding a variant and its match arms here, not a new
/// trait object.
pub enum Codec {
    Avc(avc::AvcAdapter),
    Hevc(hevc::HevcAdapter),
    Dovi(dovi::DoviAdapter),
    Aac(aac::AacAdapter),
    Ac3(ac3::Ac3Adapter),
    Eac3(eac3::Eac3Adapter),
    Opus(opus::OpusAdapter),
    Vp8(vp8vp9::Vp8Adapter),
    Vp9(vp8vp9::Vp9Adapter),
}

impl Codec {
    pub fn for_tag(tag: CodecTag) -> Option<Codec> {
        Some(match tag {
            CodecTag::H264 => Codec::Avc(avc::AvcAdapter::default()),
            CodecTag::H265 => Codec::Hevc(hevc::HevcAdapter::default()),
            CodecTag::DolbyVision => Codec::Dovi(dovi::DoviAdapter::default()),
            CodecTag::Aac => Codec::Aac(aac::AacAdapter::default()),
            CodecTag::Ac3 => Codec::Ac3(ac3::Ac3Adapter::default()),
            CodecTag::Eac3 => Codec::Eac3(eac3::Eac3Adapter::default()),
            CodecTag::Opus => Codec::Opus(opus::OpusAdapter::default()),
            CodecTag::Vp8 => Codec::Vp8(vp8vp9::Vp8Adapter::default()),
            CodecTag::Vp9 => Codec::Vp9(vp8vp9::Vp9Adapter::default()),
            _ => return None,
        })
    }

    /// Feeds the out-of-band decoder configuration parsed from the init
    /// segment into adapters that need it ahead of the first sample (AAC's
    /// AudioSpecificConfig). AVC/HEVC/DoVi learn their parameter sets from
    /// the samples themselves and have nothing to do here.
    pub fn configure(&mut self, codec_config: &[u8]) -> Result<(), base::Error> {
        match self {
            Codec::Aac(a) => a.set_audio_specific_config(codec_config),
            _ => Ok(()),
        }
    }

    /// Rewrites one sample's bitstream (e.g. Annex-B -> length-prefixed
    /// for AVC/HEVC, raw AAC -> ADTS). Codecs with nothing to rewrite
    /// return the input unchanged.
    pub fn rewrite_sample(&mut self, data: &[u8], is_key_frame: bool) -> Result<Vec<u8>, base::Error> {
        match self {
            Codec::Avc(a) => a.rewrite_sample(data, is_key_frame),
            Codec::Hevc(a) => a.rewrite_sample(data, is_key_frame),
            Codec::Dovi(a) => a.rewrite_sample(data, is_key_frame),
            Codec::Aac(a) => a.rewrite_sample(data),
            Codec::Ac3(_) | Codec::Eac3(_) | Codec::Opus(_) | Codec::Vp8(_) | Codec::Vp9(_) => {
                Ok(data.to_vec())
            }
        }
    }

    /// Re-expands a sample already passed through `rewrite_sample` back
    /// into byte-stream form for containers (MPEG-TS) that carry Annex-B
    /// rather than length-prefixed NAL units, prepending SPS/PPS/VPS on
    /// keyframes. Codecs with nothing to re-expand return the input
    /// unchanged (AAC's ADTS wrapping from `rewrite_sample` is already in
    /// byte-stream form and needs no further step).
    pub fn to_bytestream(&self, data: &[u8], is_key_frame: bool) -> Result<Vec<u8>, base::Error> {
        match self {
            Codec::Avc(a) => a.to_annex_b(data, is_key_frame),
            Codec::Hevc(a) => a.to_annex_b(data, is_key_frame),
            Codec::Dovi(_) | Codec::Aac(_) | Codec::Ac3(_) | Codec::Eac3(_) | Codec::Opus(_) | Codec::Vp8(_) | Codec::Vp9(_) => {
                Ok(data.to_vec())
            }
        }
    }

    pub fn configuration_record(&self) -> Option<Vec<u8>> {
        match self {
            Codec::Avc(a) => a.configuration_record(),
            Codec::Hevc(a) => a.configuration_record(),
            Codec::Dovi(a) => a.configuration_record(),
            Codec::Aac(a) => a.configuration_record(),
            Codec::Ac3(a) => a.configuration_record(),
            Codec::Eac3(a) => a.configuration_record(),
            Codec::Opus(a) => a.configuration_record(),
            Codec::Vp8(a) => a.configuration_record(),
            Codec::Vp9(a) => a.configuration_record(),
        }
    }
}

/// Formats the RFC 6381 codec string for a track, as used in DASH MPDs /
/// HLS playlists by the packager's (external) manifest-generator callers.
pub fn rfc6381_codec(info: &StreamInfo) -> String {
    match info.codec {
        CodecTag::H264 => avc::rfc6381_codec(&info.codec_config),
        CodecTag::H265 => hevc::rfc6381_codec(&info.codec_config),
        CodecTag::DolbyVision => dovi::rfc6381_codec(&info.codec_config),
        CodecTag::Aac => "mp4a.40.2".to_string(),
        CodecTag::Ac3 => "ac-3".to_string(),
        CodecTag::Eac3 => "ec-3".to_string(),
        CodecTag::Mp3 => "mp4a.40.34".to_string(),
        CodecTag::Opus => "opus".to_string(),
        CodecTag::Vp8 => "vp08".to_string(),
        CodecTag::Vp9 => "vp09".to_string(),
        CodecTag::Av1 => "av01".to_string(),
        CodecTag::Flac => "fLaC".to_string(),
        CodecTag::Pcm => "raw ".to_string(),
        CodecTag::Ttml => "stpp".to_string(),
        CodecTag::WebVtt => "wvtt".to_string(),
    }
}
