//! Caller-facing data model: the types that cross the façade boundary.
//!
//! These mirror the "DATA MODEL" shapes the rest of the crate is built
//! around: one `StreamInfo` parsed once from an init segment, one
//! `MediaSample` per access unit, and the encryption/segment-boundary
//! side-channel types that ride alongside them.

use pretty_hex::PrettyHex as _;
use smallvec::SmallVec;

/// The three track kinds the packager understands.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TrackType {
    Audio,
    Video,
    Text,
}

/// Closed set of codecs the packager can adapt.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[non_exhaustive]
pub enum CodecTag {
    H264,
    H265,
    DolbyVision,
    Aac,
    Ac3,
    Eac3,
    Mp3,
    Opus,
    Vp8,
    Vp9,
    Av1,
    Flac,
    Pcm,
    Ttml,
    WebVtt,
}

impl CodecTag {
    pub fn track_type(self) -> TrackType {
        use CodecTag::*;
        match self {
            H264 | H265 | DolbyVision | Vp8 | Vp9 | Av1 => TrackType::Video,
            Aac | Ac3 | Eac3 | Mp3 | Opus | Flac | Pcm => TrackType::Audio,
            Ttml | WebVtt => TrackType::Text,
        }
    }
}

/// Transfer characteristics as signaled in an SPS / VUI, used to pick CMAF
/// brands and color boxes. Only the values the codec adapters care about
/// are enumerated; anything else is carried as `Other`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TransferCharacteristics {
    Bt709,
    Smpte2084,
    AribStdB67,
    Other(u8),
}

/// Video-only geometry and timing attributes parsed from the init segment.
#[derive(Clone, Debug)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub pixel_aspect_ratio: (u32, u32),
    pub nalu_length_size: u8, // one of {1, 2, 4}; meaningless for non-NAL codecs.
    pub transfer_characteristics: TransferCharacteristics,
}

/// Audio-only attributes parsed from the init segment.
#[derive(Clone, Debug)]
pub struct AudioInfo {
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bits_per_sample: u16,
    pub seek_preroll_ns: u64,
    pub codec_delay_ns: u64,
}

/// Parsed once from the initialization segment; immutable thereafter.
#[derive(Clone, Debug)]
pub struct StreamInfo {
    pub track_type: TrackType,
    pub codec: CodecTag,
    /// Opaque decoder-configuration-record bytes (avcC/hvcC/esds payload/dOps/etc).
    pub codec_config: Vec<u8>,
    pub track_id: u32,
    pub timescale: u32,
    pub duration: Option<u64>,
    pub language: String,
    pub video: Option<VideoInfo>,
    pub audio: Option<AudioInfo>,
}

impl StreamInfo {
    pub fn rfc6381_codec(&self) -> String {
        crate::codec::rfc6381_codec(self)
    }
}

/// A (clear_bytes, cipher_bytes) pair describing one encrypted region within
/// a sample's subsample table. An empty subsample list on the owning
/// sample/config means "encrypt the whole payload".
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct SubsampleEntry {
    pub clear_bytes: u16,
    pub cipher_bytes: u32,
}

/// The CENC family of sample protection schemes.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ProtectionScheme {
    Cenc,
    Cbc1,
    Cens,
    Cbcs,
}

/// Per-sample (or per-config, for constant-IV schemes) encryption
/// parameters. Used both for encrypting on write (`EncryptionConfig`) and
/// decrypting on read (`DecryptConfig`) -- the shapes are identical so one
/// type serves both roles, as the spec's naming suggests.
#[derive(Clone, Debug)]
pub struct CryptoConfig {
    pub key_id: [u8; 16],
    pub key: [u8; 16],
    pub iv: SmallVec<[u8; 16]>,
    pub scheme: ProtectionScheme,
    /// In units of 16-byte AES blocks. Zero for non-patterned schemes.
    pub crypt_byte_block: u8,
    pub skip_byte_block: u8,
    pub subsamples: Vec<SubsampleEntry>,
}

pub type DecryptConfig = CryptoConfig;
pub type EncryptionConfig = CryptoConfig;

/// One access unit.
#[derive(Clone, derive_more::Debug)]
pub struct MediaSample {
    pub dts: i64,
    pub pts: i64,
    pub duration: u32,
    pub is_key_frame: bool,
    #[debug("{}", self.data.hex_dump())]
    pub data: Vec<u8>,
    pub side_data: Option<Vec<u8>>,
    pub decrypt_config: Option<DecryptConfig>,
}

impl MediaSample {
    /// PTS - DTS, representable as the composition-time-offset field.
    pub fn cts_offset(&self) -> i64 {
        self.pts - self.dts
    }
}

/// Describes one segment boundary event.
#[derive(Clone, Debug, Default)]
pub struct SegmentInfo {
    pub start: i64,
    pub duration: u64,
    pub is_subsegment: bool,
    pub key_rotation: Option<EncryptionConfig>,
}

/// Append-only byte sink with a recorded init-size prefix.
///
/// The backing buffer is a single contiguous `Vec<u8>`; the first
/// `init_size` bytes (if any) are the initialization segment, the rest is
/// the most recently emitted media segment.
#[derive(Default, Debug)]
pub struct SegmentBuffer {
    buf: Vec<u8>,
    init_size: usize,
    info: SegmentInfo,
}

impl SegmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records this segment's boundary metadata -- start/duration in the
    /// track's own timescale, and any key-rotation event the engine raised
    /// while building it, so callers can refresh `pssh`/`KEY` playlist
    /// metadata before the next segment request.
    pub fn set_segment_info(&mut self, info: SegmentInfo) {
        self.info = info;
    }

    pub fn segment_info(&self) -> &SegmentInfo {
        &self.info
    }

    /// `None` on every segment that didn't cross into a new crypto-period.
    pub fn key_rotation(&self) -> Option<&EncryptionConfig> {
        self.info.key_rotation.as_ref()
    }

    /// Resets the buffer to hold only `data` as the init segment.
    pub fn set_init_segment(&mut self, data: Vec<u8>) {
        self.init_size = data.len();
        self.buf = data;
    }

    /// Replaces any previous media segment with `data`, keeping the init
    /// segment prefix (if any) intact.
    pub fn set_media_segment(&mut self, data: &[u8]) {
        self.buf.truncate(self.init_size);
        self.buf.extend_from_slice(data);
    }

    pub fn init_segment_data(&self) -> &[u8] {
        &self.buf[..self.init_size]
    }

    pub fn init_segment_size(&self) -> usize {
        self.init_size
    }

    pub fn segment_data(&self) -> &[u8] {
        &self.buf[self.init_size..]
    }

    pub fn segment_size(&self) -> usize {
        self.buf.len() - self.init_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_buffer_views() {
        let mut b = SegmentBuffer::new();
        b.set_init_segment(vec![1, 2, 3]);
        b.set_media_segment(&[4, 5]);
        assert_eq!(b.init_segment_data(), &[1, 2, 3]);
        assert_eq!(b.segment_data(), &[4, 5]);
        assert_eq!(b.init_segment_size(), 3);
        assert_eq!(b.segment_size(), 2);

        b.set_media_segment(&[6, 7, 8, 9]);
        assert_eq!(b.init_segment_data(), &[1, 2, 3]);
        assert_eq!(b.segment_data(), &[6, 7, 8, 9]);
    }

    #[test]
    fn cts_offset() {
        let s = MediaSample {
            dts: 100,
            pts: 130,
            duration: 30,
            is_key_frame: true,
            data: vec![],
            side_data: None,
            decrypt_config: None,
        };
        assert_eq!(s.cts_offset(), 30);
    }
}
