//! Packager configuration, enumerated per the external-interfaces surface.
//!
//! `Config` is plain caller-constructed data; the core never parses a file,
//! environment variable, or command line to produce one.

use crate::model::TrackType;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum OutputFormat {
    Fmp4,
    Ts,
    VttMp4,
    TtmlMp4,
    Ttml,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ProtectionScheme {
    None,
    SampleAes,
    Aes128,
    Cbcs,
    Cenc,
}

/// Which DRM signaling metadata to emit alongside protected content. A
/// bitmask over a closed set of systems, so a plain newtype over `u8`
/// with named constants serves better than pulling in a flags crate for
/// five bits.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct ProtectionSystem(pub u8);

impl ProtectionSystem {
    pub const COMMON: ProtectionSystem = ProtectionSystem(1 << 0);
    pub const WIDEVINE: ProtectionSystem = ProtectionSystem(1 << 1);
    pub const PLAYREADY: ProtectionSystem = ProtectionSystem(1 << 2);
    pub const FAIRPLAY: ProtectionSystem = ProtectionSystem(1 << 3);
    pub const MARLIN: ProtectionSystem = ProtectionSystem(1 << 4);

    pub fn empty() -> Self {
        ProtectionSystem(0)
    }

    pub fn contains(self, other: ProtectionSystem) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ProtectionSystem {
    type Output = ProtectionSystem;
    fn bitor(self, rhs: ProtectionSystem) -> ProtectionSystem {
        ProtectionSystem(self.0 | rhs.0)
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub format: OutputFormat,
    pub track_type: TrackType,
    pub segment_duration_sec: f64,
    pub iv: Vec<u8>,
    pub key: Option<[u8; 16]>,
    pub key_id: Option<[u8; 16]>,
    pub protection_scheme: ProtectionScheme,
    pub protection_system: ProtectionSystem,
    pub segment_number: u64,
    pub m2ts_offset_ms: i64,
    pub timed_text_decode_time: i64,
    pub emsg_processing: bool,
    pub enable_decryption: bool,
    pub decryption_key: Option<[u8; 16]>,
    pub decryption_key_id: Option<[u8; 16]>,
    /// Successive (key, key_id) pairs a rotation policy advances through
    /// in order, wrapping once exhausted. Empty disables rotation: `key`
    /// and `key_id` above are then used for every segment.
    pub key_rotation_keys: Vec<([u8; 16], [u8; 16])>,
    /// Crypto-period length in seconds of the track's own timeline. Every
    /// time a segment's start timestamp crosses into a new period, the
    /// engine advances to the next key in `key_rotation_keys`. Zero (the
    /// default) disables rotation regardless of `key_rotation_keys`.
    pub crypto_period_duration_sec: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            format: OutputFormat::Fmp4,
            track_type: TrackType::Video,
            segment_duration_sec: 6.0,
            iv: Vec::new(),
            key: None,
            key_id: None,
            protection_scheme: ProtectionScheme::None,
            protection_system: ProtectionSystem::empty(),
            segment_number: 1,
            m2ts_offset_ms: 0,
            timed_text_decode_time: 0,
            emsg_processing: false,
            enable_decryption: false,
            decryption_key: None,
            decryption_key_id: None,
            key_rotation_keys: Vec::new(),
            crypto_period_duration_sec: 0.0,
        }
    }
}
