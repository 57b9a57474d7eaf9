//! VP8/VP9 uncompressed-header parsing and VPCodecConfigurationRecord
//! synthesis.

const VP8_SYNC_CODE: [u8; 3] = [0x9D, 0x01, 0x2A];

#[derive(Clone, Debug, Default)]
pub struct Vp8FrameInfo {
    pub width: u16,
    pub height: u16,
    pub horizontal_scale: u8,
    pub vertical_scale: u8,
}

/// Returns `None` when fewer than 10 bytes are available or the sync code
/// isn't present at offset 3 -- both treated as "not a keyframe" rather
/// than an error, since non-keyframes legitimately lack this header.
pub fn parse_vp8_keyframe_header(data: &[u8]) -> Option<Vp8FrameInfo> {
    if data.len() < 10 {
        return None;
    }
    if data[3..6] != VP8_SYNC_CODE {
        return None;
    }
    let w = u16::from_le_bytes([data[6], data[7]]);
    let h = u16::from_le_bytes([data[8], data[9]]);
    Some(Vp8FrameInfo {
        width: w & 0x3fff,
        horizontal_scale: (w >> 14) as u8,
        height: h & 0x3fff,
        vertical_scale: (h >> 14) as u8,
    })
}

pub fn is_vp8_keyframe(data: &[u8]) -> bool {
    parse_vp8_keyframe_header(data).is_some()
}

#[derive(Clone, Debug, Default)]
pub struct VpCodecConfig {
    pub profile: u8,
    pub level: u8,
    pub bit_depth: u8,
    pub chroma_subsampling: u8,
    pub video_full_range_flag: bool,
    pub colour_primaries: u8,
    pub transfer_characteristics: u8,
    pub matrix_coefficients: u8,
}

fn configuration_record(cfg: &VpCodecConfig) -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    out.push(1); // version
    out.push(cfg.profile);
    out.push(cfg.level);
    out.push((cfg.bit_depth << 4) | (cfg.chroma_subsampling << 1) | cfg.video_full_range_flag as u8);
    out.push(cfg.colour_primaries);
    out.push(cfg.transfer_characteristics);
    out.push(cfg.matrix_coefficients);
    out.extend_from_slice(&0u16.to_be_bytes()); // codecIntializationDataSize = 0
    out
}

#[derive(Default)]
pub struct Vp8Adapter {
    config: Option<VpCodecConfig>,
}

impl Vp8Adapter {
    pub fn set_config(&mut self, cfg: VpCodecConfig) {
        self.config = Some(cfg);
    }

    pub fn configuration_record(&self) -> Option<Vec<u8>> {
        self.config.as_ref().map(configuration_record)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Vp9FrameInfo {
    pub profile: u8,
    pub show_existing_frame: bool,
    pub is_key_frame: bool,
}

/// Reads just enough of the VP9 uncompressed header's frame_marker/profile
/// bits to classify the frame; the rest of the header requires an
/// arithmetic-coded bool decoder that the packager has no use for since it
/// never re-encodes VP9 payload, only relays it.
pub fn parse_vp9_frame_marker(data: &[u8]) -> Option<Vp9FrameInfo> {
    let b0 = *data.first()?;
    if (b0 >> 6) != 0b10 {
        return None; // frame_marker must be 0b10
    }
    let profile_low = (b0 >> 5) & 1;
    let profile_high = (b0 >> 4) & 1;
    let profile = (profile_high << 1) | profile_low;
    let show_existing_frame = (b0 >> 3) & 1 == 1;
    let is_key_frame = !show_existing_frame && (b0 >> 2) & 1 == 0;
    Some(Vp9FrameInfo {
        profile,
        show_existing_frame,
        is_key_frame,
    })
}

#[derive(Default)]
pub struct Vp9Adapter {
    config: Option<VpCodecConfig>,
}

impl Vp9Adapter {
    pub fn set_config(&mut self, cfg: VpCodecConfig) {
        self.config = Some(cfg);
    }

    pub fn configuration_record(&self) -> Option<Vec<u8>> {
        self.config.as_ref().map(configuration_record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keyframe_dimensions() {
        let mut f = vec![0u8; 10];
        f[3..6].copy_from_slice(&VP8_SYNC_CODE);
        f[6..8].copy_from_slice(&1280u16.to_le_bytes());
        f[8..10].copy_from_slice(&720u16.to_le_bytes());
        let info = parse_vp8_keyframe_header(&f).unwrap();
        assert_eq!(info.width, 1280);
        assert_eq!(info.height, 720);
    }

    #[test]
    fn rejects_short_buffer() {
        assert!(!is_vp8_keyframe(&[0u8; 9]));
    }

    #[test]
    fn rejects_missing_sync_code() {
        let f = vec![0u8; 10];
        assert!(!is_vp8_keyframe(&f));
    }

    #[test]
    fn vp9_profile_bits() {
        let info = parse_vp9_frame_marker(&[0b1001_0000]).unwrap();
        assert_eq!(info.profile, 0b10);
    }
}
