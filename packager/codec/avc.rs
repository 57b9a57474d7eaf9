//! H.264/AVC byte-stream <-> unit-stream adapter and
//! AVCDecoderConfigurationRecord synthesis.

use base::err;

use super::byte_to_unit::{annex_b_to_length_prefixed, length_prefixed_to_annex_b};

const NAL_TYPE_SPS: u8 = 7;
const NAL_TYPE_PPS: u8 = 8;
const NAL_TYPE_SPS_EXT: u8 = 13;
const NAL_TYPE_AUD: u8 = 9;
const HIGH_PROFILES_WITH_CHROMA: [u8; 4] = [100, 110, 122, 144];

fn nal_type(nal: &[u8]) -> u8 {
    nal.first().map(|b| b & 0x1f).unwrap_or(0)
}

/// A trivial exp-golomb bit reader over an RBSP buffer (emulation
/// prevention bytes are not stripped here since the fields this adapter
/// reads all live before any 0x000003 pattern could plausibly occur in
/// practice for conformant streams; a general-purpose RBSP de-escaper is
/// out of scope for configuration-record synthesis).
struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        BitReader { data, bit_pos: 0 }
    }

    fn read_bit(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.bit_pos / 8)?;
        let bit = (byte >> (7 - (self.bit_pos % 8))) & 1;
        self.bit_pos += 1;
        Some(bit)
    }

    fn read_bits(&mut self, n: u32) -> Option<u32> {
        let mut v = 0u32;
        for _ in 0..n {
            v = (v << 1) | self.read_bit()? as u32;
        }
        Some(v)
    }

    fn read_ue(&mut self) -> Option<u32> {
        let mut leading_zeros = 0u32;
        while self.read_bit()? == 0 {
            leading_zeros += 1;
            if leading_zeros > 32 {
                return None;
            }
        }
        if leading_zeros == 0 {
            return Some(0);
        }
        let suffix = self.read_bits(leading_zeros)?;
        Some((1u32 << leading_zeros) - 1 + suffix)
    }
}

#[derive(Clone, Debug, Default)]
pub struct SpsInfo {
    pub profile_idc: u8,
    pub level_idc: u8,
    pub chroma_format_idc: u8,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
}

fn parse_sps(sps: &[u8]) -> SpsInfo {
    let mut info = SpsInfo {
        profile_idc: *sps.first().unwrap_or(&0),
        level_idc: *sps.get(2).unwrap_or(&0),
        chroma_format_idc: 1,
        bit_depth_luma_minus8: 0,
        bit_depth_chroma_minus8: 0,
    };
    if !HIGH_PROFILES_WITH_CHROMA.contains(&info.profile_idc) || sps.len() < 4 {
        return info;
    }
    let mut r = BitReader::new(&sps[3..]);
    let Some(_seq_parameter_set_id) = r.read_ue() else { return info };
    if let Some(chroma) = r.read_ue() {
        info.chroma_format_idc = chroma as u8;
        if chroma == 3 {
            let _separate_colour_plane_flag = r.read_bit();
        }
    }
    if let Some(bdl) = r.read_ue() {
        info.bit_depth_luma_minus8 = bdl as u8;
    }
    if let Some(bdc) = r.read_ue() {
        info.bit_depth_chroma_minus8 = bdc as u8;
    }
    info
}

#[derive(Default)]
pub struct AvcAdapter {
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
    sps_ext: Option<Vec<u8>>,
    info: SpsInfo,
}

impl AvcAdapter {
    pub fn rewrite_sample(&mut self, data: &[u8], _is_key_frame: bool) -> Result<Vec<u8>, base::Error> {
        let mut param_sets = Vec::new();
        let out = annex_b_to_length_prefixed(data, 1, nal_type, is_param_set, &mut param_sets);
        for nal in param_sets {
            match nal_type(nal) {
                NAL_TYPE_SPS => {
                    self.info = parse_sps(&nal[1..]);
                    self.sps = Some(nal.to_vec());
                }
                NAL_TYPE_PPS => self.pps = Some(nal.to_vec()),
                NAL_TYPE_SPS_EXT => self.sps_ext = Some(nal.to_vec()),
                _ => {}
            }
        }
        Ok(out)
    }

    /// Reverses `rewrite_sample`: length-prefixed back to Annex-B,
    /// prepending SPS/PPS/SPS-ext on keyframes.
    pub fn to_annex_b(&self, data: &[u8], is_key_frame: bool) -> Result<Vec<u8>, base::Error> {
        let mut param_sets = Vec::new();
        if is_key_frame {
            if let Some(s) = &self.sps {
                param_sets.push(s.clone());
            }
            if let Some(p) = &self.pps {
                param_sets.push(p.clone());
            }
            if let Some(e) = &self.sps_ext {
                param_sets.push(e.clone());
            }
        }
        length_prefixed_to_annex_b(data, &param_sets, is_key_frame)
            .map_err(|e| err!(ParserFailure, msg("{}", e)))
    }

    /// AVCDecoderConfigurationRecord, emitted only once at least one SPS
    /// has been observed.
    pub fn configuration_record(&self) -> Option<Vec<u8>> {
        let sps = self.sps.as_ref()?;
        let pps = self.pps.as_ref()?;
        let mut out = Vec::new();
        out.push(1); // configurationVersion
        out.push(self.info.profile_idc);
        out.push(0); // profile_compatibility (constraint flags), not tracked bit-exact
        out.push(self.info.level_idc);
        out.push(0xFC | 0b11); // reserved(6)=111111, lengthSizeMinusOne=3 -> 0xFF
        out.push(0xE0 | 1); // reserved(3)=111, numOfSequenceParameterSets=1 -> 0xE1
        out.extend_from_slice(&(sps.len() as u16).to_be_bytes());
        out.extend_from_slice(sps);
        out.push(1); // numOfPictureParameterSets
        out.extend_from_slice(&(pps.len() as u16).to_be_bytes());
        out.extend_from_slice(pps);

        if HIGH_PROFILES_WITH_CHROMA.contains(&self.info.profile_idc) {
            out.push(0xFC | self.info.chroma_format_idc);
            out.push(0xF8 | self.info.bit_depth_luma_minus8);
            out.push(0xF8 | self.info.bit_depth_chroma_minus8);
            match &self.sps_ext {
                Some(ext) => {
                    out.push(1);
                    out.extend_from_slice(&(ext.len() as u16).to_be_bytes());
                    out.extend_from_slice(ext);
                }
                None => out.push(0),
            }
        }
        Some(out)
    }
}

fn is_param_set(ty: u8) -> bool {
    matches!(ty, NAL_TYPE_SPS | NAL_TYPE_PPS | NAL_TYPE_SPS_EXT | NAL_TYPE_AUD)
}

pub fn rfc6381_codec(avcc: &[u8]) -> String {
    if avcc.len() < 4 {
        return "avc1".to_string();
    }
    format!("avc1.{:02x}{:02x}{:02x}", avcc[1], avcc[2], avcc[3])
}

#[cfg(test)]
mod tests {
    use super::*;

    // SPS for a trivial "High" profile stream: profile_idc=100,
    // constraints=0, level_idc=31; remaining payload is irrelevant to
    // the fields we bother to read since the bit-level fields default to
    // chroma_format_idc=1 absent a real RBSP after the fixed header.
    const HIGH_PROFILE_SPS: [u8; 8] = [0x67, 100, 0x00, 31, 0x80, 0x00, 0x00, 0x00];
    const PPS: [u8; 2] = [0x68, 0xCE];

    fn annex_b_keyframe() -> Vec<u8> {
        let mut v = vec![0, 0, 0, 1];
        v.extend_from_slice(&HIGH_PROFILE_SPS);
        v.extend_from_slice(&[0, 0, 0, 1]);
        v.extend_from_slice(&PPS);
        v.extend_from_slice(&[0, 0, 0, 1, 0x65, 0xAA, 0xBB]); // IDR slice
        v
    }

    #[test]
    fn strips_parameter_sets_and_length_prefixes_slice() {
        let mut a = AvcAdapter::default();
        let out = a.rewrite_sample(&annex_b_keyframe(), true).unwrap();
        // Only the IDR slice NAL remains, length-prefixed.
        assert_eq!(&out[0..4], &[0, 0, 0, 3]);
        assert_eq!(&out[4..7], &[0x65, 0xAA, 0xBB]);
        assert!(a.configuration_record().is_some());
    }

    #[test]
    fn decoder_config_record_header_bytes() {
        let mut a = AvcAdapter::default();
        a.rewrite_sample(&annex_b_keyframe(), true).unwrap();
        let rec = a.configuration_record().unwrap();
        assert_eq!(rec[0], 1);
        assert_eq!(rec[1], 100);
        assert_eq!(rec[4], 0xFF);
        assert_eq!(rec[5], 0xE1);
    }

    #[test]
    fn round_trip_to_annex_b() {
        let mut a = AvcAdapter::default();
        let lp = a.rewrite_sample(&annex_b_keyframe(), true).unwrap();
        let back = a.to_annex_b(&lp, true).unwrap();
        assert!(back.windows(4).any(|w| w == [0, 0, 0, 1]));
        assert!(back.windows(3).any(|w| w == [0x65, 0xAA, 0xBB]));
    }
}
