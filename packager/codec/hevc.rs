//! H.265/HEVC byte-stream <-> unit-stream adapter and
//! HEVCDecoderConfigurationRecord synthesis.

use base::err;

use super::byte_to_unit::{annex_b_to_length_prefixed, length_prefixed_to_annex_b};

const NAL_TYPE_VPS: u8 = 32;
const NAL_TYPE_SPS: u8 = 33;
const NAL_TYPE_PPS: u8 = 34;
const NAL_TYPE_AUD: u8 = 35;

fn nal_type(nal: &[u8]) -> u8 {
    nal.first().map(|b| (b >> 1) & 0x3f).unwrap_or(0)
}

fn is_param_set(ty: u8) -> bool {
    matches!(ty, NAL_TYPE_VPS | NAL_TYPE_SPS | NAL_TYPE_PPS | NAL_TYPE_AUD)
}

/// The fixed fields an HEVCDecoderConfigurationRecord needs from the SPS's
/// `profile_tier_level()`, read here from byte offsets rather than a full
/// bit-level VUI parse -- general_profile_space/tier_flag/profile_idc sit
/// in the first profile_tier_level byte, general_level_idc is the 13th.
#[derive(Clone, Debug, Default)]
pub struct ProfileTierLevel {
    pub general_profile_space: u8,
    pub general_tier_flag: u8,
    pub general_profile_idc: u8,
    pub general_profile_compatibility_flags: u32,
    pub general_level_idc: u8,
}

fn parse_sps_ptl(sps_rbsp: &[u8]) -> ProfileTierLevel {
    // sps_rbsp starts after the 2-byte NAL header: sps_video_parameter_set_id(4)
    // + sps_max_sub_layers_minus1(3) + sps_temporal_id_nesting_flag(1) = 1 byte,
    // then profile_tier_level() begins.
    if sps_rbsp.len() < 13 {
        return ProfileTierLevel::default();
    }
    let ptl = &sps_rbsp[1..];
    let b0 = ptl[0];
    ProfileTierLevel {
        general_profile_space: b0 >> 6,
        general_tier_flag: (b0 >> 5) & 1,
        general_profile_idc: b0 & 0x1f,
        general_profile_compatibility_flags: u32::from_be_bytes(ptl[1..5].try_into().unwrap()),
        general_level_idc: *ptl.get(11).unwrap_or(&0),
    }
}

#[derive(Default)]
pub struct HevcAdapter {
    vps: Option<Vec<u8>>,
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
    ptl: ProfileTierLevel,
}

impl HevcAdapter {
    pub fn rewrite_sample(&mut self, data: &[u8], _is_key_frame: bool) -> Result<Vec<u8>, base::Error> {
        let mut param_sets = Vec::new();
        let out = annex_b_to_length_prefixed(data, 2, nal_type, is_param_set, &mut param_sets);
        for nal in param_sets {
            match nal_type(nal) {
                NAL_TYPE_VPS => self.vps = Some(nal.to_vec()),
                NAL_TYPE_SPS => {
                    self.ptl = parse_sps_ptl(&nal[2..]);
                    self.sps = Some(nal.to_vec());
                }
                NAL_TYPE_PPS => self.pps = Some(nal.to_vec()),
                _ => {}
            }
        }
        Ok(out)
    }

    pub fn to_annex_b(&self, data: &[u8], is_key_frame: bool) -> Result<Vec<u8>, base::Error> {
        let mut param_sets = Vec::new();
        if is_key_frame {
            for ps in [&self.vps, &self.sps, &self.pps].into_iter().flatten() {
                param_sets.push(ps.clone());
            }
        }
        length_prefixed_to_annex_b(data, &param_sets, is_key_frame)
            .map_err(|e| err!(ParserFailure, msg("{}", e)))
    }

    /// Emitted only once VPS + SPS + PPS have all been observed, with
    /// array_completeness = 1 since parameter sets are stripped from the
    /// rewritten samples.
    pub fn configuration_record(&self) -> Option<Vec<u8>> {
        let vps = self.vps.as_ref()?;
        let sps = self.sps.as_ref()?;
        let pps = self.pps.as_ref()?;

        let mut out = Vec::new();
        out.push(1); // configurationVersion
        out.push(
            (self.ptl.general_profile_space << 6)
                | (self.ptl.general_tier_flag << 5)
                | (self.ptl.general_profile_idc & 0x1f),
        );
        out.extend_from_slice(&self.ptl.general_profile_compatibility_flags.to_be_bytes());
        out.extend_from_slice(&[0u8; 6]); // general_constraint_indicator_flags
        out.push(self.ptl.general_level_idc);
        out.extend_from_slice(&[0xF0, 0x00]); // reserved + min_spatial_segmentation_idc=0
        out.push(0xFC); // reserved + parallelismType=0
        out.push(0xFC | 1); // reserved + chroma_format_idc (default 4:2:0)
        out.push(0xF8); // reserved + bit_depth_luma_minus8
        out.push(0xF8); // reserved + bit_depth_chroma_minus8
        out.extend_from_slice(&[0, 0]); // avgFrameRate
        out.push(0x0F); // constantFrameRate(0)|numTemporalLayers(0)|temporalIdNested(0)|lengthSizeMinusOne=3
        out.push(3); // numOfArrays: VPS, SPS, PPS

        for (array_type, nal) in [(32u8, vps), (33u8, sps), (34u8, pps)] {
            out.push(0x80 | array_type); // array_completeness=1
            out.extend_from_slice(&1u16.to_be_bytes());
            out.extend_from_slice(&(nal.len() as u16).to_be_bytes());
            out.extend_from_slice(nal);
        }
        Some(out)
    }
}

/// `hvcN.P.CCCCCCCC.LNN[.B...]` per ISO/IEC 14496-15 Annex E. The
/// compatibility-flags field is the bit-reversed hex of
/// general_profile_compatibility_flags (e.g. `0x20000000` -> `4`).
pub fn rfc6381_codec(hvcc: &[u8]) -> String {
    if hvcc.len() < 13 {
        return "hvc1".to_string();
    }
    let b1 = hvcc[1];
    let profile_space = match b1 >> 6 {
        1 => "A",
        2 => "B",
        3 => "C",
        _ => "",
    };
    let profile_idc = b1 & 0x1f;
    let tier_flag = (b1 >> 5) & 1;
    let compat = u32::from_be_bytes(hvcc[2..6].try_into().unwrap());
    let reversed = compat.reverse_bits();
    let level_idc = hvcc[12];
    format!(
        "hvc1.{}{}.{:x}.{}{}.{}",
        profile_space,
        profile_idc,
        reversed,
        if tier_flag == 0 { "L" } else { "H" },
        level_idc,
        90
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_string_matches_conformance_example() {
        // general_profile_idc=2, general_profile_space=0, tier_flag=0,
        // compatibility flags 0x20000000 (reversed bits hex = 4),
        // general_level_idc=63.
        let mut hvcc = vec![0u8; 23];
        hvcc[1] = 0x02; // profile_space=0, tier=0, profile_idc=2
        hvcc[2..6].copy_from_slice(&0x2000_0000u32.to_be_bytes());
        hvcc[12] = 63;
        assert_eq!(rfc6381_codec(&hvcc), "hvc1.2.4.L63.90");
    }

    #[test]
    fn strips_vps_sps_pps() {
        let mut a = HevcAdapter::default();
        let mut data = vec![0, 0, 0, 1];
        data.extend_from_slice(&[0x40, 0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]); // VPS
        data.extend_from_slice(&[0, 0, 0, 1]);
        let mut sps = vec![0x42, 0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 63, 0, 0];
        data.append(&mut sps);
        data.extend_from_slice(&[0, 0, 0, 1, 0x44, 0x01, 0xAA]); // PPS
        data.extend_from_slice(&[0, 0, 0, 1, 0x26, 0x01, 0xBB, 0xCC]); // IDR slice

        let out = a.rewrite_sample(&data, true).unwrap();
        assert!(a.configuration_record().is_some());
        assert_eq!(&out[0..4], &[0, 0, 0, 2]);
    }
}
