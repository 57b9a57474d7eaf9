//! AAC AudioSpecificConfig parsing and ADTS header emission.

use base::{bail, err};

const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

#[derive(Clone, Debug, Default)]
pub struct AudioSpecificConfig {
    pub object_type: u8,
    pub sampling_frequency_index: u8,
    pub channel_configuration: u8,
    pub sbr_present: bool,
    pub extension_sampling_frequency_index: Option<u8>,
}

/// Reads the 5-bit object type, 4-bit sampling-frequency-index (or 24-bit
/// explicit rate if index==0xF, not modeled here since live sources always
/// signal standard rates), 4-bit channel-configuration, and an optional
/// SBR/PS extension per ISO 14496-3 section 1.6.
pub fn parse_audio_specific_config(asc: &[u8]) -> Result<AudioSpecificConfig, base::Error> {
    if asc.len() < 2 {
        bail!(ParserFailure, msg("AudioSpecificConfig shorter than 2 bytes"));
    }
    let mut bits: u32 = (asc[0] as u32) << 8 | asc[1] as u32;
    let mut consumed = 16u32;
    let object_type = (bits >> 11) as u8 & 0x1f;
    let sampling_frequency_index = (bits >> 7) as u8 & 0x0f;
    let channel_configuration = (bits >> 3) as u8 & 0x0f;

    let mut sbr_present = false;
    let mut ext_freq_idx = None;
    if object_type == 5 || object_type == 29 {
        // SBR (and PS) extension: explicit sync extension present at the
        // start of the buffer (common for explicit-backward-compatible
        // streams); best-effort read of the remaining byte(s) if present.
        sbr_present = true;
        if asc.len() >= 3 {
            bits = (bits << 8) | asc[2] as u32;
            consumed += 8;
            ext_freq_idx = Some(((bits >> (consumed - 16 - 4)) & 0x0f) as u8);
        }
    }

    Ok(AudioSpecificConfig {
        object_type,
        sampling_frequency_index,
        channel_configuration,
        sbr_present,
        extension_sampling_frequency_index: ext_freq_idx,
    })
}

fn sample_rate_for(idx: u8) -> Option<u32> {
    SAMPLING_FREQUENCIES.get(idx as usize).copied()
}

#[derive(Default)]
pub struct AacAdapter {
    asc: Option<AudioSpecificConfig>,
    raw_asc: Vec<u8>,
}

impl AacAdapter {
    pub fn set_audio_specific_config(&mut self, asc_bytes: &[u8]) -> Result<(), base::Error> {
        let asc = parse_audio_specific_config(asc_bytes)?;
        if asc.object_type > 4 {
            bail!(
                ParserFailure,
                msg("AAC object_type {} not allowed in ADTS output", asc.object_type)
            );
        }
        self.raw_asc = asc_bytes.to_vec();
        self.asc = Some(asc);
        Ok(())
    }

    /// Prepends a 7-byte ADTS header (no CRC) to a raw AAC frame.
    /// `frame_length` covers header + payload, per ISO 13818-7 Annex B.
    pub fn rewrite_sample(&mut self, data: &[u8]) -> Result<Vec<u8>, base::Error> {
        let asc = self
            .asc
            .as_ref()
            .ok_or_else(|| err!(ParserFailure, msg("AAC adapter used before AudioSpecificConfig set")))?;

        let profile = asc.object_type.saturating_sub(1); // ADTS profile = object_type - 1
        let mut freq_idx = asc.sampling_frequency_index;
        let mut channels = asc.channel_configuration;
        if asc.sbr_present {
            // Implicit SBR doubles the reported sample rate; mono base with
            // SBR still reports at least stereo downstream.
            if let Some(ext_idx) = asc.extension_sampling_frequency_index {
                freq_idx = ext_idx;
            }
            channels = channels.max(2);
        }

        let frame_length = 7u32 + data.len() as u32;
        let mut header = [0u8; 7];
        header[0] = 0xFF;
        header[1] = 0xF1; // MPEG-4, no CRC
        header[2] = (profile << 6) | (freq_idx << 2) | (channels >> 2);
        header[3] = (channels & 0x3) << 6 | ((frame_length >> 11) as u8 & 0x3);
        header[4] = (frame_length >> 3) as u8;
        header[5] = ((frame_length & 0x7) << 5) as u8 | 0x1F;
        header[6] = 0xFC;

        let mut out = Vec::with_capacity(7 + data.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(data);
        Ok(out)
    }

    /// esds payload bytes; the init-segment writer wraps this in the full
    /// MPEG-4 ES_Descriptor/DecoderConfigDescriptor box structure.
    pub fn configuration_record(&self) -> Option<Vec<u8>> {
        if self.raw_asc.is_empty() {
            None
        } else {
            Some(self.raw_asc.clone())
        }
    }

    pub fn sample_rate(&self) -> Option<u32> {
        let asc = self.asc.as_ref()?;
        let idx = asc
            .extension_sampling_frequency_index
            .filter(|_| asc.sbr_present)
            .unwrap_or(asc.sampling_frequency_index);
        sample_rate_for(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adts_header_matches_lc_stereo_44100() {
        let mut a = AacAdapter::default();
        a.set_audio_specific_config(&[0x12, 0x10]).unwrap();
        let payload = vec![0xAB; 50];
        let adts = a.rewrite_sample(&payload).unwrap();

        let profile = (adts[2] >> 6) & 0x3;
        let freq_idx = (adts[2] >> 2) & 0xf;
        let channels = ((adts[2] & 0x1) << 2) | (adts[3] >> 6);
        assert_eq!(profile, 1); // AAC-LC
        assert_eq!(freq_idx, 2); // 44100 Hz
        assert_eq!(channels, 2); // stereo

        let frame_length =
            ((adts[3] as u32 & 0x3) << 11) | ((adts[4] as u32) << 3) | ((adts[5] as u32) >> 5);
        assert_eq!(frame_length, 7 + payload.len() as u32);
    }

    #[test]
    fn rejects_short_asc() {
        assert!(parse_audio_specific_config(&[0x12]).is_err());
    }

    #[test]
    fn rejects_object_type_above_4() {
        let mut a = AacAdapter::default();
        // object_type = 5 (SBR) encoded in the top 5 bits: 0b00101 xxx...
        let err = a.set_audio_specific_config(&[0x2B, 0x10]);
        assert!(err.is_err());
    }
}
