//! Opus OpusSpecificBox parsing. Opus always reports a fixed 48 kHz output
//! sample rate to the packager regardless of the source's preskip/gain
//! fields, per RFC 7845 section 5.

use base::bail;

const OPUS_OUTPUT_SAMPLE_RATE: u32 = 48_000;

#[derive(Clone, Debug, Default)]
pub struct OpusConfig {
    pub version: u8,
    pub channel_count: u8,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
    pub output_gain: i16,
    pub channel_mapping_family: u8,
}

/// Parses an RFC 7845 identification-header-shaped OpusSpecificBox payload:
/// Version(1) ChannelCount(1) PreSkip(2,LE) InputSampleRate(4,LE)
/// OutputGain(2,LE) ChannelMappingFamily(1).
pub fn parse_opus_specific_box(data: &[u8]) -> Result<OpusConfig, base::Error> {
    if data.len() < 11 {
        bail!(ParserFailure, msg("OpusSpecificBox shorter than 11 bytes"));
    }
    Ok(OpusConfig {
        version: data[0],
        channel_count: data[1],
        pre_skip: u16::from_le_bytes([data[2], data[3]]),
        input_sample_rate: u32::from_le_bytes([data[4], data[5], data[6], data[7]]),
        output_gain: i16::from_le_bytes([data[8], data[9]]),
        channel_mapping_family: data[10],
    })
}

#[derive(Default)]
pub struct OpusAdapter {
    config: Option<OpusConfig>,
}

impl OpusAdapter {
    pub fn set_config(&mut self, data: &[u8]) -> Result<(), base::Error> {
        self.config = Some(parse_opus_specific_box(data)?);
        Ok(())
    }

    pub fn configuration_record(&self) -> Option<Vec<u8>> {
        let c = self.config.as_ref()?;
        let mut out = Vec::with_capacity(11);
        out.push(c.version);
        out.push(c.channel_count);
        out.extend_from_slice(&c.pre_skip.to_le_bytes());
        out.extend_from_slice(&c.input_sample_rate.to_le_bytes());
        out.extend_from_slice(&c.output_gain.to_le_bytes());
        out.push(c.channel_mapping_family);
        Some(out)
    }

    pub fn output_sample_rate(&self) -> u32 {
        OPUS_OUTPUT_SAMPLE_RATE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_reports_48khz_regardless_of_input_rate() {
        let mut a = OpusAdapter::default();
        let mut payload = vec![1u8, 2]; // version, channels
        payload.extend_from_slice(&1000u16.to_le_bytes()); // pre_skip
        payload.extend_from_slice(&44100u32.to_le_bytes()); // input_sample_rate
        payload.extend_from_slice(&0i16.to_le_bytes()); // output_gain
        payload.push(0); // mapping family
        a.set_config(&payload).unwrap();
        assert_eq!(a.output_sample_rate(), 48_000);
        assert_eq!(a.config.as_ref().unwrap().input_sample_rate, 44100);
    }

    #[test]
    fn rejects_short_payload() {
        assert!(parse_opus_specific_box(&[0u8; 5]).is_err());
    }
}
