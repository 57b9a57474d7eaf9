//! MPEG-2 Transport Stream segmenter: PAT/PMT/PES/PCR/continuity-counter
//! packetizer. Unlike the fMP4 path this writes directly into 188-byte
//! packets rather than two-pass box sizing -- TS packets are fixed-size and
//! never need a size patched after the fact.

use base::bail;

use crate::model::{CodecTag, MediaSample, StreamInfo, TrackType};

pub const PACKET_SIZE: usize = 188;
const SYNC_BYTE: u8 = 0x47;
const PID_PAT: u16 = 0x0000;
const PID_PMT: u16 = 0x0020;
const PID_VIDEO: u16 = 0x0040;
const PID_AUDIO: u16 = 0x0041;
const TABLE_ID_PAT: u8 = 0x00;
const TABLE_ID_PMT: u8 = 0x02;

const STREAM_TYPE_H264: u8 = 0x1b;
const STREAM_TYPE_H265: u8 = 0x24;
const STREAM_TYPE_AAC_ADTS: u8 = 0x0f;
const STREAM_TYPE_AC3: u8 = 0x81;

fn stream_type(codec: CodecTag) -> Result<u8, base::Error> {
    Ok(match codec {
        CodecTag::H264 => STREAM_TYPE_H264,
        CodecTag::H265 => STREAM_TYPE_H265,
        CodecTag::Aac => STREAM_TYPE_AAC_ADTS,
        CodecTag::Ac3 => STREAM_TYPE_AC3,
        other => bail!(MuxerFailure, msg("codec {other:?} has no MPEG-TS stream_type mapping")),
    })
}

/// Table-section CRC-32/MPEG-2 (poly 0x04C11DB7, no reflection, init
/// 0xFFFFFFFF), used by both the PAT and PMT sections.
fn crc32_mpeg2(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 { (crc << 1) ^ 0x04C1_1DB7 } else { crc << 1 };
        }
    }
    crc
}

struct TsHeader {
    pid: u16,
    payload_unit_start: bool,
    adaptation_field: bool,
    has_payload: bool,
    continuity_counter: u8,
}

impl TsHeader {
    fn write(&self, out: &mut Vec<u8>) {
        out.push(SYNC_BYTE);
        let b1 = ((self.payload_unit_start as u16) << 6) | (self.pid >> 8);
        out.push(b1 as u8);
        out.push((self.pid & 0xFF) as u8);
        let afc = match (self.adaptation_field, self.has_payload) {
            (true, true) => 0b11,
            (true, false) => 0b10,
            (false, true) => 0b01,
            (false, false) => 0b00,
        };
        out.push((afc << 4) | (self.continuity_counter & 0x0F));
    }
}

/// One elementary-stream track registered with the muxer.
pub struct TsTrack {
    pub pid: u16,
    pub codec: CodecTag,
    pub track_type: TrackType,
    timescale: u32,
    continuity_counter: u8,
}

pub struct TsSegmenter {
    tracks: Vec<TsTrack>,
    pcr_pid: u16,
    pcr_emitted_this_segment: bool,
    m2ts_offset_ms: i64,
}

impl TsSegmenter {
    pub fn new(streams: &[StreamInfo], m2ts_offset_ms: i64) -> Result<Self, base::Error> {
        if streams.is_empty() {
            bail!(MuxerFailure, msg("MPEG-TS segmenter needs at least one stream"));
        }
        let mut tracks = Vec::new();
        let mut video_pid = None;
        let mut next_audio_pid = PID_AUDIO;
        for s in streams {
            let pid = match s.track_type {
                TrackType::Video => {
                    let pid = PID_VIDEO;
                    video_pid = Some(pid);
                    pid
                }
                TrackType::Audio => {
                    let pid = next_audio_pid;
                    next_audio_pid += 1;
                    pid
                }
                TrackType::Text => bail!(MuxerFailure, msg("MPEG-TS segmenter does not carry text tracks")),
            };
            tracks.push(TsTrack {
                pid,
                codec: s.codec,
                track_type: s.track_type,
                timescale: s.timescale,
                continuity_counter: 0,
            });
        }
        let pcr_pid = video_pid.unwrap_or(tracks[0].pid);
        Ok(TsSegmenter {
            tracks,
            pcr_pid,
            pcr_emitted_this_segment: false,
            m2ts_offset_ms,
        })
    }

    /// The PID this segmenter assigned to the given track type, if it
    /// carries one. Callers tagging samples for `build_segment` should
    /// look the PID up here rather than guessing at the allocation scheme.
    pub fn pid_for(&self, track_type: TrackType) -> Option<u16> {
        self.tracks.iter().find(|t| t.track_type == track_type).map(|t| t.pid)
    }

    fn next_cc(&mut self, pid: u16) -> u8 {
        let t = self.tracks.iter_mut().find(|t| t.pid == pid).expect("unknown pid");
        let cc = t.continuity_counter;
        t.continuity_counter = (t.continuity_counter + 1) & 0x0F;
        cc
    }

    fn write_pat(&self, out: &mut Vec<u8>) {
        let mut payload = Vec::new();
        payload.push(0); // pointer_field
        payload.push(TABLE_ID_PAT);

        let mut body = Vec::new();
        body.extend_from_slice(&1u16.to_be_bytes()); // program_number
        body.extend_from_slice(&(0xE000 | PID_PMT).to_be_bytes());

        let section_length = body.len() + 5 + 4; // + header fields + crc
        payload.extend_from_slice(&((0xB000u16) | section_length as u16).to_be_bytes());
        payload.extend_from_slice(&1u16.to_be_bytes()); // transport_stream_id
        payload.push(0xC1); // version 0, current_next_indicator=1
        payload.push(0); // section_number
        payload.push(0); // last_section_number
        payload.extend_from_slice(&body);

        let crc = crc32_mpeg2(&payload[1..]); // from table_id through the end of body
        payload.extend_from_slice(&crc.to_be_bytes());

        self.write_section_packet(out, PID_PAT, &payload, 0);
    }

    fn write_pmt(&self, out: &mut Vec<u8>) -> Result<(), base::Error> {
        let mut payload = Vec::new();
        payload.push(0); // pointer_field
        payload.push(TABLE_ID_PMT);

        let mut body = Vec::new();
        body.extend_from_slice(&(0xE000 | self.pcr_pid).to_be_bytes());
        body.extend_from_slice(&0xF000u16.to_be_bytes()); // program_info_length = 0

        for t in &self.tracks {
            body.push(stream_type(t.codec)?);
            body.extend_from_slice(&(0xE000 | t.pid).to_be_bytes());
            body.extend_from_slice(&0xF000u16.to_be_bytes()); // ES_info_length = 0
        }

        let section_length = body.len() + 5 + 4;
        payload.extend_from_slice(&((0xB000u16) | section_length as u16).to_be_bytes());
        payload.extend_from_slice(&1u16.to_be_bytes()); // program_number
        payload.push(0xC1);
        payload.push(0);
        payload.push(0);
        payload.extend_from_slice(&body);

        let crc = crc32_mpeg2(&payload[1..]);
        payload.extend_from_slice(&crc.to_be_bytes());

        self.write_section_packet(out, PID_PMT, &payload, 0);
        Ok(())
    }

    fn write_section_packet(&self, out: &mut Vec<u8>, pid: u16, payload: &[u8], cc: u8) {
        let header = TsHeader {
            pid,
            payload_unit_start: true,
            adaptation_field: false,
            has_payload: true,
            continuity_counter: cc,
        };
        let mut packet = Vec::with_capacity(PACKET_SIZE);
        header.write(&mut packet);
        packet.extend_from_slice(payload);
        packet.resize(PACKET_SIZE, 0xFF);
        out.extend_from_slice(&packet);
    }

    /// Packetizes one access unit's PES payload into one or more 188-byte
    /// TS packets, emitting a PCR on the first video keyframe packet of a
    /// segment (the only PCR emission point the engine guarantees).
    fn write_pes(&mut self, out: &mut Vec<u8>, pid: u16, pts_90k: u64, is_key_frame: bool, data: &[u8]) {
        let track_type = self.tracks.iter().find(|t| t.pid == pid).map(|t| t.track_type);
        let stream_id = match track_type {
            Some(TrackType::Audio) => 0xC0,
            Some(TrackType::Text) => 0xBD,
            _ => 0xE0,
        };
        let mut pes = Vec::with_capacity(data.len() + 19);
        pes.extend_from_slice(&[0x00, 0x00, 0x01]); // packet_start_code_prefix
        pes.push(stream_id);
        let pes_len = data.len() + 8; // flags + header_data_length + PTS(5)
        pes.extend_from_slice(&(pes_len.min(0xFFFF) as u16).to_be_bytes());
        pes.push(0x80); // '10' marker, no scrambling, no priority
        pes.push(0x80); // PTS_DTS_flags = '10' (PTS only)
        pes.push(5); // PES_header_data_length
        write_pts(&mut pes, pts_90k);
        pes.extend_from_slice(data);

        let emit_pcr = is_key_frame && pid == self.pcr_pid && !self.pcr_emitted_this_segment;
        let mut offset = 0;
        let mut first = true;
        while offset < pes.len() {
            let cc = self.next_cc(pid);
            let mut packet = Vec::with_capacity(PACKET_SIZE);
            let want_pcr = first && emit_pcr;
            let mut header_len = 4;
            let mut adaptation_len = 0usize;
            if want_pcr {
                adaptation_len = 1 + 6; // adaptation_field_length byte + flags + PCR
                header_len += adaptation_len;
            }
            let remaining_payload_cap = PACKET_SIZE - header_len;
            let chunk_len = remaining_payload_cap.min(pes.len() - offset);
            let stuffing = remaining_payload_cap - chunk_len;

            let header = TsHeader {
                pid,
                payload_unit_start: first,
                adaptation_field: want_pcr || stuffing > 0,
                has_payload: true,
                continuity_counter: cc,
            };
            header.write(&mut packet);

            if header.adaptation_field {
                let af_len = (if want_pcr { 6 } else { 0 }) + stuffing;
                packet.push(af_len as u8);
                if af_len > 0 {
                    let flags = if want_pcr { 0x10 } else { 0x00 };
                    packet.push(flags);
                    if want_pcr {
                        write_pcr(&mut packet, pts_90k);
                    }
                    for _ in 0..stuffing {
                        packet.push(0xFF);
                    }
                }
            }

            packet.extend_from_slice(&pes[offset..offset + chunk_len]);
            out.extend_from_slice(&packet);

            offset += chunk_len;
            first = false;
        }

        if emit_pcr {
            self.pcr_emitted_this_segment = true;
        }
    }

    /// Produces one TS segment: PAT, PMT, then every sample's PES
    /// packetization in the order given. The first packet is always PAT
    /// (PID 0), the second PMT (PID 0x20), per the engine's stated
    /// guarantee.
    pub fn build_segment(&mut self, samples: &[(u16, MediaSample)]) -> Result<Vec<u8>, base::Error> {
        if self.m2ts_offset_ms < 0 {
            bail!(MuxerFailure, msg("m2ts_offset_ms must be non-negative"));
        }
        self.pcr_emitted_this_segment = false;
        let mut out = Vec::new();
        self.write_pat(&mut out);
        self.write_pmt(&mut out)?;

        let offset_90k = self.m2ts_offset_ms * 90;
        let mut last_dts = i64::MIN;
        for (pid, sample) in samples {
            let timescale = self
                .tracks
                .iter()
                .find(|t| t.pid == *pid)
                .map(|t| t.timescale)
                .ok_or_else(|| base::err!(MuxerFailure, msg("MPEG-TS sample references unknown pid {pid}")))?;
            if sample.dts < last_dts {
                bail!(ParserFailure, msg("MPEG-TS samples must be presented in DTS order"));
            }
            last_dts = sample.dts;
            let pts_90k = base::time::rescale(sample.pts, timescale, 90_000);
            let pts = pts_90k + offset_90k;
            if pts < 0 {
                bail!(MuxerFailure, msg("m2ts_offset_ms produced a negative PTS"));
            }
            self.write_pes(&mut out, *pid, pts as u64, sample.is_key_frame, &sample.data);
        }
        Ok(out)
    }
}

fn write_pts(out: &mut Vec<u8>, pts_90k: u64) {
    let pts = pts_90k & 0x1_FFFF_FFFF;
    let b0 = 0x21 | (((pts >> 30) & 0x7) << 1) as u8;
    let b1 = ((pts >> 22) & 0xFF) as u8;
    let b2 = (((pts >> 15) & 0x7F) << 1 | 1) as u8;
    let b3 = ((pts >> 7) & 0xFF) as u8;
    let b4 = (((pts & 0x7F) << 1) | 1) as u8;
    out.extend_from_slice(&[b0, b1, b2, b3, b4]);
}

fn write_pcr(out: &mut Vec<u8>, pts_90k: u64) {
    // PCR is a 27 MHz clock expressed as base (90 kHz, 33 bits) + extension
    // (27 MHz remainder, 9 bits); the packager has no sub-90kHz timing
    // source, so the extension is always zero.
    let base = pts_90k & 0x1_FFFF_FFFF;
    let value: u64 = (base << 15) | 0x7E00 | 0; // reserved 6 bits = 1, extension = 0
    out.extend_from_slice(&value.to_be_bytes()[2..]); // top 48 bits of the 64-bit shifted value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AudioInfo, TransferCharacteristics, VideoInfo};

    fn video_stream() -> StreamInfo {
        StreamInfo {
            track_type: TrackType::Video,
            codec: CodecTag::H264,
            codec_config: vec![],
            track_id: 1,
            timescale: 90_000,
            duration: None,
            language: "und".to_string(),
            video: Some(VideoInfo {
                width: 1280,
                height: 720,
                pixel_aspect_ratio: (1, 1),
                nalu_length_size: 4,
                transfer_characteristics: TransferCharacteristics::Bt709,
            }),
            audio: None,
        }
    }

    fn audio_stream() -> StreamInfo {
        StreamInfo {
            track_type: TrackType::Audio,
            codec: CodecTag::Aac,
            codec_config: vec![],
            track_id: 2,
            timescale: 44_100,
            duration: None,
            language: "und".to_string(),
            video: None,
            audio: Some(AudioInfo {
                sample_rate: 44_100,
                channel_count: 2,
                bits_per_sample: 16,
                seek_preroll_ns: 0,
                codec_delay_ns: 0,
            }),
        }
    }

    fn sample(dts: i64, key: bool) -> MediaSample {
        MediaSample {
            dts,
            pts: dts,
            duration: 3000,
            is_key_frame: key,
            data: vec![0x42; 50],
            side_data: None,
            decrypt_config: None,
        }
    }

    #[test]
    fn segment_starts_with_pat_then_pmt() {
        let streams = vec![video_stream(), audio_stream()];
        let mut seg = TsSegmenter::new(&streams, 0).unwrap();
        let samples = vec![(PID_VIDEO, sample(0, true)), (PID_AUDIO, sample(0, false))];
        let out = seg.build_segment(&samples).unwrap();

        assert_eq!(out.len() % PACKET_SIZE, 0);
        let pid0 = (((out[1] as u16) & 0x1F) << 8) | out[2] as u16;
        assert_eq!(pid0, PID_PAT);
        let pid1 = (((out[PACKET_SIZE + 1] as u16) & 0x1F) << 8) | out[PACKET_SIZE + 2] as u16;
        assert_eq!(pid1, PID_PMT);
    }

    #[test]
    fn pmt_pcr_pid_matches_video_pid() {
        let streams = vec![video_stream(), audio_stream()];
        let seg = TsSegmenter::new(&streams, 0).unwrap();
        assert_eq!(seg.pcr_pid, PID_VIDEO);
    }

    #[test]
    fn rejects_out_of_order_dts() {
        let streams = vec![video_stream()];
        let mut seg = TsSegmenter::new(&streams, 0).unwrap();
        let samples = vec![(PID_VIDEO, sample(10, true)), (PID_VIDEO, sample(5, false))];
        assert!(seg.build_segment(&samples).is_err());
    }

    #[test]
    fn rejects_text_track() {
        let mut s = video_stream();
        s.track_type = TrackType::Text;
        assert!(TsSegmenter::new(&[s], 0).is_err());
    }
}
