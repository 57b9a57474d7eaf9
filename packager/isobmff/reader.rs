//! Minimal ISO-BMFF reader: just enough to recover a `StreamInfo` from an
//! init segment and a sample list from a media segment, per the Non-goal
//! that this is not a general-purpose ISO-BMFF reader.

use base::{bail, err};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use super::box_type as bt;
use super::BoxHeader;
use crate::model::{AudioInfo, CodecTag, MediaSample, StreamInfo, TrackType, VideoInfo};

/// Walks the top-level (or `boxes`-contained) box list, calling `f` with
/// each header and a byte slice of its payload.
fn for_each_box<'a>(
    data: &'a [u8],
    mut f: impl FnMut([u8; 4], &'a [u8]) -> Result<(), base::Error>,
) -> Result<(), base::Error> {
    let mut off = 0usize;
    while off < data.len() {
        let header = read_box_header(data, off)?;
        let payload = &data[header.payload_start..header.end];
        f(header.box_type, payload)?;
        off = header.end;
    }
    Ok(())
}

fn read_box_header(data: &[u8], off: usize) -> Result<BoxHeader, base::Error> {
    if data.len() - off < 8 {
        bail!(ParserFailure, msg("box header truncated at offset {}", off));
    }
    let mut size = u32::from_be_bytes(data[off..off + 4].try_into().unwrap()) as u64;
    let box_type: [u8; 4] = data[off + 4..off + 8].try_into().unwrap();
    let mut header_len = 8usize;
    if size == 1 {
        if data.len() - off < 16 {
            bail!(ParserFailure, msg("extended box header truncated"));
        }
        size = u64::from_be_bytes(data[off + 8..off + 16].try_into().unwrap());
        header_len = 16;
    } else if size == 0 {
        size = (data.len() - off) as u64; // extends to end of input
    }
    if size < header_len as u64 {
        bail!(ParserFailure, msg("box {:?} declared size smaller than header", box_type));
    }
    let end = off
        .checked_add(size as usize)
        .filter(|&e| e <= data.len())
        .ok_or_else(|| err!(ParserFailure, msg("box {:?} declared size exceeds input", box_type)))?;
    Ok(BoxHeader {
        box_type,
        payload_start: off + header_len,
        end,
    })
}

fn fullbox_version_flags(payload: &[u8]) -> Result<(u8, u32, &[u8]), base::Error> {
    if payload.len() < 4 {
        bail!(ParserFailure, msg("full box header truncated"));
    }
    let version = payload[0];
    let flags = u32::from_be_bytes([0, payload[1], payload[2], payload[3]]);
    Ok((version, flags, &payload[4..]))
}

/// Result of parsing an initialization segment.
pub struct ParsedInit {
    pub stream_info: StreamInfo,
}

pub fn parse_init_segment(data: &[u8]) -> Result<ParsedInit, base::Error> {
    let mut found_ftyp = false;
    let mut stream_info: Option<StreamInfo> = None;

    for_each_box(data, |ty, payload| {
        match &ty {
            t if *t == bt::FTYP => {
                found_ftyp = true;
            }
            t if *t == bt::MOOV => {
                stream_info = Some(parse_moov(payload)?);
            }
            _ => {}
        }
        Ok(())
    })?;

    if !found_ftyp {
        bail!(ParserFailure, msg("init segment missing ftyp box"));
    }
    let stream_info = stream_info.ok_or_else(|| err!(ParserFailure, msg("init segment missing moov box")))?;
    Ok(ParsedInit { stream_info })
}

fn parse_moov(data: &[u8]) -> Result<StreamInfo, base::Error> {
    let mut result = None;
    for_each_box(data, |ty, payload| {
        if ty == bt::TRAK {
            result = Some(parse_trak(payload)?);
        }
        Ok(())
    })?;
    result.ok_or_else(|| err!(ParserFailure, msg("moov missing trak box")))
}

fn parse_trak(data: &[u8]) -> Result<StreamInfo, base::Error> {
    let mut track_id = 0u32;
    let mut mdia: Option<&[u8]> = None;
    for_each_box(data, |ty, payload| {
        match &ty {
            t if *t == bt::TKHD => {
                let (_v, _f, rest) = fullbox_version_flags(payload)?;
                // version-1 tkhd: creation(8)+modification(8)+track_ID(4)
                if rest.len() >= 20 {
                    track_id = u32::from_be_bytes(rest[16..20].try_into().unwrap());
                }
            }
            t if *t == bt::MDIA => {
                mdia = Some(payload);
            }
            _ => {}
        }
        Ok(())
    })?;
    let mdia = mdia.ok_or_else(|| err!(ParserFailure, msg("trak missing mdia box")))?;
    parse_mdia(mdia, track_id)
}

fn parse_mdia(data: &[u8], track_id: u32) -> Result<StreamInfo, base::Error> {
    let mut timescale = 0u32;
    let mut duration = None;
    let mut language = String::from("und");
    let mut track_type = None;
    let mut stsd: Option<&[u8]> = None;

    for_each_box(data, |ty, payload| {
        match &ty {
            t if *t == bt::MDHD => {
                let (version, _f, rest) = fullbox_version_flags(payload)?;
                let mut c = Cursor::new(rest);
                let (ts, dur, lang_code) = if version == 1 {
                    c.read_u64::<BigEndian>().ok();
                    c.read_u64::<BigEndian>().ok();
                    let ts = c.read_u32::<BigEndian>().unwrap_or(0);
                    let dur = c.read_u64::<BigEndian>().unwrap_or(0);
                    let lang = c.read_u16::<BigEndian>().unwrap_or(0);
                    (ts, dur, lang)
                } else {
                    c.read_u32::<BigEndian>().ok();
                    c.read_u32::<BigEndian>().ok();
                    let ts = c.read_u32::<BigEndian>().unwrap_or(0);
                    let dur = c.read_u32::<BigEndian>().unwrap_or(0) as u64;
                    let lang = c.read_u16::<BigEndian>().unwrap_or(0);
                    (ts, dur, lang)
                };
                timescale = ts;
                duration = if dur == 0 { None } else { Some(dur) };
                language = decode_lang(lang_code);
            }
            t if *t == bt::HDLR => {
                let (_v, _f, rest) = fullbox_version_flags(payload)?;
                if rest.len() >= 8 {
                    track_type = Some(match &rest[4..8] {
                        b"vide" => TrackType::Video,
                        b"soun" => TrackType::Audio,
                        _ => TrackType::Text,
                    });
                }
            }
            t if *t == bt::MINF => {
                for_each_box(payload, |ty2, payload2| {
                    if ty2 == bt::STBL {
                        for_each_box(payload2, |ty3, payload3| {
                            if ty3 == bt::STSD {
                                stsd = Some(payload3);
                            }
                            Ok(())
                        })?;
                    }
                    Ok(())
                })?;
            }
            _ => {}
        }
        Ok(())
    })?;

    let track_type = track_type.ok_or_else(|| err!(ParserFailure, msg("mdia missing hdlr box")))?;
    let stsd = stsd.ok_or_else(|| err!(ParserFailure, msg("stbl missing stsd box")))?;
    let (codec, codec_config, video, audio) = parse_stsd(stsd, track_type)?;

    Ok(StreamInfo {
        track_type,
        codec,
        codec_config,
        track_id,
        timescale,
        duration,
        language,
        video,
        audio,
    })
}

fn decode_lang(code: u16) -> String {
    let mut out = [0u8; 3];
    for i in 0..3 {
        let shift = 10 - i * 5;
        let v = ((code >> shift) & 0x1f) as u8;
        out[i] = b'a' + v;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn parse_stsd(
    data: &[u8],
    track_type: TrackType,
) -> Result<(CodecTag, Vec<u8>, Option<VideoInfo>, Option<AudioInfo>), base::Error> {
    if data.len() < 8 {
        bail!(ParserFailure, msg("stsd truncated"));
    }
    let entry = &data[8..]; // skip FullBox header (4) + entry_count (4)
    let header = read_box_header(entry, 0)?;
    let sample_entry_type = header.box_type;
    let sample_entry = &entry[header.payload_start..header.end];

    let codec = codec_tag_from_sample_entry(&sample_entry_type)
        .ok_or_else(|| err!(ParserFailure, msg("unrecognized sample entry {:?}", sample_entry_type)))?;

    match track_type {
        TrackType::Video => {
            if sample_entry.len() < 78 {
                bail!(ParserFailure, msg("visual sample entry truncated"));
            }
            let width = u16::from_be_bytes(sample_entry[24..26].try_into().unwrap()) as u32;
            let height = u16::from_be_bytes(sample_entry[26..28].try_into().unwrap()) as u32;
            let mut codec_config = Vec::new();
            let mut pasp = (1u32, 1u32);
            for_each_box(&sample_entry[78..], |ty, payload| {
                if ty == bt::PASP && payload.len() >= 8 {
                    pasp = (
                        u32::from_be_bytes(payload[0..4].try_into().unwrap()),
                        u32::from_be_bytes(payload[4..8].try_into().unwrap()),
                    );
                } else if codec_config.is_empty() {
                    codec_config = payload.to_vec();
                }
                Ok(())
            })?;
            Ok((
                codec,
                codec_config,
                Some(VideoInfo {
                    width,
                    height,
                    pixel_aspect_ratio: pasp,
                    nalu_length_size: 4,
                    transfer_characteristics: crate::model::TransferCharacteristics::Bt709,
                }),
                None,
            ))
        }
        TrackType::Audio => {
            if sample_entry.len() < 20 {
                bail!(ParserFailure, msg("audio sample entry truncated"));
            }
            let channel_count = u16::from_be_bytes(sample_entry[8..10].try_into().unwrap());
            let bits_per_sample = u16::from_be_bytes(sample_entry[10..12].try_into().unwrap());
            let sample_rate = (u32::from_be_bytes(sample_entry[16..20].try_into().unwrap())) >> 16;
            let mut codec_config = Vec::new();
            for_each_box(&sample_entry[20..], |_ty, payload| {
                if codec_config.is_empty() {
                    codec_config = payload.to_vec();
                }
                Ok(())
            })?;
            Ok((
                codec,
                codec_config,
                None,
                Some(AudioInfo {
                    sample_rate,
                    channel_count,
                    bits_per_sample,
                    seek_preroll_ns: 0,
                    codec_delay_ns: 0,
                }),
            ))
        }
        TrackType::Text => Ok((codec, sample_entry.to_vec(), None, None)),
    }
}

fn codec_tag_from_sample_entry(box_type: &[u8; 4]) -> Option<CodecTag> {
    Some(match box_type {
        t if *t == bt::AVC1 => CodecTag::H264,
        t if *t == bt::HEV1 => CodecTag::H265,
        t if *t == bt::MP4A => CodecTag::Aac,
        t if *t == bt::AC3_ => CodecTag::Ac3,
        t if *t == bt::EC3_ => CodecTag::Eac3,
        t if *t == bt::OPUS => CodecTag::Opus,
        t if *t == bt::VP08 => CodecTag::Vp8,
        t if *t == bt::VP09 => CodecTag::Vp9,
        _ => return None,
    })
}

/// Parses a `moof`+`mdat` media segment into the track's samples, using
/// `timescale` purely for diagnostics (the returned sample timestamps stay
/// in the track's native tick units).
pub fn parse_media_segment(data: &[u8]) -> Result<Vec<MediaSample>, base::Error> {
    let mut moof_payload: Option<&[u8]> = None;
    let mut mdat_payload: Option<&[u8]> = None;

    for_each_box(data, |ty, payload| {
        if ty == bt::MOOF {
            moof_payload = Some(payload);
        } else if ty == bt::MDAT {
            mdat_payload = Some(payload);
        }
        Ok(())
    })?;

    let moof = moof_payload.ok_or_else(|| err!(ParserFailure, msg("media segment missing moof box")))?;
    let mdat = mdat_payload.ok_or_else(|| err!(ParserFailure, msg("media segment missing mdat box")))?;

    let mut traf_payload: Option<&[u8]> = None;
    for_each_box(moof, |ty, payload| {
        if ty == bt::TRAF {
            traf_payload = Some(payload);
        }
        Ok(())
    })?;
    let traf = traf_payload.ok_or_else(|| err!(ParserFailure, msg("moof missing traf box")))?;

    let mut base_decode_time = 0i64;
    let mut durations = Vec::new();
    let mut sizes = Vec::new();
    let mut flags_list: Vec<u32> = Vec::new();
    let mut cts_offsets = Vec::new();

    for_each_box(traf, |ty, payload| {
        if ty == bt::TFDT {
            let (version, _f, rest) = fullbox_version_flags(payload)?;
            let mut c = Cursor::new(rest);
            base_decode_time = if version == 1 {
                c.read_u64::<BigEndian>().unwrap_or(0) as i64
            } else {
                c.read_u32::<BigEndian>().unwrap_or(0) as i64
            };
        } else if ty == bt::TRUN {
            let (_version, flags, rest) = fullbox_version_flags(payload)?;
            let mut c = Cursor::new(rest);
            let sample_count = c.read_u32::<BigEndian>().unwrap_or(0);
            if flags & 0x1 != 0 {
                c.read_i32::<BigEndian>().ok();
            }
            let first_sample_flags_present = flags & 0x4 != 0;
            let has_duration = flags & 0x100 != 0;
            let has_size = flags & 0x200 != 0;
            let has_flags = flags & 0x400 != 0;
            let has_cts = flags & 0x800 != 0;
            let mut first_flags = 0u32;
            if first_sample_flags_present {
                first_flags = c.read_u32::<BigEndian>().unwrap_or(0);
            }
            for i in 0..sample_count {
                let dur = if has_duration { c.read_u32::<BigEndian>().unwrap_or(0) } else { 0 };
                let size = if has_size { c.read_u32::<BigEndian>().unwrap_or(0) } else { 0 };
                let flags_v = if has_flags {
                    c.read_u32::<BigEndian>().unwrap_or(0)
                } else if i == 0 && first_sample_flags_present {
                    first_flags
                } else {
                    0
                };
                let cts = if has_cts { c.read_i32::<BigEndian>().unwrap_or(0) } else { 0 };
                durations.push(dur);
                sizes.push(size);
                flags_list.push(flags_v);
                cts_offsets.push(cts);
            }
        }
        Ok(())
    })?;

    if sizes.iter().sum::<u32>() as usize > mdat.len() {
        bail!(ParserFailure, msg("trun sample sizes exceed mdat payload"));
    }

    let mut samples = Vec::with_capacity(sizes.len());
    let mut dts = base_decode_time;
    let mut off = 0usize;
    for i in 0..sizes.len() {
        let size = sizes[i] as usize;
        let data = mdat[off..off + size].to_vec();
        off += size;
        let is_key_frame = (flags_list[i] & 0x0001_0000) == 0;
        samples.push(MediaSample {
            dts,
            pts: dts + cts_offsets[i] as i64,
            duration: durations[i],
            is_key_frame,
            data,
            side_data: None,
            decrypt_config: None,
        });
        dts += durations[i] as i64;
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::isobmff::writer::{build_init_segment, build_media_segment, MediaSegmentParams};
    use crate::model::{AudioInfo, CodecTag, TrackType};

    fn aac_info() -> StreamInfo {
        StreamInfo {
            track_type: TrackType::Audio,
            codec: CodecTag::Aac,
            codec_config: vec![0x03, 0x19, 0x00, 0x00, 0x00],
            track_id: 1,
            timescale: 48_000,
            duration: None,
            language: "eng".to_string(),
            video: None,
            audio: Some(AudioInfo {
                sample_rate: 48_000,
                channel_count: 2,
                bits_per_sample: 16,
                seek_preroll_ns: 0,
                codec_delay_ns: 0,
            }),
        }
    }

    #[test]
    fn round_trip_init_segment_stream_info() {
        let info = aac_info();
        let cfg = Config::default();
        let bytes = build_init_segment(&info, &cfg).unwrap();
        let parsed = parse_init_segment(&bytes).unwrap();
        assert_eq!(parsed.stream_info.codec, CodecTag::Aac);
        assert_eq!(parsed.stream_info.timescale, 48_000);
        assert_eq!(parsed.stream_info.language, "eng");
        assert_eq!(
            parsed.stream_info.audio.unwrap().channel_count,
            2
        );
    }

    #[test]
    fn round_trip_media_segment_samples() {
        let info = aac_info();
        let cfg = Config::default();
        let samples = vec![MediaSample {
            dts: 0,
            pts: 0,
            duration: 1024,
            is_key_frame: true,
            data: vec![1, 2, 3, 4],
            side_data: None,
            decrypt_config: None,
        }];
        let params = MediaSegmentParams {
            info: &info,
            cfg: &cfg,
            sequence_number: 1,
            base_decode_time: 500,
        };
        let bytes = build_media_segment(&samples, &params).unwrap();
        let parsed = parse_media_segment(&bytes).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].dts, 500);
        assert_eq!(parsed[0].data, vec![1, 2, 3, 4]);
        assert_eq!(parsed[0].duration, 1024);
    }
}
