//! Two-pass ISO-BMFF box writer.

use base::{err, ErrorKind};

use crate::config::{Config, ProtectionScheme as CfgProtectionScheme};
use crate::model::{CodecTag, MediaSample, StreamInfo, TrackType};

use super::box_type as bt;

/// A plain byte sink with helpers for the start-box/end-box two-pass
/// pattern. All size fields get patched in place once the box's true
/// extent is known, so nothing here ever needs to seek a real file --
/// `buf` is the entire output.
pub struct BoxWriter {
    buf: Vec<u8>,
}

impl BoxWriter {
    pub fn new() -> Self {
        BoxWriter { buf: Vec::new() }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn pos(&self) -> usize {
        self.buf.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Writes a placeholder size + the 4-char type, returning the position
    /// of the size field so the caller can pass it to [`Self::end_box`].
    pub fn start_box(&mut self, box_type: [u8; 4]) -> usize {
        let pos = self.buf.len();
        self.buf.extend_from_slice(&[0, 0, 0, 0]);
        self.buf.extend_from_slice(&box_type);
        pos
    }

    /// Like [`Self::start_box`] but also writes the FullBox
    /// version+flags header.
    pub fn start_fullbox(&mut self, box_type: [u8; 4], version: u8, flags: u32) -> usize {
        let pos = self.start_box(box_type);
        self.buf.push(version);
        let f = flags.to_be_bytes();
        self.buf.extend_from_slice(&f[1..4]);
        pos
    }

    /// Patches the size field written at `pos` by [`Self::start_box`] with
    /// the box's final size (everything written since `pos`). Uses the
    /// 64-bit extended-size form when the box grew past 2^32-1, per the
    /// box-sizing rule that only `mdat` is expected to need it.
    pub fn end_box(&mut self, pos: usize) {
        let size = self.buf.len() - pos;
        if size <= u32::MAX as usize {
            self.buf[pos..pos + 4].copy_from_slice(&(size as u32).to_be_bytes());
        } else {
            // Retrofit an extended-size header: 4-byte marker `1`, type,
            // 8-byte real size. Shifts the payload by 8 bytes.
            let box_type = [
                self.buf[pos + 4],
                self.buf[pos + 5],
                self.buf[pos + 6],
                self.buf[pos + 7],
            ];
            let mut hdr = Vec::with_capacity(16);
            hdr.extend_from_slice(&super::EXTENDED_SIZE_MARKER.to_be_bytes());
            hdr.extend_from_slice(&box_type);
            hdr.extend_from_slice(&((size + 8) as u64).to_be_bytes());
            self.buf.splice(pos..pos + 8, hdr);
        }
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }
    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    pub fn i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    pub fn u24(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes()[1..4]);
    }
    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    pub fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    pub fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    pub fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
    pub fn bytes_raw(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }
    pub fn zeros(&mut self, n: usize) {
        self.buf.resize(self.buf.len() + n, 0);
    }
}

fn cmaf_brands(track_type: TrackType) -> (&'static [u8; 4], &'static [[u8; 4]]) {
    const ISO6: [u8; 4] = *b"iso6";
    const MP41: [u8; 4] = *b"mp41";
    const CMFC: [u8; 4] = *b"cmfc";
    static VIDEO: [[u8; 4]; 3] = [ISO6, MP41, CMFC];
    static AUDIO: [[u8; 4]; 3] = [ISO6, MP41, CMFC];
    match track_type {
        TrackType::Video | TrackType::Text => (&ISO6, &VIDEO),
        TrackType::Audio => (&ISO6, &AUDIO),
    }
}

fn write_ftyp(w: &mut BoxWriter, track_type: TrackType) {
    let (major, compat) = cmaf_brands(track_type);
    let pos = w.start_box(bt::FTYP);
    w.bytes_raw(major);
    w.u32(0); // minor_version
    for c in compat {
        w.bytes_raw(c);
    }
    w.end_box(pos);
}

fn sample_entry_box_type(codec: CodecTag) -> [u8; 4] {
    match codec {
        CodecTag::H264 => bt::AVC1,
        CodecTag::H265 | CodecTag::DolbyVision => bt::HEV1,
        CodecTag::Aac => bt::MP4A,
        CodecTag::Ac3 => bt::AC3_,
        CodecTag::Eac3 => bt::EC3_,
        CodecTag::Opus => bt::OPUS,
        CodecTag::Vp8 => bt::VP08,
        CodecTag::Vp9 => bt::VP09,
        _ => bt::MP4A,
    }
}

fn config_box_type(codec: CodecTag) -> [u8; 4] {
    match codec {
        CodecTag::H264 => bt::AVCC,
        CodecTag::H265 | CodecTag::DolbyVision => bt::HVCC,
        CodecTag::Aac => bt::ESDS,
        CodecTag::Ac3 => bt::DAC3,
        CodecTag::Eac3 => bt::DEC3,
        CodecTag::Opus => bt::DOPS,
        CodecTag::Vp8 | CodecTag::Vp9 => bt::VPCC,
        _ => bt::ESDS,
    }
}

/// Writes the `sinf` protection-scheme-info box for an encrypted sample
/// entry: `frma` (original codec), `schm` (scheme type/version), `schi`
/// containing `tenc` with the default per-sample crypto parameters.
fn write_sinf(w: &mut BoxWriter, info: &StreamInfo, cfg: &Config) {
    let pos = w.start_box(bt::SINF);

    let frma_pos = w.start_box(bt::FRMA);
    w.bytes_raw(&sample_entry_box_type(info.codec));
    w.end_box(frma_pos);

    let scheme_type: [u8; 4] = match cfg.protection_scheme {
        CfgProtectionScheme::Cenc => *b"cenc",
        CfgProtectionScheme::Cbcs => *b"cbcs",
        _ => *b"cenc",
    };
    let schm_pos = w.start_fullbox(bt::SCHM, 0, 0);
    w.bytes_raw(&scheme_type);
    w.u32(0x0001_0000);
    w.end_box(schm_pos);

    let schi_pos = w.start_box(bt::SCHI);
    let is_pattern = matches!(cfg.protection_scheme, CfgProtectionScheme::Cbcs);
    let tenc_version = if is_pattern { 1 } else { 0 };
    let tenc_pos = w.start_fullbox(bt::TENC, tenc_version, 0);
    w.u8(0); // reserved
    if is_pattern {
        w.u8(0); // default_crypt_byte_block/skip_byte_block filled by caller later if needed
    } else {
        w.u8(0);
    }
    w.u8(1); // default_isProtected
    let iv_size = if cfg.iv.is_empty() { 8 } else { cfg.iv.len() as u8 };
    w.u8(iv_size);
    w.bytes_raw(&cfg.key_id_or_zero());
    w.end_box(tenc_pos);
    w.end_box(schi_pos);

    w.end_box(pos);
}

impl Config {
    fn key_id_or_zero(&self) -> [u8; 16] {
        self.key_id.unwrap_or([0u8; 16])
    }
}

fn write_sample_entry(w: &mut BoxWriter, info: &StreamInfo, cfg: &Config) {
    let protected = !matches!(cfg.protection_scheme, CfgProtectionScheme::None);
    let entry_type = if protected {
        match info.track_type {
            TrackType::Video => *b"encv",
            TrackType::Audio => *b"enca",
            TrackType::Text => sample_entry_box_type(info.codec),
        }
    } else {
        sample_entry_box_type(info.codec)
    };

    let pos = w.start_box(entry_type);
    w.zeros(6); // reserved
    w.u16(1); // data_reference_index

    match info.track_type {
        TrackType::Video => {
            let v = info.video.as_ref().expect("video StreamInfo missing VideoInfo");
            w.u16(0); // pre_defined
            w.u16(0); // reserved
            w.zeros(12); // pre_defined[3]
            w.u16(v.width as u16);
            w.u16(v.height as u16);
            w.u32(0x0048_0000); // horizresolution 72dpi
            w.u32(0x0048_0000); // vertresolution 72dpi
            w.u32(0); // reserved
            w.u16(1); // frame_count
            w.zeros(32); // compressorname
            w.u16(0x0018); // depth
            w.i16(-1); // pre_defined

            let cfg_box_pos = w.start_box(config_box_type(info.codec));
            w.bytes_raw(&info.codec_config);
            w.end_box(cfg_box_pos);

            if v.pixel_aspect_ratio != (1, 1) {
                let pasp_pos = w.start_box(bt::PASP);
                w.u32(v.pixel_aspect_ratio.0);
                w.u32(v.pixel_aspect_ratio.1);
                w.end_box(pasp_pos);
            }
        }
        TrackType::Audio => {
            let a = info.audio.as_ref().expect("audio StreamInfo missing AudioInfo");
            w.u32(0); // reserved[2]
            w.u32(0);
            w.u16(a.channel_count);
            w.u16(a.bits_per_sample);
            w.u16(0); // pre_defined
            w.u16(0); // reserved
            w.u32((a.sample_rate as u32) << 16);

            let cfg_box_pos = w.start_box(config_box_type(info.codec));
            w.bytes_raw(&info.codec_config);
            w.end_box(cfg_box_pos);
        }
        TrackType::Text => {
            w.bytes_raw(&info.codec_config);
        }
    }

    if protected {
        write_sinf(w, info, cfg);
    }

    w.end_box(pos);
}

fn write_stbl(w: &mut BoxWriter, info: &StreamInfo, cfg: &Config) {
    let pos = w.start_box(bt::STBL);

    let stsd_pos = w.start_fullbox(bt::STSD, 0, 0);
    w.u32(1); // entry_count
    write_sample_entry(w, info, cfg);
    w.end_box(stsd_pos);

    for empty in [bt::STTS, bt::STSC, bt::STSZ] {
        let p = w.start_fullbox(empty, 0, 0);
        if empty == bt::STSZ {
            w.u32(0); // sample_size
        }
        w.u32(0); // entry/sample_count
        w.end_box(p);
    }
    let stco_pos = w.start_fullbox(bt::STCO, 0, 0);
    w.u32(0);
    w.end_box(stco_pos);

    w.end_box(pos);
}

fn write_mdhd(w: &mut BoxWriter, info: &StreamInfo) {
    let pos = w.start_fullbox(bt::MDHD, 1, 0);
    w.u64(0); // creation_time
    w.u64(0); // modification_time
    w.u32(info.timescale);
    w.u64(info.duration.unwrap_or(0));
    let lang = encode_lang(&info.language);
    w.u16(lang);
    w.u16(0); // pre_defined
    w.end_box(pos);
}

fn encode_lang(bcp47: &str) -> u16 {
    let b = bcp47.as_bytes();
    if b.len() < 3 {
        return 0x5545; // "und"
    }
    let mut v: u16 = 0;
    for i in 0..3 {
        let c = (b[i] as char).to_ascii_lowercase() as u16;
        let code = c.saturating_sub('a' as u16) & 0x1f;
        v = (v << 5) | code;
    }
    v
}

fn write_hdlr(w: &mut BoxWriter, track_type: TrackType) {
    let pos = w.start_fullbox(bt::HDLR, 0, 0);
    w.u32(0); // pre_defined
    let handler: [u8; 4] = match track_type {
        TrackType::Video => *b"vide",
        TrackType::Audio => *b"soun",
        TrackType::Text => *b"text",
    };
    w.bytes_raw(&handler);
    w.zeros(12); // reserved[3]
    w.bytes_raw(b"live-packager\0");
    w.end_box(pos);
}

fn write_minf(w: &mut BoxWriter, info: &StreamInfo, cfg: &Config) {
    let pos = w.start_box(bt::MINF);
    match info.track_type {
        TrackType::Video => {
            let p = w.start_fullbox(bt::VMHD, 0, 1);
            w.u16(0);
            w.u16(0);
            w.u16(0);
            w.u16(0);
            w.end_box(p);
        }
        TrackType::Audio => {
            let p = w.start_fullbox(bt::SMHD, 0, 0);
            w.i16(0);
            w.u16(0);
            w.end_box(p);
        }
        TrackType::Text => {}
    }

    let dinf_pos = w.start_box(bt::DINF);
    let dref_pos = w.start_fullbox(bt::DREF, 0, 0);
    w.u32(1);
    let url_pos = w.start_fullbox(bt::URL, 0, 1); // flags=1: media in same file
    w.end_box(url_pos);
    w.end_box(dref_pos);
    w.end_box(dinf_pos);

    write_stbl(w, info, cfg);
    w.end_box(pos);
}

fn write_tkhd(w: &mut BoxWriter, info: &StreamInfo) {
    let pos = w.start_fullbox(bt::TKHD, 1, 0x7); // enabled|in_movie|in_preview
    w.u64(0);
    w.u64(0);
    w.u32(info.track_id);
    w.u32(0); // reserved
    w.u64(info.duration.unwrap_or(0));
    w.zeros(8); // reserved[2]
    w.u16(0); // layer
    w.u16(0); // alternate_group
    w.u16(if info.track_type == TrackType::Audio { 0x0100 } else { 0 }); // volume
    w.u16(0); // reserved
    // unity transformation matrix
    for v in [0x0001_0000i32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
        w.i32(v);
    }
    let (w_px, h_px) = match &info.video {
        Some(v) => (v.width, v.height),
        None => (0, 0),
    };
    w.u32(w_px << 16);
    w.u32(h_px << 16);
    w.end_box(pos);
}

fn write_trak(w: &mut BoxWriter, info: &StreamInfo, cfg: &Config) {
    let pos = w.start_box(bt::TRAK);
    write_tkhd(w, info);
    let mdia_pos = w.start_box(bt::MDIA);
    write_mdhd(w, info);
    write_hdlr(w, info.track_type);
    write_minf(w, info, cfg);
    w.end_box(mdia_pos);
    w.end_box(pos);
}

fn write_mvhd(w: &mut BoxWriter, next_track_id: u32) {
    let pos = w.start_fullbox(bt::MVHD, 1, 0);
    w.u64(0);
    w.u64(0);
    w.u32(1000); // movie timescale; arbitrary for a fragmented file
    w.u64(0); // duration unknown in a live/fragmented context
    w.i32(0x0001_0000); // rate
    w.i16(0x0100); // volume
    w.u16(0); // reserved
    w.u64(0); // reserved[2]
    for v in [0x0001_0000i32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
        w.i32(v);
    }
    w.zeros(24); // pre_defined[6]
    w.u32(next_track_id);
    w.end_box(pos);
}

fn write_mvex(w: &mut BoxWriter, track_id: u32) {
    let pos = w.start_box(bt::MVEX);
    let trex_pos = w.start_fullbox(bt::TREX, 0, 0);
    w.u32(track_id);
    w.u32(1); // default_sample_description_index
    w.u32(0); // default_sample_duration
    w.u32(0); // default_sample_size
    w.u32(0); // default_sample_flags
    w.end_box(trex_pos);
    w.end_box(pos);
}

fn write_moov(w: &mut BoxWriter, info: &StreamInfo, cfg: &Config) {
    let pos = w.start_box(bt::MOOV);
    write_mvhd(w, info.track_id + 1);
    write_trak(w, info, cfg);
    write_mvex(w, info.track_id);
    w.end_box(pos);
}

/// Builds a complete initialization segment: `ftyp` + `moov`.
pub fn build_init_segment(info: &StreamInfo, cfg: &Config) -> Result<Vec<u8>, base::Error> {
    let mut w = BoxWriter::new();
    write_ftyp(&mut w, info.track_type);
    write_moov(&mut w, info, cfg);
    Ok(w.into_inner())
}

/// Parameters needed to build one media segment beyond the per-sample data.
pub struct MediaSegmentParams<'a> {
    pub info: &'a StreamInfo,
    pub cfg: &'a Config,
    pub sequence_number: u32,
    pub base_decode_time: i64,
}

fn sample_flags(is_key_frame: bool) -> u32 {
    // ISO/IEC 14496-12 8.8.3.1: sample_depends_on in bits 26:25,
    // sample_is_non_sync_sample in bit 16.
    if is_key_frame {
        0x0200_0000 // depends_on = 2 (does not depend on others)
    } else {
        0x0101_0000 // depends_on = 1, non-sync-sample = 1
    }
}

fn write_trun(
    w: &mut BoxWriter,
    samples: &[MediaSample],
    uniform_flags: bool,
    first_sample_flags: u32,
) -> usize {
    // flags: data-offset-present, (first-sample-flags-present), sample-duration,
    // sample-size, sample-flags, sample-composition-time-offset (version 1, signed).
    // sample-flags-present is always set: the mixed-keyframe case still needs
    // every sample after the first to carry its own sample_is_non_sync_sample
    // bit, not just the overridden first-sample-flags.
    let mut flags: u32 = 0x0000_01; // data-offset-present
    if !uniform_flags {
        flags |= 0x0000_04; // first-sample-flags-present
    }
    flags |= 0x0000_100; // sample-duration-present
    flags |= 0x0000_200; // sample-size-present
    flags |= 0x0000_400; // sample-flags-present (per-sample)
    flags |= 0x0000_800; // sample-composition-time-offsets-present

    let pos = w.start_fullbox(bt::TRUN, 1, flags);
    w.u32(samples.len() as u32);
    let data_offset_pos = w.pos();
    w.i32(0); // patched once mdat's position is known
    if !uniform_flags {
        w.u32(first_sample_flags);
    }
    for s in samples {
        w.u32(s.duration);
        w.u32(s.data.len() as u32);
        w.u32(sample_flags(s.is_key_frame));
        w.i32(s.cts_offset() as i32);
    }
    w.end_box(pos);
    data_offset_pos
}

fn write_tfhd(w: &mut BoxWriter, track_id: u32) {
    // flags = 0: rely on trex defaults plus per-sample trun fields.
    let pos = w.start_fullbox(bt::TFHD, 0, 0x02_0000); // default-base-is-moof
    w.u32(track_id);
    w.end_box(pos);
}

fn write_tfdt(w: &mut BoxWriter, base_decode_time: i64) {
    let pos = w.start_fullbox(bt::TFDT, 1, 0);
    w.u64(base_decode_time as u64);
    w.end_box(pos);
}

fn write_senc_saiz_saio(w: &mut BoxWriter, samples: &[MediaSample]) -> Option<(usize, usize)> {
    let has_crypto = samples.iter().any(|s| s.decrypt_config.is_some());
    if !has_crypto {
        return None;
    }

    let any_subsamples = samples
        .iter()
        .any(|s| matches!(&s.decrypt_config, Some(c) if !c.subsamples.is_empty()));
    let senc_flags: u32 = if any_subsamples { 0x2 } else { 0 };

    let senc_pos = w.start_fullbox(bt::SENC, 0, senc_flags);
    w.u32(samples.len() as u32);
    let senc_payload_start = w.pos();
    for s in samples {
        let Some(cfg) = &s.decrypt_config else { continue };
        w.bytes_raw(&cfg.iv);
        if any_subsamples {
            w.u16(cfg.subsamples.len().max(1) as u16);
            if cfg.subsamples.is_empty() {
                w.u16(0);
                w.u32(s.data.len() as u32);
            } else {
                for sub in &cfg.subsamples {
                    w.u16(sub.clear_bytes);
                    w.u32(sub.cipher_bytes);
                }
            }
        }
    }
    w.end_box(senc_pos);

    let saiz_pos = w.start_fullbox(bt::SAIZ, 0, 0);
    w.u8(0); // default_sample_info_size (0: use per-sample table below)
    w.u32(samples.len() as u32);
    for s in samples {
        let iv_len = s
            .decrypt_config
            .as_ref()
            .map(|c| c.iv.len())
            .unwrap_or(8);
        let n_sub = s
            .decrypt_config
            .as_ref()
            .map(|c| c.subsamples.len().max(1))
            .unwrap_or(0);
        let size = if any_subsamples {
            iv_len + 2 + n_sub * 6
        } else {
            iv_len
        };
        w.u8(size as u8);
    }
    w.end_box(saiz_pos);

    let saio_pos = w.start_fullbox(bt::SAIO, 0, 0);
    w.u32(1); // entry_count
    let saio_offset_pos = w.pos();
    w.i32(0); // patched: offset from start of moof to `senc_payload_start`
    w.end_box(saio_pos);

    Some((saio_offset_pos, senc_payload_start))
}

/// Builds one media segment: `styp` + `moof` + `mdat`, patching `trun`'s
/// `data_offset` and `saio`'s offset once the moof's final size (and
/// therefore the mdat's position) is known.
pub fn build_media_segment(
    samples: &[MediaSample],
    params: &MediaSegmentParams<'_>,
) -> Result<Vec<u8>, base::Error> {
    if samples.is_empty() {
        return Err(err!(InvalidArgument, msg("media segment has no samples")));
    }
    for w in samples.windows(2) {
        if w[1].dts < w[0].dts {
            return Err(err!(
                ParserFailure,
                msg("samples out of DTS order: {} then {}", w[0].dts, w[1].dts)
            ));
        }
    }

    let mut w = BoxWriter::new();

    let (_, compat) = cmaf_brands(params.info.track_type);
    let styp_pos = w.start_box(bt::STYP);
    w.bytes_raw(&compat[0]);
    w.u32(0);
    for c in compat.iter() {
        w.bytes_raw(c);
    }
    w.end_box(styp_pos);

    let moof_start = w.pos();
    let moof_pos = w.start_box(bt::MOOF);

    let mfhd_pos = w.start_fullbox(bt::MFHD, 0, 0);
    w.u32(params.sequence_number);
    w.end_box(mfhd_pos);

    let traf_pos = w.start_box(bt::TRAF);
    write_tfhd(&mut w, params.info.track_id);
    // Safari cares deeply that tfdt is written after tfhd and before trun.
    write_tfdt(&mut w, params.base_decode_time);

    let uniform_flags = samples.iter().all(|s| s.is_key_frame == samples[0].is_key_frame);
    let data_offset_pos = write_trun(&mut w, samples, uniform_flags, sample_flags(samples[0].is_key_frame));

    let saio_patch = write_senc_saiz_saio(&mut w, samples);

    w.end_box(traf_pos);
    w.end_box(moof_pos);

    let moof_len = w.pos() - moof_start;
    let mdat_data_offset = (moof_len + 8) as i32; // + mdat's own 8-byte header
    w.buf_patch_i32(data_offset_pos, mdat_data_offset);

    if let Some((saio_offset_pos, senc_payload_start)) = saio_patch {
        let saio_value = (senc_payload_start - moof_start) as i32;
        w.buf_patch_i32(saio_offset_pos, saio_value);
    }

    let mdat_pos = w.start_box(bt::MDAT);
    for s in samples {
        w.bytes_raw(&s.data);
    }
    w.end_box(mdat_pos);

    Ok(w.into_inner())
}

impl BoxWriter {
    fn buf_patch_i32(&mut self, pos: usize, v: i32) {
        self.buf[pos..pos + 4].copy_from_slice(&v.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AudioInfo, CodecTag, TrackType};

    fn aac_stream_info() -> StreamInfo {
        StreamInfo {
            track_type: TrackType::Audio,
            codec: CodecTag::Aac,
            codec_config: vec![0x03, 0x19, 0x00, 0x00, 0x00], // placeholder esds body
            track_id: 1,
            timescale: 48_000,
            duration: None,
            language: "und".to_string(),
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
    fn init_segment_starts_with_ftyp() {
        let info = aac_stream_info();
        let cfg = Config::default();
        let data = build_init_segment(&info, &cfg).unwrap();
        assert!(data.len() > 8);
        assert_eq!(&data[4..8], b"ftyp");
    }

    #[test]
    fn media_segment_box_order_and_size_sum() {
        let info = aac_stream_info();
        let cfg = Config::default();
        let samples = vec![MediaSample {
            dts: 0,
            pts: 0,
            duration: 1024,
            is_key_frame: true,
            data: vec![0xAAu8; 100],
            side_data: None,
            decrypt_config: None,
        }];
        let params = MediaSegmentParams {
            info: &info,
            cfg: &cfg,
            sequence_number: 1,
            base_decode_time: 0,
        };
        let data = build_media_segment(&samples, &params).unwrap();

        // styp, moof, mdat in order, each size field summing to the total.
        let mut off = 0usize;
        let mut seen = vec![];
        while off < data.len() {
            let sz = u32::from_be_bytes(data[off..off + 4].try_into().unwrap()) as usize;
            let ty = &data[off + 4..off + 8];
            seen.push(ty.to_vec());
            off += sz;
        }
        assert_eq!(off, data.len());
        assert_eq!(seen, vec![b"styp".to_vec(), b"moof".to_vec(), b"mdat".to_vec()]);

        // mdat payload contains the sample bytes verbatim at the tail.
        assert_eq!(&data[data.len() - 100..], &[0xAAu8; 100][..]);
    }

    #[test]
    fn out_of_order_samples_rejected() {
        let info = aac_stream_info();
        let cfg = Config::default();
        let samples = vec![
            MediaSample {
                dts: 10,
                pts: 10,
                duration: 10,
                is_key_frame: true,
                data: vec![0],
                side_data: None,
                decrypt_config: None,
            },
            MediaSample {
                dts: 5,
                pts: 5,
                duration: 10,
                is_key_frame: false,
                data: vec![0],
                side_data: None,
                decrypt_config: None,
            },
        ];
        let params = MediaSegmentParams {
            info: &info,
            cfg: &cfg,
            sequence_number: 1,
            base_decode_time: 0,
        };
        let e = build_media_segment(&samples, &params).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::ParserFailure);
    }

    #[test]
    fn mixed_keyframes_trun_carries_per_sample_flags() {
        let info = aac_stream_info();
        let cfg = Config::default();
        let samples = vec![
            MediaSample {
                dts: 0,
                pts: 0,
                duration: 1024,
                is_key_frame: true,
                data: vec![0xAA; 4],
                side_data: None,
                decrypt_config: None,
            },
            MediaSample {
                dts: 1024,
                pts: 1024,
                duration: 1024,
                is_key_frame: false,
                data: vec![0xBB; 4],
                side_data: None,
                decrypt_config: None,
            },
        ];
        let params = MediaSegmentParams {
            info: &info,
            cfg: &cfg,
            sequence_number: 1,
            base_decode_time: 0,
        };
        let data = build_media_segment(&samples, &params).unwrap();

        // `trun` box: size(4) + type(4) + version(1) + flags(3), then
        // sample_count(4) + data_offset(4) + first_sample_flags(4), then
        // 16-byte per-sample entries (duration, size, flags, cts_offset).
        let trun_pos = data.windows(4).position(|w| w == b"trun").unwrap() - 4;
        let flags = u32::from_be_bytes([0, data[trun_pos + 9], data[trun_pos + 10], data[trun_pos + 11]]);
        assert_eq!(flags & 0x04, 0x04, "first-sample-flags-present must be set for mixed keyframes");
        assert_eq!(flags & 0x400, 0x400, "sample-flags-present must be set for mixed keyframes");

        let entries_start = trun_pos + 12 + 12;
        let second_sample_flags_off = entries_start + 16 + 8;
        let second_flags =
            u32::from_be_bytes(data[second_sample_flags_off..second_sample_flags_off + 4].try_into().unwrap());
        assert_eq!(second_flags, 0x0101_0000, "non-key sample after the first must still be marked non-sync");
    }
}
