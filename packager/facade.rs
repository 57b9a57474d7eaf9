//! `LivePackager`: the single entry point callers construct and drive.
//! Holds per-instance state (parsed stream info, codec adapter, sequence
//! counters) across repeated `package`/`package_timedtext` calls, per the
//! concurrency model's "one packager instance per thread, no shared
//! mutable state" rule.

use base::bail;

use crate::codec::Codec;
use crate::config::{Config, OutputFormat};
use crate::crypto;
use crate::isobmff::{reader, writer};
use crate::model::{MediaSample, SegmentBuffer, StreamInfo, TrackType};
use crate::packed_audio;
use crate::ts::TsSegmenter;

/// One packager instance. Not `Send`/`Sync` by convention of use (callers
/// are expected to create one per thread), though nothing here actually
/// prevents sending it -- there is no interior mutability beyond `self`.
pub struct LivePackager {
    cfg: Config,
    stream_info: Option<StreamInfo>,
    codec: Option<Codec>,
    ts: Option<TsSegmenter>,
    next_sequence_number: u32,
    /// Crypto-period index the most recently packaged segment fell into,
    /// per `cfg.crypto_period_duration_sec`. `None` until the first
    /// segment with rotation configured has been packaged.
    active_key_period: Option<u64>,
}

impl LivePackager {
    pub fn new(cfg: Config) -> Self {
        let next_sequence_number = cfg.segment_number.max(1) as u32;
        LivePackager {
            cfg,
            stream_info: None,
            codec: None,
            ts: None,
            next_sequence_number,
            active_key_period: None,
        }
    }

    /// Advances the active encryption key per the configured rotation
    /// policy for a segment starting at `start_ticks` (in `timescale`
    /// units), returning the new key as a rotation event the first time a
    /// segment crosses into a fresh crypto-period. Returns `None` when
    /// rotation isn't configured or the segment is still within the
    /// current period -- within a single segment the key never changes.
    fn rotate_key(&mut self, start_ticks: i64, timescale: u32) -> Option<crate::model::EncryptionConfig> {
        if self.cfg.key_rotation_keys.is_empty() || self.cfg.crypto_period_duration_sec <= 0.0 {
            return None;
        }
        let start_sec = start_ticks.max(0) as f64 / timescale as f64;
        let period = (start_sec / self.cfg.crypto_period_duration_sec).floor() as u64;
        if self.active_key_period == Some(period) {
            return None;
        }
        self.active_key_period = Some(period);
        let idx = (period as usize) % self.cfg.key_rotation_keys.len();
        let (key, key_id) = self.cfg.key_rotation_keys[idx];
        self.cfg.key = Some(key);
        self.cfg.key_id = Some(key_id);
        let scheme = match self.cfg.protection_scheme {
            crate::config::ProtectionScheme::Cbcs => crate::model::ProtectionScheme::Cbcs,
            _ => crate::model::ProtectionScheme::Cenc,
        };
        Some(crate::model::EncryptionConfig {
            key_id,
            key,
            iv: smallvec::SmallVec::from_slice(if self.cfg.iv.is_empty() { &[0u8; 16][..] } else { &self.cfg.iv[..] }),
            scheme,
            crypt_byte_block: 1,
            skip_byte_block: 0,
            subsamples: vec![],
        })
    }

    fn crypt_samples(&self, samples: &mut [MediaSample]) -> Result<(), base::Error> {
        if self.cfg.enable_decryption {
            for s in samples.iter_mut() {
                if let Some(dc) = &mut s.decrypt_config {
                    crypto::decrypt_sample(dc, &mut s.data)?;
                }
            }
        }
        if !matches!(self.cfg.protection_scheme, crate::config::ProtectionScheme::None) {
            let scheme = match self.cfg.protection_scheme {
                crate::config::ProtectionScheme::Cenc => crate::model::ProtectionScheme::Cenc,
                crate::config::ProtectionScheme::Cbcs => crate::model::ProtectionScheme::Cbcs,
                _ => crate::model::ProtectionScheme::Cenc,
            };
            let key = self
                .cfg
                .key
                .ok_or_else(|| base::err!(InvalidArgument, msg("protection_scheme set without a key")))?;
            let key_id = self.cfg.key_id.unwrap_or([0u8; 16]);
            for s in samples.iter_mut() {
                let mut cc = crate::model::CryptoConfig {
                    key_id,
                    key,
                    iv: smallvec::SmallVec::from_slice(if self.cfg.iv.is_empty() { &[0u8; 16][..] } else { &self.cfg.iv[..] }),
                    scheme,
                    crypt_byte_block: 1,
                    skip_byte_block: 0,
                    subsamples: vec![],
                };
                crypto::process_sample(&mut cc, &mut s.data)?;
                s.decrypt_config = Some(cc);
            }
        }
        Ok(())
    }

    /// Emits a fresh initialization segment derived from the parsed input
    /// init. Caches the stream info and a fresh codec adapter for the
    /// matching `package` calls that follow.
    pub fn package_init(&mut self, init_bytes: &[u8]) -> Result<SegmentBuffer, base::Error> {
        let parsed = reader::parse_init_segment(init_bytes)?;
        if self.cfg.format == OutputFormat::Ts {
            self.ts = Some(TsSegmenter::new(
                std::slice::from_ref(&parsed.stream_info),
                self.cfg.m2ts_offset_ms,
            )?);
        }
        self.codec = Codec::for_tag(parsed.stream_info.codec);
        if let Some(codec) = &mut self.codec {
            codec.configure(&parsed.stream_info.codec_config)?;
        }
        self.stream_info = Some(parsed.stream_info);

        let mut buf = SegmentBuffer::new();
        match self.cfg.format {
            OutputFormat::Fmp4 | OutputFormat::VttMp4 | OutputFormat::TtmlMp4 => {
                let info = self.stream_info.as_ref().unwrap();
                let bytes = writer::build_init_segment(info, &self.cfg)?;
                buf.set_init_segment(bytes);
            }
            OutputFormat::Ts | OutputFormat::Ttml => {
                // Neither container carries a separate initialization segment.
                buf.set_init_segment(Vec::new());
            }
        }
        Ok(buf)
    }

    /// Emits a media segment. `init_bytes` is consulted only if
    /// `package_init` hasn't been called yet on this instance.
    pub fn package(&mut self, init_bytes: &[u8], media_bytes: &[u8]) -> Result<SegmentBuffer, base::Error> {
        if self.stream_info.is_none() {
            self.package_init(init_bytes)?;
        }
        let track_type = self.stream_info.as_ref().unwrap().track_type;
        if track_type == TrackType::Text {
            bail!(InvalidArgument, msg("use package_timedtext for text tracks"));
        }

        let mut samples = reader::parse_media_segment(media_bytes)?;
        if let Some(codec) = &mut self.codec {
            // MPEG-TS wants Annex-B with SPS/PPS/VPS prepended on keyframes
            // and AAC wrapped in ADTS; fMP4's `mdat` wants length-prefixed
            // NAL units and raw AAC alongside the `esds` config, so AAC is
            // only rewritten (ADTS-wrapped) for the TS path.
            let bytestream_output = matches!(self.cfg.format, OutputFormat::Ts);
            for s in samples.iter_mut() {
                if let Codec::Aac(a) = codec {
                    if bytestream_output {
                        s.data = a.rewrite_sample(&s.data)?;
                    }
                } else {
                    s.data = codec.rewrite_sample(&s.data, s.is_key_frame)?;
                    if bytestream_output {
                        s.data = codec.to_bytestream(&s.data, s.is_key_frame)?;
                    }
                }
            }
        }
        let timescale = self.stream_info.as_ref().unwrap().timescale;
        let rotation = samples.first().and_then(|s| self.rotate_key(s.dts, timescale));
        let segment_start = samples.first().map(|s| s.dts).unwrap_or(0);
        let segment_duration: u64 = samples.iter().map(|s| s.duration as u64).sum();

        self.crypt_samples(&mut samples)?;

        let info = self.stream_info.as_ref().unwrap();
        let mut out = SegmentBuffer::new();
        out.set_segment_info(crate::model::SegmentInfo {
            start: segment_start,
            duration: segment_duration,
            is_subsegment: false,
            key_rotation: rotation,
        });
        match self.cfg.format {
            OutputFormat::Fmp4 => {
                let base_decode_time = samples.first().map(|s| s.dts).unwrap_or(0);
                let params = writer::MediaSegmentParams {
                    info,
                    cfg: &self.cfg,
                    sequence_number: self.next_sequence_number,
                    base_decode_time,
                };
                let bytes = writer::build_media_segment(&samples, &params)?;
                out.set_media_segment(&bytes);
            }
            OutputFormat::Ts => {
                let ts = self
                    .ts
                    .as_mut()
                    .ok_or_else(|| base::err!(InternalError, msg("TS segmenter not initialized")))?;
                let pid = ts
                    .pid_for(info.track_type)
                    .ok_or_else(|| base::err!(InternalError, msg("TS segmenter has no PID for this track")))?;
                let tagged: Vec<(u16, MediaSample)> = samples.into_iter().map(|s| (pid, s)).collect();
                let bytes = ts.build_segment(&tagged)?;
                out.set_media_segment(&bytes);
            }
            OutputFormat::VttMp4 | OutputFormat::TtmlMp4 | OutputFormat::Ttml => {
                bail!(InvalidArgument, msg("use package_timedtext for text-track output formats"));
            }
        }
        self.next_sequence_number += 1;
        Ok(out)
    }

    /// Produces a "MPEG-Packed Audio" segment (ID3-PRIV + ADTS/AC-3/MP3
    /// frames) instead of the fMP4/TS path -- selected explicitly rather
    /// than inferred from `format`, since packed audio is an HLS-specific
    /// sibling of both.
    pub fn package_packed_audio(&mut self, init_bytes: &[u8], media_bytes: &[u8]) -> Result<SegmentBuffer, base::Error> {
        if self.stream_info.is_none() {
            self.package_init(init_bytes)?;
        }
        let info = self.stream_info.as_ref().unwrap().clone();
        if info.track_type != TrackType::Audio {
            bail!(InvalidArgument, msg("packed-audio output requires an audio track"));
        }
        let samples = reader::parse_media_segment(media_bytes)?;
        let codec = self
            .codec
            .as_mut()
            .ok_or_else(|| base::err!(InternalError, msg("codec adapter not initialized")))?;
        let bytes = packed_audio::build_segment(
            codec,
            info.codec,
            &info.codec_config,
            info.timescale,
            self.cfg.m2ts_offset_ms,
            &samples,
        )?;
        let mut out = SegmentBuffer::new();
        out.set_media_segment(&bytes);
        Ok(out)
    }

    pub fn package_timedtext_init(&mut self, init_bytes: &[u8]) -> Result<SegmentBuffer, base::Error> {
        let parsed = reader::parse_init_segment(init_bytes)?;
        if parsed.stream_info.track_type != TrackType::Text {
            bail!(InvalidArgument, msg("package_timedtext_init requires a text track init segment"));
        }
        self.stream_info = Some(parsed.stream_info);
        let mut buf = SegmentBuffer::new();
        let bytes = writer::build_init_segment(self.stream_info.as_ref().unwrap(), &self.cfg)?;
        buf.set_init_segment(bytes);
        Ok(buf)
    }

    pub fn package_timedtext(&mut self, init_bytes: &[u8], media_bytes: &[u8]) -> Result<SegmentBuffer, base::Error> {
        if self.stream_info.is_none() {
            self.package_timedtext_init(init_bytes)?;
        }
        let info = self.stream_info.as_ref().unwrap();
        if info.track_type != TrackType::Text {
            bail!(InvalidArgument, msg("package_timedtext requires a text track"));
        }
        let samples = reader::parse_media_segment(media_bytes)?;
        let params = writer::MediaSegmentParams {
            info,
            cfg: &self.cfg,
            sequence_number: self.next_sequence_number,
            base_decode_time: self.cfg.timed_text_decode_time,
        };
        let bytes = writer::build_media_segment(&samples, &params)?;
        self.next_sequence_number += 1;
        let mut out = SegmentBuffer::new();
        out.set_media_segment(&bytes);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AudioInfo, CodecTag};

    fn audio_info() -> StreamInfo {
        StreamInfo {
            track_type: TrackType::Audio,
            codec: CodecTag::Aac,
            codec_config: vec![0x12, 0x10],
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

    fn sample(data: Vec<u8>) -> MediaSample {
        MediaSample {
            dts: 0,
            pts: 0,
            duration: 1024,
            is_key_frame: true,
            data,
            side_data: None,
            decrypt_config: None,
        }
    }

    #[test]
    fn fmp4_round_trip_through_facade() {
        let cfg = Config::default();
        let info = audio_info();
        let init_bytes = writer::build_init_segment(&info, &cfg).unwrap();
        let media_bytes = writer::build_media_segment(
            &[sample(vec![0xAA; 10])],
            &writer::MediaSegmentParams {
                info: &info,
                cfg: &cfg,
                sequence_number: 1,
                base_decode_time: 0,
            },
        )
        .unwrap();

        let mut pkg = LivePackager::new(cfg);
        let init_out = pkg.package_init(&init_bytes).unwrap();
        assert_eq!(&init_out.init_segment_data()[4..8], b"ftyp");

        let media_out = pkg.package(&init_bytes, &media_bytes).unwrap();
        assert!(media_out.segment_size() > 0);
    }

    #[test]
    fn package_rejects_text_track() {
        let cfg = Config::default();
        let mut info = audio_info();
        info.track_type = TrackType::Text;
        info.audio = None;
        let init_bytes = writer::build_init_segment(&info, &cfg).unwrap();

        let mut pkg = LivePackager::new(cfg);
        pkg.package_init(&init_bytes).unwrap();
        let err = pkg.package(&init_bytes, &[]).unwrap_err();
        assert_eq!(err.kind(), base::ErrorKind::InvalidArgument);
    }

    #[test]
    fn key_rotation_advances_on_crypto_period_boundary() {
        let mut cfg = Config::default();
        cfg.crypto_period_duration_sec = 1.0;
        cfg.key_rotation_keys = vec![([0xAA; 16], [0x01; 16]), ([0xBB; 16], [0x02; 16])];
        let info = audio_info();
        let init_bytes = writer::build_init_segment(&info, &cfg).unwrap();

        let mut pkg = LivePackager::new(cfg.clone());
        pkg.package_init(&init_bytes).unwrap();

        let media_at = |dts: i64, seq: u32| {
            let mut s = sample(vec![0xAA; 10]);
            s.dts = dts;
            s.pts = dts;
            writer::build_media_segment(
                &[s],
                &writer::MediaSegmentParams { info: &info, cfg: &cfg, sequence_number: seq, base_decode_time: dts },
            )
            .unwrap()
        };

        // First segment always starts a fresh crypto-period.
        let seg1 = pkg.package(&init_bytes, &media_at(0, 1)).unwrap();
        let rot1 = seg1.key_rotation().expect("first segment must emit a rotation event");
        assert_eq!(rot1.key, [0xAA; 16]);
        assert_eq!(rot1.key_id, [0x01; 16]);

        // Still within the first 1-second crypto-period: no event.
        let seg2 = pkg.package(&init_bytes, &media_at(0, 2)).unwrap();
        assert!(seg2.key_rotation().is_none(), "same crypto-period must not re-emit a rotation event");

        // 48_000 ticks at a 48kHz timescale is exactly 1 second: next period.
        let seg3 = pkg.package(&init_bytes, &media_at(48_000, 3)).unwrap();
        let rot3 = seg3.key_rotation().expect("crossing into the next crypto-period must rotate the key");
        assert_eq!(rot3.key, [0xBB; 16]);
        assert_eq!(rot3.key_id, [0x02; 16]);
    }
}
