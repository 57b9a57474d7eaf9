//! WebM sample-level encryption signal-byte framing, per the WebM
//! Encryption spec: a leading signal byte selects clear vs. CTR-encrypted
//! vs. encrypted-and-partitioned framing, followed by an 8-byte IV and
//! (when partitioned) a partition table.
//!
//! This lives outside the `Codec` tagged-enum dispatch in `super::Codec`
//! since WebM is a container-level framing concern layered on top of
//! VP8/VP9/Opus/Vorbis payloads, not a bitstream adapter in its own right.

use base::{bail, err};

const SIGNAL_CLEAR: u8 = 0x00;
const SIGNAL_ENCRYPTED: u8 = 0x01;
const SIGNAL_ENCRYPTED_PARTITIONED: u8 = 0x03;

#[derive(Clone, Debug)]
pub enum WebmFrame<'a> {
    Clear(&'a [u8]),
    Encrypted { iv: [u8; 8], payload: &'a [u8] },
    EncryptedPartitioned {
        iv: [u8; 8],
        partition_offsets: Vec<u32>,
        payload: &'a [u8],
    },
}

pub fn parse_frame(data: &[u8]) -> Result<WebmFrame<'_>, base::Error> {
    let (&signal, rest) = data
        .split_first()
        .ok_or_else(|| err!(ParserFailure, msg("empty WebM frame")))?;
    match signal {
        SIGNAL_CLEAR => Ok(WebmFrame::Clear(rest)),
        SIGNAL_ENCRYPTED => {
            if rest.len() < 8 {
                bail!(ParserFailure, msg("WebM encrypted frame missing 8-byte IV"));
            }
            let iv: [u8; 8] = rest[..8].try_into().unwrap();
            Ok(WebmFrame::Encrypted { iv, payload: &rest[8..] })
        }
        SIGNAL_ENCRYPTED_PARTITIONED => {
            if rest.len() < 9 {
                bail!(ParserFailure, msg("WebM partitioned frame missing IV/partition count"));
            }
            let iv: [u8; 8] = rest[..8].try_into().unwrap();
            let count = rest[8] as usize;
            let table_end = 9 + count * 4;
            if rest.len() < table_end {
                bail!(ParserFailure, msg("WebM partition table truncated"));
            }
            let offsets = rest[9..table_end]
                .chunks_exact(4)
                .map(|c| u32::from_be_bytes(c.try_into().unwrap()))
                .collect();
            Ok(WebmFrame::EncryptedPartitioned {
                iv,
                partition_offsets: offsets,
                payload: &rest[table_end..],
            })
        }
        other => bail!(ParserFailure, msg("unknown WebM signal byte {other:#x}")),
    }
}

/// Builds an encrypted (non-partitioned) frame: signal byte 0x01, 8-byte
/// IV, ciphertext.
pub fn build_encrypted_frame(iv: [u8; 8], ciphertext: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 8 + ciphertext.len());
    out.push(SIGNAL_ENCRYPTED);
    out.extend_from_slice(&iv);
    out.extend_from_slice(ciphertext);
    out
}

/// Builds an encrypted-and-partitioned frame: signal byte 0x03, 8-byte IV,
/// 1-byte partition count, big-endian 4-byte partition offsets, payload.
pub fn build_partitioned_frame(iv: [u8; 8], partition_offsets: &[u32], payload: &[u8]) -> Result<Vec<u8>, base::Error> {
    if partition_offsets.len() > u8::MAX as usize {
        bail!(EncryptionFailure, msg("too many WebM partitions: {}", partition_offsets.len()));
    }
    let mut out = Vec::with_capacity(1 + 8 + 1 + partition_offsets.len() * 4 + payload.len());
    out.push(SIGNAL_ENCRYPTED_PARTITIONED);
    out.extend_from_slice(&iv);
    out.push(partition_offsets.len() as u8);
    for off in partition_offsets {
        out.extend_from_slice(&off.to_be_bytes());
    }
    out.extend_from_slice(payload);
    Ok(out)
}

pub fn build_clear_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(SIGNAL_CLEAR);
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_encrypted_frame() {
        let iv = [7u8; 8];
        let ct = vec![1, 2, 3, 4];
        let frame = build_encrypted_frame(iv, &ct);
        match parse_frame(&frame).unwrap() {
            WebmFrame::Encrypted { iv: got_iv, payload } => {
                assert_eq!(got_iv, iv);
                assert_eq!(payload, &ct[..]);
            }
            _ => panic!("expected Encrypted variant"),
        }
    }

    #[test]
    fn round_trips_partitioned_frame() {
        let iv = [9u8; 8];
        let offsets = vec![10u32, 20, 35];
        let payload = vec![0xAB; 50];
        let frame = build_partitioned_frame(iv, &offsets, &payload).unwrap();
        match parse_frame(&frame).unwrap() {
            WebmFrame::EncryptedPartitioned {
                iv: got_iv,
                partition_offsets,
                payload: got_payload,
            } => {
                assert_eq!(got_iv, iv);
                assert_eq!(partition_offsets, offsets);
                assert_eq!(got_payload, &payload[..]);
            }
            _ => panic!("expected EncryptedPartitioned variant"),
        }
    }

    #[test]
    fn clear_frame_round_trip() {
        let frame = build_clear_frame(&[1, 2, 3]);
        match parse_frame(&frame).unwrap() {
            WebmFrame::Clear(payload) => assert_eq!(payload, &[1, 2, 3]),
            _ => panic!("expected Clear variant"),
        }
    }

    #[test]
    fn rejects_unknown_signal_byte() {
        assert!(parse_frame(&[0x02, 0, 0]).is_err());
    }
}
