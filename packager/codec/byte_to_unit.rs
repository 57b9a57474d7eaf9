//! Shared Annex-B byte-stream <-> length-prefixed NAL-unit-stream
//! conversion for AVC and HEVC, which differ only in NAL header width and
//! which NAL types are parameter sets to be stripped and tracked
//! separately rather than re-emitted as samples.

/// Finds the next Annex-B start code (3- or 4-byte `00 00 01` / `00 00 00
/// 01`) at or after `from`, returning `(start_code_len, nal_start)`.
fn find_start_code(data: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i + 3 <= data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            if data[i + 2] == 1 {
                return Some((3, i + 3));
            }
            if i + 4 <= data.len() && data[i + 2] == 0 && data[i + 3] == 1 {
                return Some((4, i + 4));
            }
        }
        i += 1;
    }
    None
}

/// Splits an Annex-B byte-stream buffer into its raw NAL unit payloads
/// (start codes stripped, emulation-prevention bytes left in place -- the
/// caller strips those only if it needs to inspect RBSP bits).
pub fn split_annex_b(data: &[u8]) -> Vec<&[u8]> {
    // First collect (start_code_begin, nal_start) for every start code,
    // then each NAL spans from its nal_start to the next start code's
    // start_code_begin (or the end of the buffer for the last one).
    let mut marks = Vec::new();
    let mut pos = 0;
    while let Some((sc_len, nal_start)) = find_start_code(data, pos) {
        marks.push((nal_start - sc_len, nal_start));
        pos = nal_start;
    }

    let mut units = Vec::with_capacity(marks.len());
    for (i, &(_, nal_start)) in marks.iter().enumerate() {
        let nal_end = marks.get(i + 1).map(|&(sc_begin, _)| sc_begin).unwrap_or(data.len());
        units.push(&data[nal_start..nal_end]);
    }
    units
}

/// Rewrites an Annex-B byte-stream buffer into length-prefixed NAL units
/// (4-byte big-endian length + payload), stripping any NAL whose type
/// (computed by `is_param_set`) marks it as a parameter set; those are
/// instead appended to `param_sets` in order of appearance for
/// decoder-configuration-record emission.
pub fn annex_b_to_length_prefixed<'a>(
    data: &'a [u8],
    header_len: usize,
    nal_type: impl Fn(&[u8]) -> u8,
    is_param_set: impl Fn(u8) -> bool,
    param_sets: &mut Vec<&'a [u8]>,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 16);
    for nal in split_annex_b(data) {
        if nal.len() < header_len {
            continue;
        }
        let ty = nal_type(nal);
        if is_param_set(ty) {
            param_sets.push(nal);
            continue;
        }
        out.extend_from_slice(&(nal.len() as u32).to_be_bytes());
        out.extend_from_slice(nal);
    }
    out
}

/// Splits a length-prefixed (4-byte big-endian length) NAL stream into
/// its unit payloads.
pub fn split_length_prefixed(data: &[u8]) -> Result<Vec<&[u8]>, String> {
    let mut out = Vec::new();
    let mut off = 0;
    while off < data.len() {
        if data.len() - off < 4 {
            return Err("length-prefixed NAL stream truncated".to_string());
        }
        let len = u32::from_be_bytes(data[off..off + 4].try_into().unwrap()) as usize;
        off += 4;
        if off + len > data.len() {
            return Err("NAL length exceeds remaining buffer".to_string());
        }
        out.push(&data[off..off + len]);
        off += len;
    }
    Ok(out)
}

/// Rewrites a length-prefixed NAL stream back to Annex-B, prepending the
/// given parameter-set NALs (with start codes) before the first NAL when
/// `prepend_param_sets` is true (done on every keyframe).
pub fn length_prefixed_to_annex_b(data: &[u8], param_sets: &[Vec<u8>], prepend_param_sets: bool) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    if prepend_param_sets {
        for ps in param_sets {
            out.extend_from_slice(&[0, 0, 0, 1]);
            out.extend_from_slice(ps);
        }
    }
    for nal in split_length_prefixed(data)? {
        out.extend_from_slice(&[0, 0, 0, 1]);
        out.extend_from_slice(nal);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_multiple_nals() {
        let data = [0, 0, 0, 1, 0xAA, 0xBB, 0, 0, 1, 0xCC];
        let units = split_annex_b(&data);
        assert_eq!(units, vec![&[0xAAu8, 0xBB][..], &[0xCCu8][..]]);
    }

    #[test]
    fn length_prefixed_round_trip() {
        let nals: Vec<&[u8]> = vec![&[1, 2, 3], &[4, 5]];
        let mut lp = Vec::new();
        for n in &nals {
            lp.extend_from_slice(&(n.len() as u32).to_be_bytes());
            lp.extend_from_slice(n);
        }
        let split = split_length_prefixed(&lp).unwrap();
        assert_eq!(split, nals);
    }
}
