//! Subsample partitioning: clear bytes pass through untouched; only the
//! cipher regions this returns should be handed to a cipher.

use crate::model::SubsampleEntry;

/// Splits `data` into its cipher regions per `entries`. An empty entry
/// list means "whole sample is cipher material".
pub fn partition<'a>(
    data: &'a mut [u8],
    entries: &[SubsampleEntry],
) -> Result<Vec<&'a mut [u8]>, String> {
    if entries.is_empty() {
        return Ok(vec![data]);
    }

    let mut out = Vec::with_capacity(entries.len());
    let mut rest = data;
    for e in entries {
        let clear = e.clear_bytes as usize;
        let cipher = e.cipher_bytes as usize;
        if clear + cipher > rest.len() {
            return Err(format!(
                "subsample entry ({clear}, {cipher}) overflows remaining {} bytes",
                rest.len()
            ));
        }
        let (_clear_part, tail) = rest.split_at_mut(clear);
        let (cipher_part, tail) = tail.split_at_mut(cipher);
        out.push(cipher_part);
        rest = tail;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_sample_when_no_subsamples() {
        let mut data = vec![1, 2, 3, 4];
        let regions = partition(&mut data, &[]).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0], &[1, 2, 3, 4]);
    }

    #[test]
    fn splits_clear_and_cipher_regions() {
        let mut data = vec![0u8; 10];
        let entries = vec![
            SubsampleEntry { clear_bytes: 2, cipher_bytes: 3 },
            SubsampleEntry { clear_bytes: 1, cipher_bytes: 4 },
        ];
        let regions = partition(&mut data, &entries).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].len(), 3);
        assert_eq!(regions[1].len(), 4);
    }

    #[test]
    fn overflow_is_rejected() {
        let mut data = vec![0u8; 4];
        let entries = vec![SubsampleEntry { clear_bytes: 2, cipher_bytes: 10 }];
        assert!(partition(&mut data, &entries).is_err());
    }
}
