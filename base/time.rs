//! Generic tick-rescaling between arbitrary track timescales.

/// Rescales `off` (and implicitly any associated duration) from a timescale
/// of `from_timescale` ticks/sec to `to_timescale` ticks/sec.
///
/// Uses an `i128` intermediate so that large 64-bit offsets at a high
/// timescale (e.g. 90 kHz) never overflow before rounding back down.
pub fn rescale(off: i64, from_timescale: u32, to_timescale: u32) -> i64 {
    if from_timescale == to_timescale {
        return off;
    }
    let off = off as i128;
    let num = off * to_timescale as i128;
    (num / from_timescale as i128) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity() {
        assert_eq!(rescale(12345, 90_000, 90_000), 12345);
    }

    #[test]
    fn ninety_khz_to_millis() {
        assert_eq!(rescale(90_000, 90_000, 1_000), 1_000);
    }

    #[test]
    fn large_offset_no_overflow() {
        let off = i64::MAX / 2;
        assert_eq!(rescale(off, 90_000, 90_000), off);
    }
}
