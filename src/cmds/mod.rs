use base::{bail, Error};

pub mod package;
pub mod probe;

/// Decodes a hex string into a fixed-size array, for `--key`/`--key-id`/`--iv`
/// style arguments.
fn parse_hex16(s: &str) -> Result<[u8; 16], Error> {
    let v = parse_hex(s)?;
    let len = v.len();
    v.try_into()
        .map_err(|_| base::err!(InvalidArgument, msg("expected 16 hex bytes, got {}", len)))
}

fn parse_hex(s: &str) -> Result<Vec<u8>, Error> {
    if s.len() % 2 != 0 {
        bail!(InvalidArgument, msg("hex string {} has odd length", s));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|e| base::err!(InvalidArgument, source(e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex16_round_trips() {
        let got = parse_hex16("000102030405060708090a0b0c0d0e0f").unwrap();
        assert_eq!(got, [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn parse_hex16_rejects_wrong_length() {
        assert!(parse_hex16("0011").is_err());
    }

    #[test]
    fn parse_hex_rejects_odd_length() {
        assert!(parse_hex("0").is_err());
    }
}
