//! Hex helpers for unit tests (RFC test vectors are written in hex).

/// Encode bytes as a lowercase hex string.
pub(crate) fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(out, "{byte:02x}").expect("writing to a String cannot fail");
    }
    out
}

/// Decode a hex string into bytes.
pub(crate) fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if !s.len().is_multiple_of(2) {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let bytes = [0x00, 0x01, 0x7f, 0x80, 0xff];
        let hex = encode_hex(&bytes);
        assert_eq!(hex, "00017f80ff");
        assert_eq!(decode_hex(&hex).unwrap(), bytes);
    }

    #[test]
    fn test_decode_hex_rejects_bad_input() {
        assert!(decode_hex("abc").is_none());
        assert!(decode_hex("zz").is_none());
    }
}
