//! Escaping codec
//!
//! Lets arbitrary UTF-8 travel through the ASCII-oriented sample channel.
//! Every code point >= 128 is written as its UTF-8 bytes in `\xHH` form
//! (uppercase hex); everything below 128 passes through unchanged.

/// Escape every non-ASCII code point as a run of `\xHH` byte escapes
pub fn escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    let mut buf = [0u8; 4];
    for ch in s.chars() {
        if ch.is_ascii() {
            escaped.push(ch);
        } else {
            for b in ch.encode_utf8(&mut buf).bytes() {
                escaped.push_str(&format!("\\x{:02X}", b));
            }
        }
    }
    escaped
}

/// Decode `\xHH` escapes into raw bytes
///
/// ASCII characters contribute their ordinal byte. Characters outside ASCII
/// never appear in escaped text; if they do, their UTF-8 bytes are kept as is.
pub fn unescape_bytes(s: &str) -> Vec<u8> {
    let chars: Vec<char> = s.chars().collect();
    let mut out = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && i + 3 < chars.len() && chars[i + 1] == 'x' {
            if let (Some(hi), Some(lo)) = (chars[i + 2].to_digit(16), chars[i + 3].to_digit(16)) {
                out.push((hi * 16 + lo) as u8);
                i += 4;
                continue;
            }
        }
        let mut buf = [0u8; 4];
        out.extend_from_slice(chars[i].encode_utf8(&mut buf).as_bytes());
        i += 1;
    }
    out
}

/// Decode `\xHH` escapes and interpret the result as UTF-8, replacing invalid sequences
pub fn unescape(s: &str) -> String {
    String::from_utf8_lossy(&unescape_bytes(s)).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_ascii_is_identity() {
        let s = "printf 'abc\\n' | grep -E 'a|b'";
        assert_eq!(escape(s), s);
    }

    #[test]
    fn test_escape_multibyte() {
        assert_eq!(escape("ä"), "\\xC3\\xA4");
        assert_eq!(escape("aİb"), "a\\xC4\\xB0b");
        assert_eq!(escape("😀"), "\\xF0\\x9F\\x98\\x80");
    }

    #[test]
    fn test_unescape_accepts_lowercase_hex() {
        assert_eq!(unescape_bytes("\\xc3\\xa4"), vec![0xC3, 0xA4]);
        assert_eq!(unescape("\\xc3\\xa4"), "ä");
    }

    #[test]
    fn test_unescape_replaces_invalid_utf8() {
        assert_eq!(unescape("a\\xFFb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_unescape_incomplete_sequence_is_literal() {
        assert_eq!(unescape("\\x4"), "\\x4");
        assert_eq!(unescape("\\xZZ"), "\\xZZ");
        assert_eq!(unescape("end\\"), "end\\");
    }

    #[test]
    fn test_round_trip() {
        for s in [
            "",
            "plain",
            "printf 'ä\\n' | LC_ALL=tr_TR.utf8 timeout 0.5s grep -i 'İ'",
            "日本語 text\twith tabs\n",
            "\u{7f}\u{80}\u{7ff}\u{800}\u{ffff}\u{10000}",
        ] {
            assert_eq!(unescape(&escape(s)), s);
        }
    }

    #[test]
    fn test_unescape_keeps_raw_non_ascii() {
        assert_eq!(unescape("ä\\x41"), "äA");
    }

    #[test]
    fn test_literal_escape_sequence_is_ambiguous() {
        // A literal `\x41` that did not come from escaping decodes to `A`.
        assert_eq!(unescape(&escape("\\x41")), "A");
    }
}
