//! Content-Transfer-Encoding decoders.

use base64::{
    Engine,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};

/// Standard alphabet, tolerant of missing padding and non-zero trailing bits.
pub(crate) const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode a base64 body after removing all whitespace and line breaks.
pub fn decode_base64(data: &[u8]) -> Option<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|byte| !byte.is_ascii_whitespace())
        .collect();

    LENIENT_BASE64.decode(cleaned).ok()
}

/// Decode a quoted-printable body.
///
/// A line ending in `=` is joined to the next one, `=XX` becomes the byte
/// `0xXX`, and an `=` not followed by two hex digits is kept literally.
pub fn decode_quoted_printable(data: &[u8]) -> Vec<u8> {
    let lines: Vec<&[u8]> = data.split(|&byte| byte == b'\n').collect();
    let last = lines.len().saturating_sub(1);
    let mut decoded = Vec::with_capacity(data.len());

    for (index, line) in lines.into_iter().enumerate() {
        let line = trim_trailing_blanks(line);

        match line.strip_suffix(b"=") {
            Some(joined) => unescape_into(joined, &mut decoded),
            None => {
                unescape_into(line, &mut decoded);
                if index < last {
                    decoded.push(b'\n');
                }
            }
        }
    }

    decoded
}

/// Decode the `Q` flavour used inside encoded words, where `_` is a space.
pub fn decode_q(data: &[u8]) -> Vec<u8> {
    let spaced: Vec<u8> = data
        .iter()
        .map(|&byte| if byte == b'_' { b' ' } else { byte })
        .collect();

    let mut decoded = Vec::with_capacity(spaced.len());
    unescape_into(&spaced, &mut decoded);
    decoded
}

fn trim_trailing_blanks(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|byte| !matches!(byte, b'\r' | b' ' | b'\t'))
        .map_or(0, |position| position + 1);

    &line[..end]
}

fn unescape_into(line: &[u8], decoded: &mut Vec<u8>) {
    let mut index = 0;

    while index < line.len() {
        if line[index] == b'='
            && index + 2 < line.len()
            && let (Some(high), Some(low)) = (hex(line[index + 1]), hex(line[index + 2]))
        {
            decoded.push(high << 4 | low);
            index += 3;
            continue;
        }

        decoded.push(line[index]);
        index += 1;
    }
}

const fn hex(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_ignores_line_breaks() {
        assert_eq!(
            decode_base64(b"SGVsbG8s\r\nIHdvcmxk\n").as_deref(),
            Some(b"Hello, world".as_slice())
        );
    }

    #[test]
    fn base64_tolerates_missing_padding() {
        assert_eq!(decode_base64(b"SGk").as_deref(), Some(b"Hi".as_slice()));
    }

    #[test]
    fn base64_rejects_garbage() {
        assert_eq!(decode_base64(b"not*base64!"), None);
    }

    #[test]
    fn quoted_printable_escapes_and_soft_breaks() {
        assert_eq!(
            decode_quoted_printable(b"caf=C3=A9 is =\r\nopen\r\ntoday"),
            "café is open\ntoday".as_bytes()
        );
    }

    #[test]
    fn quoted_printable_escape_at_end_of_line() {
        assert_eq!(decode_quoted_printable(b"a=41"), b"aA");
    }

    #[test]
    fn quoted_printable_keeps_invalid_escapes() {
        assert_eq!(decode_quoted_printable(b"50=ZZ off"), b"50=ZZ off");
    }

    #[test]
    fn q_encoding_maps_underscores() {
        assert_eq!(decode_q(b"Hello_W=C3=B6rld"), "Hello Wörld".as_bytes());
    }
}
