//! Best-effort decoding of stored content that may still be encoded.

use std::sync::LazyLock;

use base64::Engine;
use regex::Regex;

use super::{
    decode::{Collected, collect_parts, normalise_newlines},
    header, transfer,
};

const MULTIPART_PREAMBLE: &str = "This is a multi-part message in MIME format";

static BASE64_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+/]*={0,2}$").expect("base64 pattern is valid"));

/// Produce readable text from `content`, trying encoded words, an unparsed
/// multipart body and a bare base64 blob in that order.
pub fn decode_display(content: &str) -> String {
    if header::has_encoded_word(content) {
        let decoded = header::decode_header(content);
        if decoded != content {
            return decoded;
        }
    }

    if content.contains(MULTIPART_PREAMBLE) {
        return decode_multipart_blob(content).unwrap_or_else(|| content.to_string());
    }

    decode_base64_blob(content).unwrap_or_else(|| content.to_string())
}

fn decode_multipart_blob(content: &str) -> Option<String> {
    let boundary = declared_boundary(content).or_else(|| {
        content
            .lines()
            .map(str::trim)
            .find_map(|line| line.strip_prefix("--"))
            .map(|boundary| boundary.trim_end_matches("--").to_string())
            .filter(|boundary| !boundary.is_empty())
    })?;

    let body = normalise_newlines(content.as_bytes());
    let mut collected = Collected::default();
    collect_parts(&body, &boundary, &mut collected, 0);

    collected.preferred()
}

fn declared_boundary(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let lowered = line.to_ascii_lowercase();
        let start = lowered.find("boundary=")? + "boundary=".len();
        let value = line[start..]
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .trim_matches(['"', '\'']);

        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Decode `content` if it is plausibly a base64 blob of readable text.
///
/// Requires more than 10 characters, a length divisible by four, only base64
/// characters, and a decoded result that is more than 80% printable.
pub fn decode_base64_blob(content: &str) -> Option<String> {
    let cleaned: String = content.chars().filter(|c| !matches!(c, '\r' | '\n')).collect();
    let cleaned = cleaned.trim();

    if cleaned.len() <= 10 || cleaned.len() % 4 != 0 || !BASE64_SHAPE.is_match(cleaned) {
        return None;
    }

    let bytes = transfer::LENIENT_BASE64.decode(cleaned).ok()?;
    let text = String::from_utf8_lossy(&bytes);

    is_mostly_printable(&text).then(|| text.into_owned())
}

/// ASCII 32-126, CJK unified ideographs and common whitespace.
const fn is_printable(c: char) -> bool {
    matches!(c, ' '..='~' | '\u{4E00}'..='\u{9FFF}' | '\n' | '\r' | '\t')
}

/// More than 80% of the characters are printable. Empty text is not.
pub fn is_mostly_printable(text: &str) -> bool {
    let (printable, total) = text.chars().fold((0usize, 0usize), |(printable, total), c| {
        (printable + usize::from(is_printable(c)), total + 1)
    });

    total > 0 && printable * 5 > total * 4
}
