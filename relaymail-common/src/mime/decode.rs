//! Turns raw inbound message bytes into a subject and display-ready text.

use super::{
    DecodedMessage, NO_SUBJECT,
    charset,
    header::{self, ContentType, Headers},
    transfer,
};

/// Multipart nesting deeper than this is treated as opaque content.
const MAX_NESTING: usize = 8;

#[derive(Debug, Default)]
pub(super) struct Collected {
    pub(super) plain: Vec<String>,
    pub(super) html: Vec<String>,
}

impl Collected {
    fn joined(parts: &[String]) -> Option<String> {
        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }

    pub(super) fn html(&self) -> Option<String> {
        Self::joined(&self.html)
    }

    /// Plain text if any part had it, else HTML.
    pub(super) fn preferred(&self) -> Option<String> {
        Self::joined(&self.plain).or_else(|| self.html())
    }
}

/// Decode a complete message as received after DATA.
///
/// Never fails: anything that cannot be decoded is returned as it was
/// received, with invalid UTF-8 replaced.
pub fn decode(raw: &[u8]) -> DecodedMessage {
    let (header_block, body) = split_message(raw);
    let headers = Headers::parse(header_block);

    let subject = headers
        .get("subject")
        .map(header::decode_header)
        .filter(|subject| !subject.trim().is_empty())
        .unwrap_or_else(|| NO_SUBJECT.to_string());

    let content_type = headers.content_type();

    if content_type.is_multipart() {
        let normalised = normalise_newlines(body);
        let boundary = content_type
            .boundary
            .clone()
            .or_else(|| sniff_boundary(&normalised));

        if let Some(boundary) = boundary {
            let mut collected = Collected::default();
            collect_parts(&normalised, &boundary, &mut collected, 0);

            return DecodedMessage {
                subject,
                text_body: collected
                    .preferred()
                    .unwrap_or_else(|| String::from_utf8_lossy(&normalised).into_owned()),
                html_body: collected.html(),
            };
        }

        tracing::debug!("Multipart message without a usable boundary");
    }

    // Single parts keep their line endings as sent.
    let text = decode_content(body, &headers.transfer_encoding(), &content_type.charset);
    let html_body = content_type.is_html().then(|| text.clone());

    DecodedMessage {
        subject,
        text_body: text,
        html_body,
    }
}

/// Split at the first empty line.
///
/// The leading block only counts as headers when every line is a field or a
/// continuation and at least one field is a known message header, so text
/// that merely starts with `Word: value` stays body.
pub(super) fn split_message(raw: &[u8]) -> (&[u8], &[u8]) {
    let mut offset = 0;
    let mut known = false;

    for line in raw.split_inclusive(|&byte| byte == b'\n') {
        let content = trim_line_ending(line);
        if content.is_empty() {
            return if known {
                (&raw[..offset], &raw[offset + line.len()..])
            } else {
                (&[], raw)
            };
        }

        if offset > 0 && matches!(content.first(), Some(b' ' | b'\t')) {
            offset += line.len();
            continue;
        }

        let Some(name) = field_name(content) else {
            return (&[], raw);
        };
        known |= KNOWN_FIELDS
            .iter()
            .any(|field| field.as_bytes().eq_ignore_ascii_case(name));
        offset += line.len();
    }

    if known { (raw, &[]) } else { (&[], raw) }
}

/// Fields whose presence marks a leading block as a real header block.
const KNOWN_FIELDS: [&str; 15] = [
    "content-type",
    "content-transfer-encoding",
    "mime-version",
    "subject",
    "from",
    "to",
    "cc",
    "date",
    "message-id",
    "reply-to",
    "sender",
    "received",
    "return-path",
    "content-disposition",
    "content-id",
];

fn field_name(line: &[u8]) -> Option<&[u8]> {
    let colon = line.iter().position(|&byte| byte == b':')?;
    let name = &line[..colon];
    (colon > 0 && name.iter().all(|&byte| (33..=126).contains(&byte))).then_some(name)
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let end = line
        .iter()
        .rposition(|&byte| byte != b'\r')
        .map_or(0, |position| position + 1);
    &line[..end]
}

/// Rejoin lines with `\n`, dropping carriage returns at line ends.
pub(super) fn normalise_newlines(body: &[u8]) -> Vec<u8> {
    let mut normalised = Vec::with_capacity(body.len());

    for (index, line) in body.split(|&byte| byte == b'\n').enumerate() {
        if index > 0 {
            normalised.push(b'\n');
        }
        normalised.extend_from_slice(trim_line_ending(line));
    }

    normalised
}

/// The first non-blank line starting with `--`, without the dashes.
fn sniff_boundary(body: &[u8]) -> Option<String> {
    String::from_utf8_lossy(body)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.strip_prefix("--"))
        .map(|boundary| boundary.trim_end_matches("--").to_string())
        .filter(|boundary| !boundary.is_empty())
}

/// Walk the parts of a multipart body, decoding each text part.
pub(super) fn collect_parts(body: &[u8], boundary: &str, collected: &mut Collected, depth: usize) {
    let delimiter = format!("--{boundary}");

    // The text before the first delimiter is preamble.
    for part in split_on(body, delimiter.as_bytes()).into_iter().skip(1) {
        let part = part.trim_ascii();
        if part.is_empty() || part.starts_with(b"--") {
            continue;
        }

        let (header_block, content) = split_message(part);
        let headers = Headers::parse(header_block);
        let content_type = if header_block.is_empty() || headers.get("content-type").is_none() {
            ContentType::parse("text/plain")
        } else {
            headers.content_type()
        };

        if content_type.is_multipart() {
            match &content_type.boundary {
                Some(nested) if depth < MAX_NESTING => {
                    collect_parts(content, nested, collected, depth + 1);
                }
                _ => tracing::debug!("Skipping nested multipart part"),
            }
            continue;
        }

        if !content_type.is_plain() && !content_type.is_html() {
            continue;
        }

        let content = part_content(content);
        let text = decode_content(&content, &headers.transfer_encoding(), &content_type.charset);

        if content_type.is_plain() {
            collected.plain.push(text);
        } else {
            collected.html.push(text);
        }
    }
}

/// Part content with stray boundary lines removed, trimmed.
fn part_content(content: &[u8]) -> Vec<u8> {
    let lines: Vec<&[u8]> = content
        .split(|&byte| byte == b'\n')
        .map(trim_line_ending)
        .filter(|line| !line.starts_with(b"--"))
        .collect();

    lines.join(&b'\n').trim_ascii().to_vec()
}

fn split_on<'a>(haystack: &'a [u8], delimiter: &[u8]) -> Vec<&'a [u8]> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut index = 0;

    while index + delimiter.len() <= haystack.len() {
        if haystack[index..].starts_with(delimiter) {
            pieces.push(&haystack[start..index]);
            index += delimiter.len();
            start = index;
        } else {
            index += 1;
        }
    }

    pieces.push(&haystack[start..]);
    pieces
}

/// Undo the transfer encoding and convert the charset.
pub(super) fn decode_content(content: &[u8], encoding: &str, label: &str) -> String {
    match encoding {
        "base64" => transfer::decode_base64(content).map_or_else(
            || {
                tracing::debug!("Invalid base64 content, keeping it as received");
                String::from_utf8_lossy(content).into_owned()
            },
            |bytes| charset::to_utf8(&bytes, label),
        ),
        "quoted-printable" => charset::to_utf8(&transfer::decode_quoted_printable(content), label),
        _ => charset::to_utf8(content, label),
    }
}
