//! Header block parsing, `Content-Type` inspection and RFC 2047 encoded words.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::{charset, transfer};

static ENCODED_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"=\?([^?]+)\?([BbQq])\?([^?]*)\?=").expect("encoded word pattern is valid")
});

static CHARSET_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)charset\s*=\s*["']?([^"'\s;]+)["']?"#).expect("charset pattern is valid")
});

/// Header fields in their original order, with folded lines joined.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    pub fn parse(block: &[u8]) -> Self {
        let block = String::from_utf8_lossy(block);
        let mut fields: Vec<(String, String)> = Vec::new();

        for line in block.split('\n') {
            let line = line.trim_end_matches('\r');

            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = fields.last_mut() {
                    value.push_str(line);
                }
                continue;
            }

            if let Some((name, value)) = line.split_once(':') {
                fields.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
            }
        }

        for (_, value) in &mut fields {
            let trimmed = value.trim_end();
            value.truncate(trimmed.len());
        }

        Self { fields }
    }

    /// The first value of `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> ContentType {
        self.get("content-type")
            .map_or_else(ContentType::default, ContentType::parse)
    }

    /// The lower-cased `Content-Transfer-Encoding`, empty when absent.
    pub fn transfer_encoding(&self) -> String {
        self.get("content-transfer-encoding")
            .map(|value| value.trim().to_ascii_lowercase())
            .unwrap_or_default()
    }
}

/// The parts of a `Content-Type` value the decoder acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Lower-cased `type/subtype`, empty when the header is absent.
    pub mime_type: String,
    pub charset: String,
    pub boundary: Option<String>,
}

impl Default for ContentType {
    fn default() -> Self {
        Self {
            mime_type: String::new(),
            charset: charset::DEFAULT_CHARSET.to_string(),
            boundary: None,
        }
    }
}

impl ContentType {
    pub fn parse(value: &str) -> Self {
        let mime_type = value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        let charset = CHARSET_PARAM
            .captures(value)
            .map_or_else(|| charset::DEFAULT_CHARSET.to_string(), |caps| caps[1].to_string());

        let boundary = mailparse::parse_content_type(value)
            .params
            .get("boundary")
            .filter(|boundary| !boundary.is_empty())
            .cloned();

        Self {
            mime_type,
            charset,
            boundary,
        }
    }

    pub fn is_multipart(&self) -> bool {
        self.mime_type.starts_with("multipart/")
    }

    pub fn is_plain(&self) -> bool {
        self.mime_type == "text/plain"
    }

    pub fn is_html(&self) -> bool {
        self.mime_type == "text/html"
    }
}

/// Replace every `=?charset?B|Q?payload?=` in `value` with its UTF-8 text.
///
/// A `B` payload that is not valid base64 is left as the raw payload.
pub fn decode_header(value: &str) -> String {
    ENCODED_WORD
        .replace_all(value, |caps: &Captures| {
            let label = &caps[1];
            let payload = &caps[3];

            match &caps[2] {
                "B" | "b" => transfer::decode_base64(payload.as_bytes()).map_or_else(
                    || payload.to_string(),
                    |bytes| charset::to_utf8(&bytes, label),
                ),
                _ => charset::to_utf8(&transfer::decode_q(payload.as_bytes()), label),
            }
        })
        .into_owned()
}

/// Whether `value` contains at least one encoded word.
pub fn has_encoded_word(value: &str) -> bool {
    ENCODED_WORD.is_match(value)
}
