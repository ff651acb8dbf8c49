//! Conversion of declared character sets to UTF-8.
//!
//! Only the charsets below are converted. Anything else, including UTF-8
//! itself, is passed through with invalid sequences replaced.

use encoding_rs::Encoding;

pub const DEFAULT_CHARSET: &str = "utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Charset {
    Utf8,
    /// True ISO-8859-1, which `encoding_rs` folds into windows-1252 by label.
    Latin1,
    Encoded(&'static Encoding),
}

fn lookup(label: &str) -> Option<Charset> {
    let charset = match label.trim().to_ascii_lowercase().as_str() {
        "gbk" | "gb2312" => Charset::Encoded(encoding_rs::GBK),
        "gb18030" => Charset::Encoded(encoding_rs::GB18030),
        "big5" => Charset::Encoded(encoding_rs::BIG5),
        "shift_jis" | "shift-jis" | "sjis" => Charset::Encoded(encoding_rs::SHIFT_JIS),
        "euc-jp" => Charset::Encoded(encoding_rs::EUC_JP),
        "iso-2022-jp" => Charset::Encoded(encoding_rs::ISO_2022_JP),
        "euc-kr" => Charset::Encoded(encoding_rs::EUC_KR),
        "iso-8859-1" | "latin1" => Charset::Latin1,
        "iso-8859-2" | "latin2" => Charset::Encoded(encoding_rs::ISO_8859_2),
        "iso-8859-15" => Charset::Encoded(encoding_rs::ISO_8859_15),
        "windows-1252" | "cp1252" => Charset::Encoded(encoding_rs::WINDOWS_1252),
        "windows-1251" | "cp1251" => Charset::Encoded(encoding_rs::WINDOWS_1251),
        "utf-8" | "utf8" => Charset::Utf8,
        _ => return None,
    };

    Some(charset)
}

/// Whether `label` names a charset that is converted rather than passed through.
pub fn is_supported(label: &str) -> bool {
    lookup(label).is_some()
}

/// Interpret `bytes` as `label` and return valid UTF-8.
///
/// Unknown labels are not an error: the bytes are treated as UTF-8.
pub fn to_utf8(bytes: &[u8], label: &str) -> String {
    match lookup(label) {
        Some(Charset::Encoded(encoding)) => {
            let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
            if had_errors {
                tracing::debug!("Malformed {} sequences replaced", encoding.name());
            }
            text.into_owned()
        }
        Some(Charset::Latin1) => encoding_rs::mem::decode_latin1(bytes).into_owned(),
        Some(Charset::Utf8) | None => String::from_utf8_lossy(bytes).into_owned(),
    }
}
