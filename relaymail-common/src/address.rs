//! Helpers for the bare `local@domain` addresses carried in envelopes.

/// Strip the envelope wrapper from a MAIL/RCPT path argument.
///
/// `" <user@example.com> SIZE=10"` becomes `"user@example.com"`. Any ESMTP
/// parameters after the path are discarded.
pub fn strip_path(argument: &str) -> &str {
    let argument = argument.trim();

    let path = if let Some(rest) = argument.strip_prefix('<') {
        rest.find('>').map_or(rest, |end| &rest[..end])
    } else {
        argument
            .split_once(char::is_whitespace)
            .map_or(argument, |(path, _)| path)
    };

    path.trim_matches(|c| c == '<' || c == '>')
}

/// The domain part of `address`, if it has exactly one `@`.
pub fn domain_of(address: &str) -> Option<&str> {
    let mut parts = address.split('@');
    let (_local, domain) = (parts.next()?, parts.next()?);

    if parts.next().is_some() {
        return None;
    }

    Some(domain)
}
