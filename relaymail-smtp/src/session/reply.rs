use core::fmt::{self, Display, Formatter};
use std::borrow::Cow;

use relaymail_common::status::Status;

/// A reply to the client, possibly spanning several lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    status: Status,
    lines: Vec<Cow<'static, str>>,
}

impl Reply {
    pub fn new(status: Status, text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status,
            lines: vec![text.into()],
        }
    }

    pub fn multiline(status: Status, lines: Vec<Cow<'static, str>>) -> Self {
        Self { status, lines }
    }

    pub fn ok() -> Self {
        Self::new(Status::Ok, "OK")
    }

    pub const fn status(&self) -> Status {
        self.status
    }
}

impl Display for Reply {
    /// Every line but the last uses `-` after the code. Lines are joined
    /// with CRLF; the final terminator is added when sending.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let last = self.lines.len().saturating_sub(1);

        for (index, line) in self.lines.iter().enumerate() {
            if index > 0 {
                f.write_str("\r\n")?;
            }
            let separator = if index == last { ' ' } else { '-' };
            write!(f, "{}{separator}{line}", self.status)?;
        }

        Ok(())
    }
}
