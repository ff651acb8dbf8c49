use core::fmt::{self, Display, Formatter};

use relaymail_common::{address::strip_path, status::Status};
use thiserror::Error;

/// SASL mechanisms a client may request with AUTH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mechanism {
    Plain,
    Login,
    Other(String),
}

impl From<&str> for Mechanism {
    fn from(value: &str) -> Self {
        if value.eq_ignore_ascii_case("PLAIN") {
            Self::Plain
        } else if value.eq_ignore_ascii_case("LOGIN") {
            Self::Login
        } else {
            Self::Other(value.to_ascii_uppercase())
        }
    }
}

impl Display for Mechanism {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => f.write_str("PLAIN"),
            Self::Login => f.write_str("LOGIN"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Helo(String),
    Ehlo(String),
    Auth {
        mechanism: Mechanism,
        initial_response: Option<String>,
    },
    MailFrom(String),
    RcptTo(String),
    Data,
    Rset,
    Noop,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Syntax error in parameters: {0}")]
    Syntax(&'static str),

    #[error("Command not recognized: {0}")]
    Unrecognized(String),
}

impl CommandError {
    pub const fn status(&self) -> Status {
        match self {
            Self::Syntax(_) => Status::SyntaxError,
            Self::Unrecognized(_) => Status::Unrecognised,
        }
    }
}

impl Display for Command {
    /// Never includes an AUTH initial response.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo(name) => write!(f, "HELO {name}"),
            Self::Ehlo(name) => write!(f, "EHLO {name}"),
            Self::Auth { mechanism, .. } => write!(f, "AUTH {mechanism}"),
            Self::MailFrom(sender) => write!(f, "MAIL FROM:<{sender}>"),
            Self::RcptTo(recipient) => write!(f, "RCPT TO:<{recipient}>"),
            Self::Data => f.write_str("DATA"),
            Self::Rset => f.write_str("RSET"),
            Self::Noop => f.write_str("NOOP"),
            Self::Quit => f.write_str("QUIT"),
        }
    }
}

/// Strip `prefix` from the start of `value`, ignoring ASCII case.
fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    value
        .get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .map(|_| &value[prefix.len()..])
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(line: &str) -> Result<Self, Self::Error> {
        let line = line.trim_end_matches(['\r', '\n']).trim();
        let (verb, arguments) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(verb, rest)| (verb, rest.trim()));

        match verb.to_ascii_uppercase().as_str() {
            "HELO" => Ok(Self::Helo(arguments.to_string())),
            "EHLO" => Ok(Self::Ehlo(arguments.to_string())),
            "AUTH" => {
                let mut parts = arguments.split_whitespace();
                let mechanism = parts
                    .next()
                    .ok_or(CommandError::Syntax("AUTH requires a mechanism"))?;

                Ok(Self::Auth {
                    mechanism: Mechanism::from(mechanism),
                    initial_response: parts.next().map(str::to_string),
                })
            }
            "MAIL" => strip_prefix_ignore_case(arguments, "FROM:")
                .map(|path| Self::MailFrom(strip_path(path).to_string()))
                .ok_or(CommandError::Syntax("expected MAIL FROM:<address>")),
            "RCPT" => {
                let path = strip_prefix_ignore_case(arguments, "TO:")
                    .ok_or(CommandError::Syntax("expected RCPT TO:<address>"))?;
                let recipient = strip_path(path);

                if recipient.is_empty() {
                    return Err(CommandError::Syntax("RCPT TO requires an address"));
                }

                Ok(Self::RcptTo(recipient.to_string()))
            }
            "DATA" => Ok(Self::Data),
            "RSET" => Ok(Self::Rset),
            "NOOP" => Ok(Self::Noop),
            "QUIT" => Ok(Self::Quit),
            _ => Err(CommandError::Unrecognized(verb.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn greetings() {
        assert_eq!(
            Command::try_from("EHLO client.example.com\r\n"),
            Ok(Command::Ehlo("client.example.com".to_string()))
        );
        assert_eq!(
            Command::try_from("helo  client"),
            Ok(Command::Helo("client".to_string()))
        );
    }

    #[test]
    fn mail_from_is_case_insensitive() {
        assert_eq!(
            Command::try_from("mail from:<alice@example.com>"),
            Ok(Command::MailFrom("alice@example.com".to_string()))
        );
        assert_eq!(
            Command::try_from("MAIL FROM: <alice@example.com> SIZE=100"),
            Ok(Command::MailFrom("alice@example.com".to_string()))
        );
    }

    #[test]
    fn null_sender_is_accepted() {
        assert_eq!(
            Command::try_from("MAIL FROM:<>"),
            Ok(Command::MailFrom(String::new()))
        );
    }

    #[test]
    fn mail_without_from_is_a_syntax_error() {
        let err = Command::try_from("MAIL alice@example.com").unwrap_err();
        assert_eq!(err.status(), Status::SyntaxError);
    }

    #[test]
    fn rcpt_requires_an_address() {
        assert_eq!(
            Command::try_from("RCPT TO:<bob@example.com>"),
            Ok(Command::RcptTo("bob@example.com".to_string()))
        );
        assert!(matches!(
            Command::try_from("RCPT TO:<>"),
            Err(CommandError::Syntax(_))
        ));
        assert!(matches!(
            Command::try_from("RCPT bob@example.com"),
            Err(CommandError::Syntax(_))
        ));
    }

    #[test]
    fn auth_with_and_without_initial_response() {
        assert_eq!(
            Command::try_from("AUTH PLAIN AGFsaWNlAHNlY3JldA=="),
            Ok(Command::Auth {
                mechanism: Mechanism::Plain,
                initial_response: Some("AGFsaWNlAHNlY3JldA==".to_string()),
            })
        );
        assert_eq!(
            Command::try_from("auth login"),
            Ok(Command::Auth {
                mechanism: Mechanism::Login,
                initial_response: None,
            })
        );
        assert_eq!(
            Command::try_from("AUTH cram-md5"),
            Ok(Command::Auth {
                mechanism: Mechanism::Other("CRAM-MD5".to_string()),
                initial_response: None,
            })
        );
        assert!(matches!(Command::try_from("AUTH"), Err(CommandError::Syntax(_))));
    }

    #[test]
    fn auth_display_hides_credentials() {
        let command = Command::try_from("AUTH PLAIN AGFsaWNlAHNlY3JldA==").unwrap();
        assert_eq!(command.to_string(), "AUTH PLAIN");
    }

    #[test]
    fn bare_commands() {
        assert_eq!(Command::try_from("DATA"), Ok(Command::Data));
        assert_eq!(Command::try_from("rset"), Ok(Command::Rset));
        assert_eq!(Command::try_from("NOOP"), Ok(Command::Noop));
        assert_eq!(Command::try_from("QUIT\r\n"), Ok(Command::Quit));
    }

    #[test]
    fn unknown_verbs_are_unrecognized() {
        let err = Command::try_from("VRFY bob").unwrap_err();
        assert_eq!(err, CommandError::Unrecognized("VRFY".to_string()));
        assert_eq!(err.status(), Status::Unrecognised);
    }
}
