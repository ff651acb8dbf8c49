use core::fmt::{self, Display, Formatter};

/// SMTP reply codes used by the inbound session.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Debug)]
pub enum Status {
    ServiceReady,
    GoodBye,
    AuthSucceeded,
    Ok,
    AuthChallenge,
    StartMailInput,
    Unavailable,
    Unrecognised,
    SyntaxError,
    InvalidCommandSequence,
    MechanismUnsupported,
    AuthFailed,
    Error,
    ExceededStorage,
    Unknown(u32),
}

impl Status {
    /// Checks if the status is a permanent rejection
    pub fn is_permanent(self) -> bool {
        u32::from(self) >= 500
    }

    /// Checks if the status is a temporary rejection
    pub fn is_temporary(self) -> bool {
        (400..500).contains(&u32::from(self))
    }
}

impl From<u32> for Status {
    fn from(value: u32) -> Self {
        match value {
            220 => Self::ServiceReady,
            221 => Self::GoodBye,
            235 => Self::AuthSucceeded,
            250 => Self::Ok,
            334 => Self::AuthChallenge,
            354 => Self::StartMailInput,
            421 => Self::Unavailable,
            500 => Self::Unrecognised,
            501 => Self::SyntaxError,
            503 => Self::InvalidCommandSequence,
            504 => Self::MechanismUnsupported,
            535 => Self::AuthFailed,
            550 => Self::Error,
            552 => Self::ExceededStorage,
            _ => Self::Unknown(value),
        }
    }
}

impl From<Status> for u32 {
    fn from(value: Status) -> Self {
        match value {
            Status::ServiceReady => 220,
            Status::GoodBye => 221,
            Status::AuthSucceeded => 235,
            Status::Ok => 250,
            Status::AuthChallenge => 334,
            Status::StartMailInput => 354,
            Status::Unavailable => 421,
            Status::Unrecognised => 500,
            Status::SyntaxError => 501,
            Status::InvalidCommandSequence => 503,
            Status::MechanismUnsupported => 504,
            Status::AuthFailed => 535,
            Status::Error => 550,
            Status::ExceededStorage => 552,
            Status::Unknown(value) => value,
        }
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.write_fmt(format_args!("{}", u32::from(*self)))
    }
}
