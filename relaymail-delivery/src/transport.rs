use std::fmt;

use crate::relay::RelayConfig;

/// Port on which relays expect TLS from the first byte.
pub const IMPLICIT_TLS_PORT: u16 = 465;

/// How the outbound channel is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// No encryption. Used for direct exchanger delivery.
    Plain,
    /// Plaintext connect, then upgrade with STARTTLS.
    StartTls,
    /// TLS before the greeting.
    ImplicitTls,
}

impl Transport {
    #[must_use]
    pub const fn for_relay(relay: &RelayConfig) -> Self {
        match (relay.use_tls, relay.port) {
            (true, IMPLICIT_TLS_PORT) => Self::ImplicitTls,
            (true, _) => Self::StartTls,
            (false, _) => Self::Plain,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::StartTls => "starttls",
            Self::ImplicitTls => "implicit-tls",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chosen_by_tls_flag_and_port() {
        let relay = |port, tls| RelayConfig::new("smtp.example.com", port).with_tls(tls);

        assert_eq!(Transport::for_relay(&relay(465, true)), Transport::ImplicitTls);
        assert_eq!(Transport::for_relay(&relay(587, true)), Transport::StartTls);
        assert_eq!(Transport::for_relay(&relay(25, true)), Transport::StartTls);
        assert_eq!(Transport::for_relay(&relay(465, false)), Transport::Plain);
        assert_eq!(Transport::for_relay(&relay(25, false)), Transport::Plain);
    }
}
