//! Timeout configuration for SMTP operations.
//!
//! The inbound side only enforces an absolute per-connection deadline. The
//! outbound side bounds connection establishment and each command exchange.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Server-side timeouts for inbound sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTimeouts {
    /// Absolute lifetime of an inbound connection, regardless of activity.
    ///
    /// Default: 300 seconds
    #[serde(default = "defaults::server_connection_secs")]
    pub connection_secs: u64,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            connection_secs: defaults::server_connection_secs(),
        }
    }
}

impl ServerTimeouts {
    #[must_use]
    pub const fn connection(&self) -> Duration {
        Duration::from_secs(self.connection_secs)
    }
}

/// Client-side timeouts for outbound delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTimeouts {
    /// TCP connect (and implicit TLS handshake) timeout.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::client_connect_secs")]
    pub connect_secs: u64,

    /// Timeout for each command/reply exchange.
    ///
    /// Default: 300 seconds
    #[serde(default = "defaults::client_command_secs")]
    pub command_secs: u64,

    /// Timeout for transmitting the message body and reading the final reply.
    ///
    /// Default: 600 seconds
    #[serde(default = "defaults::client_data_secs")]
    pub data_secs: u64,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: defaults::client_connect_secs(),
            command_secs: defaults::client_command_secs(),
            data_secs: defaults::client_data_secs(),
        }
    }
}

impl ClientTimeouts {
    #[must_use]
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    #[must_use]
    pub const fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    #[must_use]
    pub const fn data(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }
}

mod defaults {
    pub const fn server_connection_secs() -> u64 {
        300
    }

    pub const fn client_connect_secs() -> u64 {
        30
    }

    pub const fn client_command_secs() -> u64 {
        300
    }

    pub const fn client_data_secs() -> u64 {
        600
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let timeouts = ServerTimeouts::default();
        assert_eq!(timeouts.connection(), Duration::from_secs(300));
    }

    #[test]
    fn client_defaults() {
        let timeouts = ClientTimeouts::default();
        assert_eq!(timeouts.connect_secs, 30);
        assert_eq!(timeouts.command_secs, 300);
        assert_eq!(timeouts.data_secs, 600);
    }
}
