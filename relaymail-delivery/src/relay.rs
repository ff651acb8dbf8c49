//! Outbound relay configuration.
//!
//! A [`RelayRegistry`] holds one optional default relay plus per-domain
//! relays keyed by lower-cased sender domain. Lookups take a read lock;
//! mutation is serialized behind the write lock.

use std::fmt;

use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Prefix of per-domain relay variables, `DOMAIN_SMTP_EXAMPLE_COM=...`.
pub const DOMAIN_RELAY_PREFIX: &str = "DOMAIN_SMTP_";

const DEFAULT_RELAY_PORT: u16 = 587;

/// Where and how to hand mail to an upstream relay.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    pub host: String,
    #[serde(default = "RelayConfig::default_port")]
    pub port: u16,
    /// Empty means no authentication. When set it also replaces the
    /// envelope sender.
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub use_tls: bool,
}

impl RelayConfig {
    const fn default_port() -> u16 {
        DEFAULT_RELAY_PORT
    }

    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            user: String::new(),
            password: String::new(),
            use_tls: false,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    #[must_use]
    pub const fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// `host:port`
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// AUTH is only attempted when both halves are present.
    #[must_use]
    pub const fn has_credentials(&self) -> bool {
        !self.user.is_empty() && !self.password.is_empty()
    }

    /// Parse `host:port:user:password:tls`.
    ///
    /// Anything other than exactly five fields, or a port that is not a
    /// number, is rejected. An unreadable TLS flag enables TLS.
    #[must_use]
    pub fn from_env_value(value: &str) -> Option<Self> {
        let fields: Vec<&str> = value.split(':').collect();
        let [host, port, user, password, tls] = fields.as_slice() else {
            return None;
        };

        let port = port.parse().ok()?;

        Some(Self {
            host: (*host).to_string(),
            port,
            user: (*user).to_string(),
            password: (*password).to_string(),
            use_tls: parse_flag(tls).unwrap_or(true),
        })
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("use_tls", &self.use_tls)
            .finish()
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Lookup of relay settings by sender domain.
pub trait RelayConfigSource: Send + Sync {
    /// The relay configured for exactly this domain.
    fn resolve_relay_config(&self, domain: &str) -> Option<RelayConfig>;

    fn resolve_default_relay_config(&self) -> Option<RelayConfig>;
}

/// In-memory relay settings, shared read-mostly across senders.
#[derive(Debug, Default)]
pub struct RelayRegistry {
    default: RwLock<Option<RelayConfig>>,
    domains: RwLock<AHashMap<String, RelayConfig>>,
}

impl RelayRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_default(&self, relay: Option<RelayConfig>) {
        *self.default.write() = relay;
    }

    /// Add or replace the relay for `domain`.
    pub fn insert(&self, domain: &str, relay: RelayConfig) {
        let domain = domain.to_ascii_lowercase();
        debug!(%domain, host = %relay.host, port = relay.port, "Relay configured");
        self.domains.write().insert(domain, relay);
    }

    pub fn remove(&self, domain: &str) -> Option<RelayConfig> {
        self.domains.write().remove(&domain.to_ascii_lowercase())
    }

    #[must_use]
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.domains.read().keys().cloned().collect();
        domains.sort_unstable();
        domains
    }

    /// Apply `OUTBOUND_SMTP_*` and `DOMAIN_SMTP_*` variables.
    ///
    /// `OUTBOUND_SMTP_*` values override the matching fields of the current
    /// default relay; the default only exists once a host is known.
    pub fn apply_env<I, K, V>(&self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut default = self
            .default
            .read()
            .clone()
            .unwrap_or_else(|| RelayConfig::new(String::new(), DEFAULT_RELAY_PORT));
        let mut default_touched = false;

        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());

            match key {
                "OUTBOUND_SMTP_HOST" if !value.is_empty() => {
                    default.host = value.to_string();
                    default_touched = true;
                }
                "OUTBOUND_SMTP_PORT" => {
                    if let Ok(port) = value.parse() {
                        default.port = port;
                        default_touched = true;
                    }
                }
                "OUTBOUND_SMTP_USER" if !value.is_empty() => {
                    default.user = value.to_string();
                    default_touched = true;
                }
                "OUTBOUND_SMTP_PASSWORD" if !value.is_empty() => {
                    default.password = value.to_string();
                    default_touched = true;
                }
                "OUTBOUND_SMTP_TLS" if value == "true" => {
                    default.use_tls = true;
                    default_touched = true;
                }
                _ => {
                    if let Some(suffix) = key.strip_prefix(DOMAIN_RELAY_PREFIX) {
                        let domain = suffix.replace('_', ".");
                        match RelayConfig::from_env_value(value) {
                            Some(relay) => self.insert(&domain, relay),
                            None => warn!("Ignoring malformed {key}"),
                        }
                    }
                }
            }
        }

        if default_touched && !default.host.is_empty() {
            self.set_default(Some(default));
        }
    }
}

impl RelayConfigSource for RelayRegistry {
    fn resolve_relay_config(&self, domain: &str) -> Option<RelayConfig> {
        self.domains
            .read()
            .get(&domain.to_ascii_lowercase())
            .cloned()
    }

    fn resolve_default_relay_config(&self) -> Option<RelayConfig> {
        self.default.read().clone()
    }
}
